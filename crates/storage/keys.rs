//! Reserved key formats: sequence keys, meta-store keys, the local-document
//! id marker, and attachment digests.

use crate::error::StoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::{Digest as _, Md5};

/// Fixed keys of the meta store.
pub const META_UUID: &str = "_local_uuid";
pub const META_DOC_COUNT: &str = "_local_doc_count";
pub const META_UPDATE_SEQ: &str = "_local_last_update_seq";

/// Ids carrying this prefix are routed to the local store and never appear in
/// the document store, the sequence store, or the change feed.
pub const LOCAL_PREFIX: &str = "_local/";

pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}

/// Sequence keys are fixed-width decimal so that lexicographic key order
/// equals numeric sequence order.
pub fn format_seq(seq: u64) -> String {
    format!("{seq:016}")
}

pub fn parse_seq(key: &[u8]) -> Result<u64, StoreError> {
    std::str::from_utf8(key)
        .ok()
        .and_then(|key| key.parse().ok())
        .ok_or_else(|| StoreError::Corrupt(format!("malformed sequence key {key:?}")))
}

/// Content address of an attachment body: `md5-` plus the base64 MD5 of the
/// raw bytes.
pub fn attachment_digest(bytes: &[u8]) -> String {
    format!("md5-{}", STANDARD.encode(Md5::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_keys_are_fixed_width_and_ordered() {
        assert_eq!(format_seq(0), "0000000000000000");
        assert_eq!(format_seq(42), "0000000000000042");
        assert_eq!(format_seq(42).len(), 16);
        assert!(format_seq(9) < format_seq(10));
        assert!(format_seq(99) < format_seq(100));
    }

    #[test]
    fn seq_keys_round_trip() {
        for seq in [0, 1, 42, u64::MAX] {
            assert_eq!(parse_seq(format_seq(seq).as_bytes()).unwrap(), seq);
        }
        assert!(parse_seq(b"not-a-seq").is_err());
    }

    #[test]
    fn local_ids_are_discriminated_by_prefix() {
        assert!(is_local_id("_local/config"));
        assert!(!is_local_id("config"));
        assert!(!is_local_id("_design/view"));
    }

    #[test]
    fn digest_matches_the_known_md5_of_hello() {
        // md5("hello") = 5d41402abc4b2a76b9719d911017c592
        assert_eq!(attachment_digest(b"hello"), "md5-XUFAKrxLKna5cZ2REBfFkg==");
    }
}
