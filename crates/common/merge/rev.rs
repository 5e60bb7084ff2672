use crate::error::MergeError;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A revision string split into its depth prefix and hash suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionInfo {
    pub pos: u64,
    pub id: String,
}

/// The `_revisions` member of a replicated document: revision hashes from
/// newest to oldest, with `start` naming the depth of the newest one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revisions {
    pub start: u64,
    pub ids: Vec<String>,
}

/// Splits a `"<depth>-<hash>"` revision string.
pub fn parse_rev(rev: &str) -> Result<RevisionInfo, MergeError> {
    let (pos, id) = rev
        .split_once('-')
        .ok_or_else(|| MergeError::InvalidRev(rev.to_string()))?;
    let pos: u64 = pos
        .parse()
        .map_err(|_| MergeError::InvalidRev(rev.to_string()))?;
    if pos == 0 || id.is_empty() {
        return Err(MergeError::InvalidRev(rev.to_string()));
    }
    Ok(RevisionInfo {
        pos,
        id: id.to_string(),
    })
}

pub fn format_rev(pos: u64, id: &str) -> String {
    format!("{pos}-{id}")
}

/// Deterministic revision hash for a new edit: MD5 over the parent rev, the
/// tombstone flag, and the canonical JSON of the document body. Two identical
/// edits of the same parent therefore produce the same revision, which makes
/// retried writes idempotent.
pub fn new_rev_id(parent_rev: Option<&str>, deleted: bool, data: &Map<String, Value>) -> String {
    let mut hasher = Md5::new();
    if let Some(rev) = parent_rev {
        hasher.update(rev.as_bytes());
    }
    hasher.update([u8::from(deleted)]);
    if let Ok(bytes) = serde_json::to_vec(&Value::Object(data.clone())) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_revs() {
        let info = parse_rev("3-deadbeef").unwrap();
        assert_eq!(info.pos, 3);
        assert_eq!(info.id, "deadbeef");
        assert_eq!(format_rev(info.pos, &info.id), "3-deadbeef");
    }

    #[test]
    fn rejects_malformed_revs() {
        assert!(parse_rev("nodash").is_err());
        assert!(parse_rev("0-hash").is_err());
        assert!(parse_rev("x-hash").is_err());
        assert!(parse_rev("2-").is_err());
    }

    #[test]
    fn rev_ids_are_deterministic() {
        let mut data = Map::new();
        data.insert("value".to_string(), Value::from(42));
        let a = new_rev_id(Some("1-abc"), false, &data);
        let b = new_rev_id(Some("1-abc"), false, &data);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        // A different parent or tombstone flag yields a different hash.
        assert_ne!(a, new_rev_id(Some("1-abd"), false, &data));
        assert_ne!(a, new_rev_id(Some("1-abc"), true, &data));
    }
}
