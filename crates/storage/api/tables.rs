//! Table names used by the storage engine. Six namespaces partition one
//! backend database.

/// Document id -> metadata (revision tree, rev -> seq map, memoized winner).
pub const DOC_STORE: &str = "document-store";
/// Zero-padded update sequence -> stored document body.
pub const BY_SEQ_STORE: &str = "by-sequence";
/// Content digest -> back-reference map of the revisions using it.
pub const ATTACH_STORE: &str = "attach-store";
/// Content digest -> raw attachment bytes.
pub const BINARY_STORE: &str = "attach-binary-store";
/// `_local/` document id -> local document (no revision tree, no change feed).
pub const LOCAL_STORE: &str = "local-store";
/// Fixed engine metadata keys (uuid, doc count, last update seq).
pub const META_STORE: &str = "meta-store";

pub const TABLES: [&str; 6] = [
    DOC_STORE,
    BY_SEQ_STORE,
    ATTACH_STORE,
    BINARY_STORE,
    LOCAL_STORE,
    META_STORE,
];
