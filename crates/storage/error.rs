use docrex_merge::MergeError;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    Missing(MissingReason),
    #[error("unknown stub attachment with digest {0}")]
    MissingStub(String),
    #[error("document update conflict")]
    RevConflict,
    #[error("bad argument: {0}")]
    BadArgument(String),
    #[error("database is closed")]
    NotOpen,
    #[error("storage backend {0} is not available in this build")]
    BackendUnavailable(&'static str),
    #[error("database does not exist: {0}")]
    DatabaseDoesNotExist(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invariant violation: {0}")]
    Corrupt(String),
    #[error("lock poisoned")]
    LockPoisoned,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Why a document read came back empty: the id was never written, or its
/// winning revision is a tombstone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingReason {
    Missing,
    Deleted,
}

impl fmt::Display for MissingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingReason::Missing => write!(f, "missing"),
            MissingReason::Deleted => write!(f, "deleted"),
        }
    }
}

impl StoreError {
    pub(crate) fn missing() -> Self {
        StoreError::Missing(MissingReason::Missing)
    }

    pub(crate) fn deleted() -> Self {
        StoreError::Missing(MissingReason::Deleted)
    }
}

// Malformed documents surface under the same kind as any other bad input.
impl From<MergeError> for StoreError {
    fn from(err: MergeError) -> Self {
        StoreError::BadArgument(err.to_string())
    }
}

#[cfg(feature = "fjall")]
impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
