use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("document id must be a string")]
    InvalidId,
    #[error("reserved document id: {0}")]
    ReservedId(String),
    #[error("bad special document member: {0}")]
    ReservedField(String),
    #[error("invalid rev format: {0}")]
    InvalidRev(String),
    #[error("invalid _revisions structure")]
    InvalidRevisions,
    #[error("missing _rev when writing with new_edits disabled")]
    MissingRev,
}
