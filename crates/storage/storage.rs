//! Storage engine for docrex: JSON documents with multi-version revision
//! trees, content-addressed attachments, and a monotonic change feed, layered
//! on an ordered key/value backend.
//!
//! Six namespaces partition one backend database (see [`api::tables`]):
//! document metadata, bodies by update sequence, attachment reference maps,
//! attachment binaries, local documents, and engine metadata. All operations
//! on one database flow through its operation queue, which serializes writers
//! and batches concurrent readers; writers accumulate their effects in a
//! scoped transaction that commits as a single atomic backend batch.

pub mod api;
pub mod backend;
pub mod error;

mod attachments;
mod bulk;
mod changes;
mod compact;
mod keys;
mod queue;
mod registry;
mod store;
mod transaction;

pub use attachments::AttachmentData;
pub use bulk::BulkWriteOptions;
pub use changes::{ChangeFilter, ChangesOptions, ChangesResult, LiveChanges};
pub use error::{MissingReason, StoreError};
pub use store::{
    AllDocsOptions, AllDocsResponse, AllDocsRow, DbInfo, DocRowValue, DocWriteOk, EngineType,
    GetOptions, Store, StoreOptions,
};

pub use docrex_merge::{Change, ChangeRev, RevTree};
