//! Revision model for docrex documents.
//!
//! Every document carries a tree of revisions: a forest of rooted paths where
//! each node is one revision hash. Edits append leaves, replication-style
//! writes (`new_edits = false`) graft whole paths, and compaction marks
//! interior revisions as missing without forgetting the shape of the history.
//! This crate owns that tree plus the pure helpers the storage engine drives
//! it with: parsing user documents into revisions, merging edit paths,
//! electing a winning revision, and walking a batch of parsed documents into
//! per-document write decisions.
//!
//! Nothing in here performs I/O; the storage engine supplies the persistence
//! via the `write_doc` callback of [`process_docs`].

pub mod error;
mod graft;
mod metadata;
mod parse;
mod process;
mod rev;
mod tree;
mod winner;

pub use error::MergeError;
pub use graft::{merge, MergeKind, Merged};
pub use metadata::DocMetadata;
pub use parse::{parse_doc, validate_doc_id, ParsedDoc};
pub use process::{
    process_change, process_docs, Change, ChangeRev, DocDecision, DocOutcome,
};
pub use rev::{format_rev, new_rev_id, parse_rev, RevisionInfo, Revisions};
pub use tree::{
    collect_leaves, rev_exists, root_to_leaf, traverse, Leaf, PathNode, RevNode, RevPath, RevRoot,
    RevStatus, RevTree,
};
pub use winner::{collect_conflicts, compact_tree, is_deleted, winning_rev};
