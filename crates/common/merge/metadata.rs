use crate::tree::RevTree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The stored per-document metadata row: the revision tree plus the mapping
/// from revision to the update sequence its body was written under.
/// `winning_rev` and `deleted` memoize derivations of the tree so read paths
/// do not recompute them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub id: String,
    pub rev_tree: RevTree,
    #[serde(default)]
    pub rev_map: BTreeMap<String, u64>,
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winning_rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

impl DocMetadata {
    pub fn new(id: String, rev_tree: RevTree) -> Self {
        DocMetadata {
            id,
            rev_tree,
            rev_map: BTreeMap::new(),
            seq: 0,
            winning_rev: None,
            deleted: None,
        }
    }
}
