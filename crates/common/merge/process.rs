use crate::error::MergeError;
use crate::graft::{merge, MergeKind};
use crate::metadata::DocMetadata;
use crate::parse::{parse_doc, ParsedDoc};
use crate::rev::parse_rev;
use crate::tree::rev_exists;
use crate::winner::{is_deleted, winning_rev};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// What the merge phase decided for one accepted document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocDecision {
    pub winning_rev: String,
    pub winning_rev_is_deleted: bool,
    pub new_rev_is_deleted: bool,
    pub is_update: bool,
    /// Net change to the live-document count this write causes.
    pub doc_count_delta: i64,
}

/// Positional outcome of one document in a batch.
#[derive(Clone, Debug, PartialEq)]
pub enum DocOutcome {
    Written { id: String, rev: String },
    Conflict,
}

/// Drives the revision-merge phase of a bulk write.
///
/// Documents are visited in input order; `fetched_docs` carries the prior
/// metadata per id and is updated after every accepted write so later
/// documents in the same batch observe their predecessors. `write_doc`
/// persists one accepted revision and returns the metadata it stored.
/// Conflicts land per-document in `results` without failing the batch.
pub fn process_docs<E, F>(
    revs_limit: usize,
    doc_infos: Vec<(usize, ParsedDoc)>,
    new_edits: bool,
    fetched_docs: &mut HashMap<String, DocMetadata>,
    results: &mut [Option<DocOutcome>],
    write_doc: &mut F,
) -> Result<(), E>
where
    E: From<MergeError>,
    F: FnMut(usize, ParsedDoc, &DocDecision) -> Result<DocMetadata, E>,
{
    for (idx, doc_info) in doc_infos {
        let prev = fetched_docs.get(&doc_info.metadata.id).cloned();
        match prev {
            Some(prev) => update_doc(
                revs_limit,
                prev,
                doc_info,
                idx,
                new_edits,
                fetched_docs,
                results,
                write_doc,
            )?,
            None => insert_doc(doc_info, idx, fetched_docs, results, write_doc)?,
        }
    }
    Ok(())
}

fn insert_doc<E, F>(
    doc_info: ParsedDoc,
    idx: usize,
    fetched_docs: &mut HashMap<String, DocMetadata>,
    results: &mut [Option<DocOutcome>],
    write_doc: &mut F,
) -> Result<(), E>
where
    E: From<MergeError>,
    F: FnMut(usize, ParsedDoc, &DocDecision) -> Result<DocMetadata, E>,
{
    let winner = winning_rev(&doc_info.metadata);
    let deleted = is_deleted(&doc_info.metadata, Some(&winner));
    let decision = DocDecision {
        winning_rev: winner,
        winning_rev_is_deleted: deleted,
        new_rev_is_deleted: deleted,
        is_update: false,
        doc_count_delta: i64::from(!deleted),
    };
    let id = doc_info.metadata.id.clone();
    let rev = doc_info.rev.clone();
    let stored = write_doc(idx, doc_info, &decision)?;
    results[idx] = Some(DocOutcome::Written {
        id: id.clone(),
        rev,
    });
    fetched_docs.insert(id, stored);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn update_doc<E, F>(
    revs_limit: usize,
    prev: DocMetadata,
    doc_info: ParsedDoc,
    idx: usize,
    new_edits: bool,
    fetched_docs: &mut HashMap<String, DocMetadata>,
    results: &mut [Option<DocOutcome>],
    write_doc: &mut F,
) -> Result<(), E>
where
    E: From<MergeError>,
    F: FnMut(usize, ParsedDoc, &DocDecision) -> Result<DocMetadata, E>,
{
    if !new_edits {
        if let Ok(info) = parse_rev(&doc_info.rev) {
            if rev_exists(&prev.rev_tree, info.pos, &info.id) {
                // Replayed write: already part of the tree, nothing to store.
                results[idx] = Some(DocOutcome::Written {
                    id: doc_info.metadata.id.clone(),
                    rev: doc_info.rev,
                });
                return Ok(());
            }
        }
    }

    let prev_winner = prev
        .winning_rev
        .clone()
        .unwrap_or_else(|| winning_rev(&prev));
    let previously_deleted = prev
        .deleted
        .unwrap_or_else(|| is_deleted(&prev, Some(&prev_winner)));
    let mut doc_info = doc_info;
    let deleted = doc_info.deleted;
    let is_root = doc_info.rev.starts_with("1-");

    // Editing a deleted document without naming a parent resurrects it on top
    // of the deleted winner rather than forking a second root.
    if previously_deleted && !deleted && new_edits && is_root {
        let mut body = doc_info.data.clone();
        body.insert("_id".to_string(), Value::String(doc_info.metadata.id.clone()));
        body.insert("_rev".to_string(), Value::String(prev_winner.clone()));
        doc_info = parse_doc(Value::Object(body), new_edits).map_err(E::from)?;
    }

    let merged = merge(&prev.rev_tree, doc_info.metadata.rev_tree[0].clone(), revs_limit);
    let in_conflict = new_edits
        && ((previously_deleted && deleted && merged.kind != MergeKind::NewLeaf)
            || (!previously_deleted && merged.kind != MergeKind::NewLeaf)
            || (previously_deleted && !deleted && merged.kind == MergeKind::NewBranch));
    if in_conflict {
        results[idx] = Some(DocOutcome::Conflict);
        return Ok(());
    }

    let new_rev = doc_info.rev.clone();
    doc_info.metadata.rev_tree = merged.tree;
    doc_info.stemmed_revs = merged.stemmed_revs;
    doc_info.metadata.rev_map = prev.rev_map.clone();

    let winner = winning_rev(&doc_info.metadata);
    let winner_deleted = is_deleted(&doc_info.metadata, Some(&winner));
    let doc_count_delta = match (previously_deleted, winner_deleted) {
        (true, false) => 1,
        (false, true) => -1,
        _ => 0,
    };
    let new_rev_is_deleted = if new_rev == winner {
        winner_deleted
    } else {
        is_deleted(&doc_info.metadata, Some(&new_rev))
    };

    let decision = DocDecision {
        winning_rev: winner,
        winning_rev_is_deleted: winner_deleted,
        new_rev_is_deleted,
        is_update: true,
        doc_count_delta,
    };
    let id = doc_info.metadata.id.clone();
    let stored = write_doc(idx, doc_info, &decision)?;
    results[idx] = Some(DocOutcome::Written { id: id.clone(), rev: new_rev });
    fetched_docs.insert(id, stored);
    Ok(())
}

/// One row of the change feed.
#[derive(Clone, Debug, Serialize)]
pub struct Change {
    pub id: String,
    pub seq: u64,
    pub changes: Vec<ChangeRev>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChangeRev {
    pub rev: String,
}

/// Assembles a change-feed row from a stored body and its metadata. The body
/// is expected to carry its `_rev`; a body without one yields an empty
/// change list.
pub fn process_change(doc: Value, metadata: &DocMetadata, seq: u64) -> Change {
    let rev = doc
        .get("_rev")
        .and_then(Value::as_str)
        .map(str::to_string);
    let deleted = rev
        .as_deref()
        .map(|rev| is_deleted(metadata, Some(rev)))
        .unwrap_or(false);
    Change {
        id: metadata.id.clone(),
        seq,
        changes: rev.into_iter().map(|rev| ChangeRev { rev }).collect(),
        deleted,
        doc: Some(doc),
    }
}
