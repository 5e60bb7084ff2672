//! Compaction: prune interior revisions from every document's tree, delete
//! their stored bodies, and garbage-collect attachment rows whose last
//! reference went away.

use crate::api::tables::{ATTACH_STORE, BINARY_STORE, BY_SEQ_STORE, DOC_STORE};
use crate::api::{BatchOp, ScanOptions};
use crate::attachments::AttachRow;
use crate::error::StoreError;
use crate::keys::format_seq;
use crate::store::{Store, StoreInner};
use crate::transaction::Transaction;
use docrex_merge::{compact_tree, DocMetadata};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

impl Store {
    /// Compacts the whole database: every available non-leaf revision is
    /// marked missing, its body row deleted, and orphaned attachments
    /// reclaimed. Runs on the write lock; each document commits its own
    /// atomic batch.
    pub async fn compact(&self) -> Result<(), StoreError> {
        self.check_open()?;
        let inner = self.inner();
        let _guard = inner.queue.write().await;
        inner.compact_all()
    }
}

impl StoreInner {
    fn compact_all(&self) -> Result<(), StoreError> {
        let mut metadatas: Vec<DocMetadata> = Vec::new();
        for row in self.backend.iter(DOC_STORE, ScanOptions::default())? {
            let (_key, raw) = row?;
            metadatas.push(serde_json::from_slice(&raw)?);
        }

        let mut compacted = 0usize;
        for mut metadata in metadatas {
            let revs = compact_tree(&mut metadata);
            if revs.is_empty() {
                continue;
            }
            let mut txn = Transaction::new();
            txn.push(BatchOp::Put {
                table: DOC_STORE,
                key: metadata.id.clone().into_bytes(),
                value: serde_json::to_vec(&metadata)?,
            });
            compact_revs(self, &mut txn, &metadata.id, &metadata.rev_map, &revs)?;
            txn.execute(self.backend.as_ref())?;
            compacted += 1;
        }
        debug!(db = %self.name, docs = compacted, "compaction finished");
        Ok(())
    }
}

/// Reclaims a set of revisions of one document inside the given transaction:
/// deletes their body rows, drops their attachment references, and removes
/// attachment rows (and binaries) whose reference map emptied out. The caller
/// owns the commit.
pub(crate) fn compact_revs(
    inner: &StoreInner,
    txn: &mut Transaction,
    id: &str,
    rev_map: &BTreeMap<String, u64>,
    revs: &[String],
) -> Result<(), StoreError> {
    if revs.is_empty() {
        return Ok(());
    }

    let mut digests: BTreeSet<String> = BTreeSet::new();
    for rev in revs {
        let Some(&seq) = rev_map.get(rev) else {
            continue;
        };
        let key = format_seq(seq).into_bytes();
        if let Some(raw) = txn.get(inner.backend.as_ref(), BY_SEQ_STORE, &key)? {
            let body: Value = serde_json::from_slice(&raw)?;
            if let Some(atts) = body.get("_attachments").and_then(Value::as_object) {
                for att in atts.values() {
                    if let Some(digest) = att.get("digest").and_then(Value::as_str) {
                        digests.insert(digest.to_string());
                    }
                }
            }
        }
        txn.push(BatchOp::Delete {
            table: BY_SEQ_STORE,
            key,
        });
    }

    let dropped_refs: BTreeSet<String> = revs.iter().map(|rev| format!("{id}@{rev}")).collect();
    for digest in digests {
        let Some(raw) = txn.get(inner.backend.as_ref(), ATTACH_STORE, digest.as_bytes())? else {
            continue;
        };
        let mut row: AttachRow = serde_json::from_slice(&raw)?;
        let Some(refs) = row.refs.as_mut() else {
            // Rows predating reference tracking are retained indefinitely.
            continue;
        };
        refs.retain(|reference, _| !dropped_refs.contains(reference));
        if refs.is_empty() {
            txn.push(BatchOp::Delete {
                table: ATTACH_STORE,
                key: digest.clone().into_bytes(),
            });
            txn.push(BatchOp::Delete {
                table: BINARY_STORE,
                key: digest.into_bytes(),
            });
        } else {
            txn.push(BatchOp::Put {
                table: ATTACH_STORE,
                key: digest.into_bytes(),
                value: serde_json::to_vec(&row)?,
            });
        }
    }
    Ok(())
}
