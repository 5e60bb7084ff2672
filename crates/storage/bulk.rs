//! Bulk-write pipeline: parse, verify attachment stubs, fetch prior
//! metadata, merge revision trees, and materialize one atomic batch. The
//! whole pipeline runs on the write lock inside a single scoped transaction,
//! so a batch either commits in full or leaves the database unchanged.

use crate::api::tables::{ATTACH_STORE, BINARY_STORE, BY_SEQ_STORE, DOC_STORE, META_STORE};
use crate::api::BatchOp;
use crate::attachments::{self, AttachmentPlan};
use crate::compact::compact_revs;
use crate::error::StoreError;
use crate::keys::{format_seq, is_local_id, META_DOC_COUNT, META_UPDATE_SEQ};
use crate::store::{DocWriteOk, Store, StoreInner};
use crate::transaction::Transaction;
use docrex_merge::{
    compact_tree, parse_doc, parse_rev, process_docs, DocDecision, DocMetadata, DocOutcome,
    ParsedDoc,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct BulkWriteOptions {
    /// When false the caller names revisions explicitly (replication-style
    /// writes); when true every document gets a fresh generated revision.
    pub new_edits: bool,
}

impl Default for BulkWriteOptions {
    fn default() -> Self {
        BulkWriteOptions { new_edits: true }
    }
}

impl Store {
    /// Writes a batch of documents. Results are positionally aligned with the
    /// input: accepted revisions report `{id, rev}`, rejected ones carry
    /// their error. Pre-processing failures (malformed documents, unknown
    /// stubs) fail the whole batch before anything is written.
    pub async fn bulk_write(
        &self,
        docs: Vec<Value>,
        opts: BulkWriteOptions,
    ) -> Result<Vec<Result<DocWriteOk, StoreError>>, StoreError> {
        self.check_open()?;
        let inner = self.inner();
        let _guard = inner.queue.write().await;
        let (results, committed_seq) = inner.bulk_write_sync(docs, &opts)?;
        // Successful commits wake every live change listener on the database.
        let _ = inner.notifier.send(committed_seq);
        Ok(results)
    }
}

impl StoreInner {
    fn bulk_write_sync(
        &self,
        docs: Vec<Value>,
        opts: &BulkWriteOptions,
    ) -> Result<(Vec<Result<DocWriteOk, StoreError>>, u64), StoreError> {
        let input_len = docs.len();

        // Stage 1: parse. Ids carrying the local marker bypass revision
        // handling entirely; parse failures reject the whole batch.
        let mut doc_infos: Vec<(usize, ParsedDoc)> = Vec::new();
        let mut locals: Vec<(usize, Value)> = Vec::new();
        for (idx, doc) in docs.into_iter().enumerate() {
            let local = doc
                .get("_id")
                .and_then(Value::as_str)
                .is_some_and(is_local_id);
            if local {
                locals.push((idx, doc));
            } else {
                doc_infos.push((idx, parse_doc(doc, opts.new_edits)?));
            }
        }

        // Decode inline attachment bodies up front; a bad base64 string is a
        // pre-processing failure.
        let mut attachment_plans: HashMap<usize, Vec<AttachmentPlan>> = HashMap::new();
        for (idx, parsed) in &doc_infos {
            let plans = attachments::extract_plans(&parsed.data)?;
            if !plans.is_empty() {
                attachment_plans.insert(*idx, plans);
            }
        }

        // Stage 2: every declared stub must already have an attachment row.
        for plans in attachment_plans.values() {
            for plan in plans.iter().filter(|plan| plan.is_stub()) {
                if self
                    .backend
                    .get(ATTACH_STORE, plan.digest.as_bytes())?
                    .is_none()
                {
                    return Err(StoreError::MissingStub(plan.digest.clone()));
                }
            }
        }

        // Stage 3: prior metadata, cached per id for the whole call.
        let mut txn = Transaction::new();
        let mut fetched: HashMap<String, DocMetadata> = HashMap::new();
        for (_, parsed) in &doc_infos {
            let id = &parsed.metadata.id;
            if !fetched.contains_key(id) {
                if let Some(metadata) = self.load_metadata_tx(&txn, id)? {
                    fetched.insert(id.clone(), metadata);
                }
            }
        }

        let mut results: Vec<Option<Result<DocWriteOk, StoreError>>> =
            (0..input_len).map(|_| None).collect();

        // Local docs fold into the same transaction; their failures stay
        // per-document, matching the post-parse propagation rules.
        for (idx, doc) in locals {
            let deleted = doc.get("_deleted").and_then(Value::as_bool) == Some(true);
            let outcome = if deleted {
                self.remove_local_tx(&mut txn, doc)
            } else {
                self.put_local_tx(&mut txn, doc)
            };
            match outcome {
                Ok(ok) => results[idx] = Some(Ok(ok)),
                Err(
                    err @ (StoreError::RevConflict
                    | StoreError::Missing(_)
                    | StoreError::BadArgument(_)),
                ) => results[idx] = Some(Err(err)),
                Err(err) => return Err(err),
            }
        }

        // Stages 4-6: revision merge drives per-doc writes through this
        // transaction, allocating sequences in input order.
        let old_update_seq = self.update_seq.load(Ordering::SeqCst);
        let mut new_update_seq = old_update_seq;
        let mut doc_count_delta: i64 = 0;
        let mut outcomes: Vec<Option<DocOutcome>> = vec![None; input_len];

        process_docs::<StoreError, _>(
            self.revs_limit,
            doc_infos,
            opts.new_edits,
            &mut fetched,
            &mut outcomes,
            &mut |idx, doc_info, decision| {
                self.write_doc(
                    &mut txn,
                    doc_info,
                    decision,
                    attachment_plans.remove(&idx),
                    &mut new_update_seq,
                    &mut doc_count_delta,
                )
            },
        )?;

        for (idx, outcome) in outcomes.into_iter().enumerate() {
            if results[idx].is_some() {
                continue;
            }
            results[idx] = match outcome {
                Some(DocOutcome::Written { id, rev }) => Some(Ok(DocWriteOk { id, rev })),
                Some(DocOutcome::Conflict) => Some(Err(StoreError::RevConflict)),
                None => None,
            };
        }

        // Stage 7: counters ride in the same atomic batch; the in-memory
        // copies update only after the backend accepted it.
        let old_doc_count = self.doc_count.load(Ordering::SeqCst);
        let new_doc_count = old_doc_count
            .checked_add_signed(doc_count_delta)
            .unwrap_or(0);
        txn.batch(vec![
            BatchOp::Put {
                table: META_STORE,
                key: META_UPDATE_SEQ.as_bytes().to_vec(),
                value: serde_json::to_vec(&new_update_seq)?,
            },
            BatchOp::Put {
                table: META_STORE,
                key: META_DOC_COUNT.as_bytes().to_vec(),
                value: serde_json::to_vec(&new_doc_count)?,
            },
        ]);
        txn.execute(self.backend.as_ref())?;
        self.update_seq.store(new_update_seq, Ordering::SeqCst);
        self.doc_count.store(new_doc_count, Ordering::SeqCst);
        debug!(
            db = %self.name,
            docs = input_len,
            update_seq = new_update_seq,
            "committed bulk write"
        );

        let results = results
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(StoreError::Corrupt(
                        "bulk write produced no result for an input document".to_string(),
                    ))
                })
            })
            .collect();
        Ok((results, new_update_seq))
    }

    /// Persists one accepted revision: attachment refs and bodies first, then
    /// the body row under a fresh sequence and the updated metadata.
    fn write_doc(
        &self,
        txn: &mut Transaction,
        doc_info: ParsedDoc,
        decision: &DocDecision,
        plans: Option<Vec<AttachmentPlan>>,
        new_update_seq: &mut u64,
        doc_count_delta: &mut i64,
    ) -> Result<DocMetadata, StoreError> {
        let ParsedDoc {
            mut metadata,
            rev,
            mut data,
            stemmed_revs,
            ..
        } = doc_info;

        metadata.winning_rev = Some(decision.winning_rev.clone());
        metadata.deleted = Some(decision.winning_rev_is_deleted);

        // A revision already recorded in the rev map was fully committed by
        // an earlier write: it gets no new sequence, and repeating the
        // attachment and compaction work below would double-count
        // references. The merge phase intercepts replays before they reach
        // this point, so this is the pipeline's backstop rather than a live
        // path.
        if let Some(&seq) = metadata.rev_map.get(&rev) {
            metadata.seq = seq;
            return Ok(metadata);
        }

        data.insert("_id".to_string(), Value::String(metadata.id.clone()));
        data.insert("_rev".to_string(), Value::String(rev.clone()));
        if decision.new_rev_is_deleted {
            data.insert("_deleted".to_string(), Value::Bool(true));
        }

        if let Some(plans) = plans {
            let rev_pos = parse_rev(&rev)?.pos;
            let mut stored = Map::new();
            for plan in plans {
                let entry = match &plan.stub_entry {
                    Some(stub) => stub.clone(),
                    None => {
                        let mut entry = Map::new();
                        if let Some(content_type) = &plan.content_type {
                            entry.insert(
                                "content_type".to_string(),
                                Value::String(content_type.clone()),
                            );
                        }
                        entry.insert("digest".to_string(), json!(plan.digest));
                        entry.insert("length".to_string(), json!(plan.length));
                        entry.insert("revpos".to_string(), json!(rev_pos));
                        entry.insert("stub".to_string(), Value::Bool(true));
                        Value::Object(entry)
                    }
                };
                stored.insert(plan.name.clone(), entry);

                let ref_key = format!("{}@{}", metadata.id, rev);
                let is_new = attachments::save_attachment_refs(
                    self.backend.as_ref(),
                    txn,
                    &plan.digest,
                    &ref_key,
                )?;
                if let Some(bytes) = &plan.data {
                    if is_new && !bytes.is_empty() {
                        txn.push(BatchOp::Put {
                            table: BINARY_STORE,
                            key: plan.digest.clone().into_bytes(),
                            value: bytes.to_vec(),
                        });
                    }
                }
            }
            data.insert("_attachments".to_string(), Value::Object(stored));
        }

        // Revisions stemmed out of the tree are reclaimed inside this same
        // transaction, as are the interior revisions when auto-compaction is
        // on.
        if !stemmed_revs.is_empty() {
            compact_revs(self, txn, &metadata.id, &metadata.rev_map, &stemmed_revs)?;
        }
        if self.auto_compaction && decision.is_update {
            let obsolete = compact_tree(&mut metadata);
            if !obsolete.is_empty() {
                compact_revs(self, txn, &metadata.id, &metadata.rev_map, &obsolete)?;
            }
        }

        *new_update_seq += 1;
        let seq = *new_update_seq;
        metadata.rev_map.insert(rev.clone(), seq);
        metadata.seq = seq;
        txn.batch(vec![
            BatchOp::Put {
                table: BY_SEQ_STORE,
                key: format_seq(seq).into_bytes(),
                value: serde_json::to_vec(&Value::Object(data))?,
            },
            BatchOp::Put {
                table: DOC_STORE,
                key: metadata.id.clone().into_bytes(),
                value: serde_json::to_vec(&metadata)?,
            },
        ]);
        *doc_count_delta += decision.doc_count_delta;
        Ok(metadata)
    }
}
