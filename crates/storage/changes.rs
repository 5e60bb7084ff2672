//! Change feed: a historical scan over the sequence store plus a live mode
//! that re-runs the scan whenever a bulk write commits. Rows come back in
//! commit order; superseded rows (an older revision of a document that was
//! written again later) are skipped so each document appears at most once per
//! scan.

use crate::api::tables::BY_SEQ_STORE;
use crate::api::ScanOptions;
use crate::attachments;
use crate::error::StoreError;
use crate::keys::{format_seq, parse_seq};
use crate::store::{winner_of, Store, StoreInner};
use docrex_merge::{collect_conflicts, process_change, Change, DocMetadata};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Notify};

/// Caller-supplied predicate over assembled changes. Errors abort the scan
/// and surface to the caller.
pub type ChangeFilter = Arc<dyn Fn(&Change) -> Result<bool, StoreError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ChangesOptions {
    /// Exclusive lower bound on the reported sequences.
    pub since: u64,
    pub limit: Option<usize>,
    /// Scan from the newest sequence downward; `since` is ignored.
    pub descending: bool,
    pub include_docs: bool,
    /// Embed `_conflicts` into delivered documents.
    pub conflicts: bool,
    /// Replace attachment stubs with their base64 bodies.
    pub attachments: bool,
    /// Keep accepted changes in the result buffer (historical mode).
    pub return_docs: bool,
    /// Only report these document ids.
    pub doc_ids: Option<HashSet<String>>,
    pub filter: Option<ChangeFilter>,
}

impl std::fmt::Debug for ChangesOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesOptions")
            .field("since", &self.since)
            .field("limit", &self.limit)
            .field("descending", &self.descending)
            .field("include_docs", &self.include_docs)
            .field("filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct ChangesResult {
    pub results: Vec<Change>,
    pub last_seq: u64,
}

/// Handle on a live change feed: a stream of changes plus a cancel switch.
/// Cancellation is checked between rows, and a cancel racing the end of a
/// scan suppresses any further delivery.
pub struct LiveChanges {
    rx: mpsc::UnboundedReceiver<Change>,
    cancelled: Arc<AtomicBool>,
    cancel_notify: Arc<Notify>,
}

impl LiveChanges {
    /// Next change, or `None` once the feed ended (cancelled, limit reached,
    /// or database closed).
    pub async fn next(&mut self) -> Option<Change> {
        self.rx.recv().await
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a cancel landing before the task
        // reaches its select still wakes it.
        self.cancel_notify.notify_one();
    }
}

impl Store {
    /// One historical pass over the change feed.
    pub async fn changes(&self, opts: ChangesOptions) -> Result<ChangesResult, StoreError> {
        self.check_open()?;
        let inner = self.inner();
        let _guard = inner.queue.read().await;
        inner.changes_scan(&opts, opts.since, None)
    }

    /// Live tail: delivers the historical changes after `since`, then keeps
    /// re-scanning from the last reported sequence every time a write
    /// commits. The feed runs until cancelled, the limit is reached, or the
    /// database closes.
    pub fn changes_live(&self, opts: ChangesOptions) -> LiveChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_notify = Arc::new(Notify::new());
        let inner = self.inner().clone();
        let task_cancelled = cancelled.clone();
        let task_notify = cancel_notify.clone();
        let mut opts = opts;
        opts.return_docs = true;
        // Subscribing before the task spawns closes the gap between feed
        // registration and the next commit.
        let mut notifications = inner.notifier.subscribe();

        tokio::spawn(async move {
            let mut since = opts.since;
            let mut remaining = opts.limit;
            loop {
                if task_cancelled.load(Ordering::SeqCst) || inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                let batch = {
                    let _guard = inner.queue.read().await;
                    let mut scan_opts = opts.clone();
                    scan_opts.limit = remaining;
                    inner.changes_scan(&scan_opts, since, Some(&task_cancelled))
                };
                let batch = match batch {
                    Ok(batch) => batch,
                    Err(_) => return,
                };
                since = since.max(batch.last_seq);
                for change in batch.results {
                    if task_cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    if tx.send(change).is_err() {
                        return;
                    }
                    if let Some(remaining) = remaining.as_mut() {
                        *remaining -= 1;
                    }
                }
                if remaining == Some(0) {
                    return;
                }
                tokio::select! {
                    notification = notifications.recv() => match notification {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                    _ = task_notify.notified() => return,
                }
            }
        });

        LiveChanges {
            rx,
            cancelled,
            cancel_notify,
        }
    }
}

impl StoreInner {
    pub(crate) fn changes_scan(
        &self,
        opts: &ChangesOptions,
        since: u64,
        cancel: Option<&AtomicBool>,
    ) -> Result<ChangesResult, StoreError> {
        let mut scan = ScanOptions::default();
        if opts.descending {
            scan.reverse = true;
        } else {
            scan.gte = Some(format_seq(since).into_bytes());
        }

        let mut results = Vec::new();
        let mut last_seq = since;
        let mut emitted = 0usize;
        let mut metadata_cache: HashMap<String, DocMetadata> = HashMap::new();

        for row in self.backend.iter(BY_SEQ_STORE, scan)? {
            if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                break;
            }
            let (key, raw) = row?;
            let seq = parse_seq(&key)?;
            // The lower bound is exclusive: `since` itself is not a change.
            if !opts.descending && seq == since {
                continue;
            }

            let body: Value = serde_json::from_slice(&raw)?;
            let id = body
                .get("_id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    StoreError::Corrupt(format!("body at seq {seq} carries no _id"))
                })?
                .to_string();

            let metadata = match metadata_cache.get(&id) {
                Some(metadata) => metadata.clone(),
                None => {
                    let metadata = self.load_metadata(&id)?.ok_or_else(|| {
                        StoreError::Corrupt(format!("no metadata for document {id} at seq {seq}"))
                    })?;
                    metadata_cache.insert(id.clone(), metadata.clone());
                    metadata
                }
            };
            // A later revision of the document owns a higher sequence; this
            // row is stale and will be reported there instead.
            if metadata.seq != seq {
                continue;
            }

            let winner = winner_of(&metadata);
            let body_rev = body.get("_rev").and_then(Value::as_str);
            let doc = if body_rev == Some(winner.as_str()) {
                body
            } else {
                match metadata.rev_map.get(&winner) {
                    Some(&winner_seq) => self.load_body(winner_seq)?.unwrap_or(body),
                    None => body,
                }
            };

            let mut change = process_change(doc, &metadata, metadata.seq);
            if let Some(doc_ids) = &opts.doc_ids {
                if !doc_ids.contains(&change.id) {
                    continue;
                }
            }
            if let Some(filter) = &opts.filter {
                if !filter(&change)? {
                    continue;
                }
            }

            if opts.include_docs {
                if let Some(Value::Object(doc)) = change.doc.as_mut() {
                    if opts.conflicts {
                        let conflicts = collect_conflicts(&metadata);
                        if !conflicts.is_empty() {
                            doc.insert("_conflicts".to_string(), json!(conflicts));
                        }
                    }
                    if opts.attachments {
                        attachments::inline_attachments(self.backend.as_ref(), doc)?;
                    }
                }
            } else {
                change.doc = None;
            }

            last_seq = last_seq.max(change.seq);
            emitted += 1;
            if opts.return_docs {
                results.push(change);
            }
            if opts.limit.is_some_and(|limit| emitted >= limit) {
                break;
            }
        }

        Ok(ChangesResult { results, last_seq })
    }
}
