use crate::api::tables::{BY_SEQ_STORE, DOC_STORE, LOCAL_STORE, META_STORE};
use crate::api::{BatchOp, ScanOptions, StorageBackend};
use crate::attachments::{self, AttachmentData};
use crate::backend::in_memory::InMemoryBackend;
use crate::error::StoreError;
use crate::keys::{format_seq, is_local_id, META_DOC_COUNT, META_UPDATE_SEQ, META_UUID};
use crate::queue::OperationQueue;
use crate::registry;
use crate::transaction::Transaction;
use docrex_merge::{
    collect_conflicts, is_deleted, parse_rev, root_to_leaf, winning_rev, DocMetadata, RevTree,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Which backend a database is stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineType {
    InMemory,
    Fjall,
}

impl EngineType {
    pub(crate) fn label(self) -> &'static str {
        match self {
            EngineType::InMemory => "in-memory",
            EngineType::Fjall => "fjall",
        }
    }
}

/// Options recognized at open.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    pub engine: EngineType,
    pub create_if_missing: bool,
    /// Accepted for API compatibility; pre-existing database migration is
    /// out of scope and the flag changes nothing.
    pub no_migrate: bool,
    /// Reclaim obsolete revisions inside every bulk write.
    pub auto_compaction: bool,
    /// Depth at which revision histories are stemmed.
    pub revs_limit: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            engine: EngineType::InMemory,
            create_if_missing: true,
            no_migrate: false,
            auto_compaction: false,
            revs_limit: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DbInfo {
    pub db_name: String,
    pub engine: &'static str,
    pub doc_count: u64,
    pub update_seq: u64,
    pub auto_compaction: bool,
}

/// Successful write of one document revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocWriteOk {
    pub id: String,
    pub rev: String,
}

#[derive(Clone, Debug, Default)]
pub struct GetOptions {
    /// Fetch this exact revision instead of the winner.
    pub rev: Option<String>,
    /// Embed `_revisions` (the winner's ancestry) into the result.
    pub revs: bool,
    /// Embed `_conflicts` (non-winning live leaves) into the result.
    pub conflicts: bool,
    /// Replace attachment stubs with their base64 bodies.
    pub attachments: bool,
}

#[derive(Clone, Debug)]
pub struct AllDocsOptions {
    pub start_key: Option<String>,
    pub end_key: Option<String>,
    /// Equality match; overrides the range bounds.
    pub key: Option<String>,
    pub descending: bool,
    pub skip: usize,
    pub limit: Option<usize>,
    pub include_docs: bool,
    pub conflicts: bool,
    pub attachments: bool,
    pub inclusive_end: bool,
    /// Include tombstones as `{value: {rev, deleted: true}, doc: null}` rows.
    pub include_deleted: bool,
}

impl Default for AllDocsOptions {
    fn default() -> Self {
        AllDocsOptions {
            start_key: None,
            end_key: None,
            key: None,
            descending: false,
            skip: 0,
            limit: None,
            include_docs: false,
            conflicts: false,
            attachments: false,
            inclusive_end: true,
            include_deleted: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocRowValue {
    pub rev: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllDocsRow {
    pub id: String,
    pub key: String,
    pub value: DocRowValue,
    pub doc: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AllDocsResponse {
    pub total_rows: u64,
    pub offset: usize,
    pub rows: Vec<AllDocsRow>,
}

/// The shared state of one open database. Every `Store::open` of the same
/// `(engine, name)` pair returns a handle to the same instance, so the
/// operation queue, counters, and change notifier are database-wide.
pub(crate) struct StoreInner {
    pub(crate) name: String,
    pub(crate) engine: EngineType,
    pub(crate) backend: Box<dyn StorageBackend>,
    pub(crate) queue: OperationQueue,
    pub(crate) uuid: String,
    pub(crate) auto_compaction: bool,
    pub(crate) revs_limit: usize,
    /// Authoritative while the database is open; bootstrapped from the meta
    /// store and written back on every commit.
    pub(crate) update_seq: AtomicU64,
    pub(crate) doc_count: AtomicU64,
    pub(crate) closed: AtomicBool,
    /// Fires with the committed update seq after every successful bulk
    /// write; live change feeds rescan on it.
    pub(crate) notifier: broadcast::Sender<u64>,
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInner")
            .field("name", &self.name)
            .field("engine", &self.engine.label())
            .finish_non_exhaustive()
    }
}

/// Main interface to one docrex database.
///
/// `Store` is `Clone`; clones share the same underlying instance. Reads and
/// writes are `async` and scheduled by the database's operation queue:
/// writers run alone in submission order, concurrent readers are batched.
#[derive(Clone, Debug)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens (or creates) the named database. The instance uuid, document
    /// count, and last update sequence are bootstrapped from the meta store.
    pub fn open(name: &str, opts: StoreOptions) -> Result<Store, StoreError> {
        let inner = registry::acquire(opts.engine.label(), name, || StoreInner::boot(name, &opts))?;
        Ok(Store { inner })
    }

    /// Releases this handle. The backend closes once the last handle for the
    /// name is gone; the data survives until [`Store::destroy`].
    pub fn close(self) -> Result<(), StoreError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::NotOpen);
        }
        if let Some(inner) = registry::release(self.inner.engine.label(), &self.inner.name)? {
            inner.closed.store(true, Ordering::SeqCst);
            inner.backend.close()?;
            debug!(db = %inner.name, "closed database");
        }
        Ok(())
    }

    /// Closes any live handle for the name and deletes the stored data.
    pub fn destroy(name: &str, engine: EngineType) -> Result<(), StoreError> {
        if let Some(inner) = registry::evict(engine.label(), name)? {
            inner.closed.store(true, Ordering::SeqCst);
            inner.backend.close()?;
        }
        match engine {
            EngineType::InMemory => InMemoryBackend::destroy(name)?,
            #[cfg(feature = "fjall")]
            EngineType::Fjall => {
                if let Err(err) = std::fs::remove_dir_all(name) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return Err(StoreError::Backend(err.to_string()));
                    }
                }
            }
            #[cfg(not(feature = "fjall"))]
            EngineType::Fjall => return Err(StoreError::BackendUnavailable("fjall")),
        }
        info!(db = %name, "destroyed database");
        Ok(())
    }

    pub(crate) fn check_open(&self) -> Result<(), StoreError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(StoreError::NotOpen);
        }
        Ok(())
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    pub async fn info(&self) -> Result<DbInfo, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        Ok(DbInfo {
            db_name: self.inner.name.clone(),
            engine: self.inner.engine.label(),
            doc_count: self.inner.doc_count.load(Ordering::SeqCst),
            update_seq: self.inner.update_seq.load(Ordering::SeqCst),
            auto_compaction: self.inner.auto_compaction,
        })
    }

    /// The instance uuid, generated at first open and immutable after.
    pub async fn id(&self) -> Result<String, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        Ok(self.inner.uuid.clone())
    }

    /// Fetches a document. Without an explicit `rev` this returns the winning
    /// revision, or `Missing("deleted")` when the winner is a tombstone.
    /// Local ids are routed to the local store.
    pub async fn get(&self, id: &str, opts: GetOptions) -> Result<Value, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        if is_local_id(id) {
            return self.inner.get_local_sync(id);
        }
        self.inner.get_sync(id, &opts)
    }

    /// The raw revision tree of a document.
    pub async fn get_revision_tree(&self, id: &str) -> Result<RevTree, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        let metadata = self
            .inner
            .load_metadata(id)?
            .ok_or_else(StoreError::missing)?;
        Ok(metadata.rev_tree)
    }

    /// Fetches an attachment body by digest. An absent body reads as empty,
    /// which is the legal representation of a zero-length attachment.
    pub async fn get_attachment(
        &self,
        digest: &str,
        binary: bool,
    ) -> Result<AttachmentData, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        let bytes = attachments::read_attachment(self.inner.backend.as_ref(), digest)?;
        Ok(if binary {
            AttachmentData::Binary(bytes)
        } else {
            use base64::Engine as _;
            AttachmentData::Base64(base64::engine::general_purpose::STANDARD.encode(&bytes))
        })
    }

    /// Ordered page over the document store.
    pub async fn all_docs(&self, opts: AllDocsOptions) -> Result<AllDocsResponse, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        self.inner.all_docs_sync(&opts)
    }

    pub async fn get_local(&self, id: &str) -> Result<Value, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.read().await;
        self.inner.get_local_sync(id)
    }

    pub async fn put_local(&self, doc: Value) -> Result<DocWriteOk, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.write().await;
        let mut txn = Transaction::new();
        let result = self.inner.put_local_tx(&mut txn, doc)?;
        txn.execute(self.inner.backend.as_ref())?;
        Ok(result)
    }

    pub async fn remove_local(&self, doc: Value) -> Result<DocWriteOk, StoreError> {
        self.check_open()?;
        let _guard = self.inner.queue.write().await;
        let mut txn = Transaction::new();
        let result = self.inner.remove_local_tx(&mut txn, doc)?;
        txn.execute(self.inner.backend.as_ref())?;
        Ok(result)
    }
}

/// Winning rev, preferring the memoized copy.
pub(crate) fn winner_of(metadata: &DocMetadata) -> String {
    metadata
        .winning_rev
        .clone()
        .unwrap_or_else(|| winning_rev(metadata))
}

/// Tombstone flag of the winner, preferring the memoized copy.
pub(crate) fn winner_deleted(metadata: &DocMetadata, winner: &str) -> bool {
    metadata
        .deleted
        .unwrap_or_else(|| is_deleted(metadata, Some(winner)))
}

impl StoreInner {
    fn boot(name: &str, opts: &StoreOptions) -> Result<Arc<StoreInner>, StoreError> {
        let backend: Box<dyn StorageBackend> = match opts.engine {
            EngineType::InMemory => Box::new(InMemoryBackend::open(name, opts.create_if_missing)?),
            #[cfg(feature = "fjall")]
            EngineType::Fjall => Box::new(crate::backend::fjall::FjallBackend::open(
                name,
                opts.create_if_missing,
            )?),
            #[cfg(not(feature = "fjall"))]
            EngineType::Fjall => return Err(StoreError::BackendUnavailable("fjall")),
        };

        let uuid = match backend.get(META_STORE, META_UUID.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => {
                let uuid = Uuid::new_v4().simple().to_string();
                backend.write_batch(vec![
                    BatchOp::Put {
                        table: META_STORE,
                        key: META_UUID.as_bytes().to_vec(),
                        value: serde_json::to_vec(&uuid)?,
                    },
                    BatchOp::Put {
                        table: META_STORE,
                        key: META_DOC_COUNT.as_bytes().to_vec(),
                        value: serde_json::to_vec(&0u64)?,
                    },
                    BatchOp::Put {
                        table: META_STORE,
                        key: META_UPDATE_SEQ.as_bytes().to_vec(),
                        value: serde_json::to_vec(&0u64)?,
                    },
                ])?;
                uuid
            }
        };
        let doc_count: u64 = match backend.get(META_STORE, META_DOC_COUNT.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => 0,
        };
        let update_seq: u64 = match backend.get(META_STORE, META_UPDATE_SEQ.as_bytes())? {
            Some(raw) => serde_json::from_slice(&raw)?,
            None => 0,
        };

        let (notifier, _) = broadcast::channel(256);
        info!(
            db = %name,
            engine = opts.engine.label(),
            doc_count,
            update_seq,
            "opened database"
        );
        Ok(Arc::new(StoreInner {
            name: name.to_string(),
            engine: opts.engine,
            backend,
            queue: OperationQueue::new(),
            uuid,
            auto_compaction: opts.auto_compaction,
            revs_limit: opts.revs_limit,
            update_seq: AtomicU64::new(update_seq),
            doc_count: AtomicU64::new(doc_count),
            closed: AtomicBool::new(false),
            notifier,
        }))
    }

    pub(crate) fn load_metadata(&self, id: &str) -> Result<Option<DocMetadata>, StoreError> {
        match self.backend.get(DOC_STORE, id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn load_metadata_tx(
        &self,
        txn: &Transaction,
        id: &str,
    ) -> Result<Option<DocMetadata>, StoreError> {
        match txn.get(self.backend.as_ref(), DOC_STORE, id.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn load_body(&self, seq: u64) -> Result<Option<Value>, StoreError> {
        match self.backend.get(BY_SEQ_STORE, format_seq(seq).as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_sync(&self, id: &str, opts: &GetOptions) -> Result<Value, StoreError> {
        let metadata = self.load_metadata(id)?.ok_or_else(StoreError::missing)?;
        let rev = match &opts.rev {
            Some(rev) => rev.clone(),
            None => {
                let winner = winner_of(&metadata);
                if winner_deleted(&metadata, &winner) {
                    return Err(StoreError::deleted());
                }
                winner
            }
        };
        let seq = *metadata
            .rev_map
            .get(&rev)
            .ok_or_else(StoreError::missing)?;
        let body = self.load_body(seq)?.ok_or_else(StoreError::missing)?;

        let Value::Object(mut doc) = body else {
            return Err(StoreError::Corrupt(format!(
                "body of {id} at seq {seq} is not an object"
            )));
        };
        if let Some(body_id) = doc.get("_id").and_then(Value::as_str) {
            if body_id != metadata.id {
                return Err(StoreError::Corrupt(format!(
                    "body at seq {seq} claims id {body_id}, metadata says {}",
                    metadata.id
                )));
            }
        }
        if let Some(body_rev) = doc.get("_rev").and_then(Value::as_str) {
            if body_rev != rev {
                return Err(StoreError::Corrupt(format!(
                    "body at seq {seq} claims rev {body_rev}, expected {rev}"
                )));
            }
        }
        doc.insert("_id".to_string(), Value::String(metadata.id.clone()));
        doc.insert("_rev".to_string(), Value::String(rev.clone()));

        if opts.conflicts {
            let conflicts = collect_conflicts(&metadata);
            if !conflicts.is_empty() {
                doc.insert("_conflicts".to_string(), json!(conflicts));
            }
        }
        if opts.revs {
            embed_revisions(&mut doc, &metadata, &rev);
        }
        if opts.attachments {
            attachments::inline_attachments(self.backend.as_ref(), &mut doc)?;
        }
        Ok(Value::Object(doc))
    }

    fn all_docs_sync(&self, opts: &AllDocsOptions) -> Result<AllDocsResponse, StoreError> {
        let total_rows = self.doc_count.load(Ordering::SeqCst);
        let empty = AllDocsResponse {
            total_rows,
            offset: opts.skip,
            rows: Vec::new(),
        };
        if opts.limit == Some(0) {
            return Ok(empty);
        }

        let mut scan = ScanOptions {
            reverse: opts.descending,
            ..Default::default()
        };
        if let Some(key) = &opts.key {
            scan.gte = Some(key.clone().into_bytes());
            scan.lte = Some(key.clone().into_bytes());
        } else {
            let exclusive_end = !opts.inclusive_end && opts.end_key.is_some();
            if opts.descending {
                // startkey names the high end of a descending scan.
                scan.lte = opts.start_key.clone().map(String::into_bytes);
                let end = opts.end_key.clone().map(String::into_bytes);
                if exclusive_end {
                    scan.gt = end;
                } else {
                    scan.gte = end;
                }
            } else {
                scan.gte = opts.start_key.clone().map(String::into_bytes);
                let end = opts.end_key.clone().map(String::into_bytes);
                if exclusive_end {
                    scan.lt = end;
                } else {
                    scan.lte = end;
                }
            }
        }
        // A reversed range is an empty page, never an implicit reverse scan.
        let low = scan.gt.as_ref().or(scan.gte.as_ref());
        let high = scan.lt.as_ref().or(scan.lte.as_ref());
        if let (Some(low), Some(high)) = (low, high) {
            if low > high {
                return Ok(empty);
            }
        }

        let mut rows = Vec::new();
        let mut to_skip = opts.skip;
        for entry in self.backend.iter(DOC_STORE, scan)? {
            let (_key, raw) = entry?;
            let metadata: DocMetadata = serde_json::from_slice(&raw)?;
            let winner = winner_of(&metadata);
            let deleted = winner_deleted(&metadata, &winner);
            if deleted && !opts.include_deleted {
                continue;
            }
            // skip drops non-deleted results only; tombstone rows never
            // consume the budget.
            if !deleted && to_skip > 0 {
                to_skip -= 1;
                continue;
            }

            let mut row = AllDocsRow {
                id: metadata.id.clone(),
                key: metadata.id.clone(),
                value: DocRowValue {
                    rev: winner.clone(),
                    deleted: deleted.then_some(true),
                },
                doc: None,
            };
            if !deleted && opts.include_docs {
                if let Some(&seq) = metadata.rev_map.get(&winner) {
                    if let Some(Value::Object(mut doc)) = self.load_body(seq)? {
                        doc.insert("_id".to_string(), Value::String(metadata.id.clone()));
                        doc.insert("_rev".to_string(), Value::String(winner.clone()));
                        if opts.conflicts {
                            let conflicts = collect_conflicts(&metadata);
                            if !conflicts.is_empty() {
                                doc.insert("_conflicts".to_string(), json!(conflicts));
                            }
                        }
                        if opts.attachments {
                            attachments::inline_attachments(self.backend.as_ref(), &mut doc)?;
                        }
                        row.doc = Some(Value::Object(doc));
                    }
                }
            }
            rows.push(row);
            if opts.limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
        }
        Ok(AllDocsResponse {
            total_rows,
            offset: opts.skip,
            rows,
        })
    }

    pub(crate) fn get_local_sync(&self, id: &str) -> Result<Value, StoreError> {
        if !is_local_id(id) {
            return Err(StoreError::BadArgument(format!(
                "{id} is not a local document id"
            )));
        }
        match self.backend.get(LOCAL_STORE, id.as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(StoreError::missing()),
        }
    }

    /// Local-doc write against a caller-owned transaction; bulk writes use
    /// this to fold local docs into their own commit.
    pub(crate) fn put_local_tx(
        &self,
        txn: &mut Transaction,
        doc: Value,
    ) -> Result<DocWriteOk, StoreError> {
        let Value::Object(mut doc) = doc else {
            return Err(StoreError::BadArgument(
                "local document must be a JSON object".to_string(),
            ));
        };
        let id = local_doc_id(&doc)?;
        let supplied_rev = match doc.remove("_rev") {
            Some(Value::String(rev)) => Some(rev),
            None | Some(Value::Null) => None,
            Some(_) => {
                return Err(StoreError::BadArgument("_rev must be a string".to_string()));
            }
        };

        let existing = txn.get(self.backend.as_ref(), LOCAL_STORE, id.as_bytes())?;
        match &existing {
            Some(raw) => {
                let stored: Value = serde_json::from_slice(raw)?;
                let stored_rev = stored.get("_rev").and_then(Value::as_str);
                if supplied_rev.as_deref() != stored_rev {
                    return Err(StoreError::RevConflict);
                }
            }
            None => {
                if supplied_rev.is_some() {
                    return Err(StoreError::RevConflict);
                }
            }
        }

        let generation = match &supplied_rev {
            Some(rev) => local_rev_generation(rev)?,
            None => 0,
        };
        let new_rev = format!("0-{}", generation + 1);
        doc.insert("_rev".to_string(), Value::String(new_rev.clone()));
        txn.push(BatchOp::Put {
            table: LOCAL_STORE,
            key: id.as_bytes().to_vec(),
            value: serde_json::to_vec(&Value::Object(doc))?,
        });
        Ok(DocWriteOk { id, rev: new_rev })
    }

    pub(crate) fn remove_local_tx(
        &self,
        txn: &mut Transaction,
        doc: Value,
    ) -> Result<DocWriteOk, StoreError> {
        let Value::Object(doc) = doc else {
            return Err(StoreError::BadArgument(
                "local document must be a JSON object".to_string(),
            ));
        };
        let id = local_doc_id(&doc)?;
        let supplied_rev = doc.get("_rev").and_then(Value::as_str);

        let Some(raw) = txn.get(self.backend.as_ref(), LOCAL_STORE, id.as_bytes())? else {
            return Err(StoreError::missing());
        };
        let stored: Value = serde_json::from_slice(&raw)?;
        if supplied_rev != stored.get("_rev").and_then(Value::as_str) {
            return Err(StoreError::RevConflict);
        }
        txn.push(BatchOp::Delete {
            table: LOCAL_STORE,
            key: id.as_bytes().to_vec(),
        });
        Ok(DocWriteOk {
            id,
            rev: "0-0".to_string(),
        })
    }
}

fn local_doc_id(doc: &Map<String, Value>) -> Result<String, StoreError> {
    let id = doc
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::BadArgument("document has no _id".to_string()))?;
    if !is_local_id(id) {
        return Err(StoreError::BadArgument(format!(
            "{id} is not a local document id"
        )));
    }
    Ok(id.to_string())
}

/// Local revs are `"0-<generation>"`.
fn local_rev_generation(rev: &str) -> Result<u64, StoreError> {
    rev.split_once('-')
        .and_then(|(prefix, generation)| {
            (prefix == "0").then(|| generation.parse().ok()).flatten()
        })
        .ok_or_else(|| StoreError::BadArgument(format!("invalid local rev {rev}")))
}

/// Embeds the `_revisions` ancestry of `rev` into the document.
fn embed_revisions(doc: &mut Map<String, Value>, metadata: &DocMetadata, rev: &str) {
    let Ok(info) = parse_rev(rev) else {
        return;
    };
    for path in root_to_leaf(&metadata.rev_tree) {
        if info.pos < path.pos {
            continue;
        }
        let idx = (info.pos - path.pos) as usize;
        if path.nodes.get(idx).map(|node| node.id == info.id) == Some(true) {
            let ids: Vec<Value> = path.nodes[..=idx]
                .iter()
                .rev()
                .map(|node| Value::String(node.id.clone()))
                .collect();
            doc.insert(
                "_revisions".to_string(),
                json!({"start": info.pos, "ids": ids}),
            );
            return;
        }
    }
}
