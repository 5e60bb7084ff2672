use crate::api::{BatchOp, ScanOptions, ScanResult, StorageBackend};
use crate::error::StoreError;
use lazy_static::lazy_static;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;
type Database = BTreeMap<String, Table>;

lazy_static! {
    /// Process-wide map of named in-memory databases. Data outlives the
    /// backend handle: reopening a name sees the same contents until the
    /// database is destroyed.
    static ref DATABASES: Mutex<HashMap<String, Arc<RwLock<Database>>>> =
        Mutex::new(HashMap::new());
}

#[derive(Debug)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Database>>,
}

impl InMemoryBackend {
    pub fn open(name: &str, create_if_missing: bool) -> Result<Self, StoreError> {
        let mut databases = DATABASES.lock().map_err(|_| StoreError::LockPoisoned)?;
        match databases.get(name) {
            Some(db) => Ok(Self { inner: db.clone() }),
            None if create_if_missing => {
                let inner = Arc::new(RwLock::new(Database::new()));
                databases.insert(name.to_string(), inner.clone());
                Ok(Self { inner })
            }
            None => Err(StoreError::DatabaseDoesNotExist(name.to_string())),
        }
    }

    /// Removes the named database from the process-wide map, dropping its
    /// contents.
    pub fn destroy(name: &str) -> Result<(), StoreError> {
        let mut databases = DATABASES.lock().map_err(|_| StoreError::LockPoisoned)?;
        databases.remove(name);
        Ok(())
    }
}

fn collect_range(table: &Table, opts: &ScanOptions) -> Vec<(Vec<u8>, Vec<u8>)> {
    let lower = match (&opts.gt, &opts.gte) {
        (Some(key), _) => Bound::Excluded(key.clone()),
        (None, Some(key)) => Bound::Included(key.clone()),
        (None, None) => Bound::Unbounded,
    };
    let upper = match (&opts.lt, &opts.lte) {
        (Some(key), _) => Bound::Excluded(key.clone()),
        (None, Some(key)) => Bound::Included(key.clone()),
        (None, None) => Bound::Unbounded,
    };

    // BTreeMap::range panics on inverted bounds; an inverted range is an
    // empty scan here.
    if let (
        Bound::Included(low) | Bound::Excluded(low),
        Bound::Included(high) | Bound::Excluded(high),
    ) = (&lower, &upper)
    {
        if low > high {
            return Vec::new();
        }
        if low == high
            && (matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_)))
        {
            return Vec::new();
        }
    }

    let iter = table
        .range::<Vec<u8>, _>((lower, upper))
        .map(|(key, value)| (key.clone(), value.clone()));
    let mut rows: Vec<_> = if opts.reverse {
        iter.rev().collect()
    } else {
        iter.collect()
    };
    if let Some(limit) = opts.limit {
        rows.truncate(limit);
    }
    rows
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let db = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(db
            .get(table)
            .and_then(|table_ref| table_ref.get(key))
            .cloned())
    }

    fn put(&self, table: &'static str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut db = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        db.entry(table.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, table: &'static str, key: &[u8]) -> Result<(), StoreError> {
        let mut db = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        if let Some(table_ref) = db.get_mut(table) {
            table_ref.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        // One write-lock scope: readers observe all of the batch or none.
        let mut db = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        for op in ops {
            match op {
                BatchOp::Put { table, key, value } => {
                    db.entry(table.to_string()).or_default().insert(key, value);
                }
                BatchOp::Delete { table, key } => {
                    if let Some(table_ref) = db.get_mut(table) {
                        table_ref.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn iter(
        &self,
        table: &'static str,
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = ScanResult> + '_>, StoreError> {
        let db = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        let rows = match db.get(table) {
            Some(table_ref) => collect_range(table_ref, &opts),
            None => Vec::new(),
        };
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn close(&self) -> Result<(), StoreError> {
        // Contents stay in the process-wide map until destroy().
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_fresh(name: &str) -> InMemoryBackend {
        InMemoryBackend::destroy(name).unwrap();
        InMemoryBackend::open(name, true).unwrap()
    }

    #[test]
    fn test_basic_operations() {
        let backend = open_fresh("in-memory-basic");

        backend.put("test", b"key1", b"value1").unwrap();
        backend.put("test", b"key2", b"value2").unwrap();

        assert_eq!(backend.get("test", b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("test", b"key2").unwrap(), Some(b"value2".to_vec()));
        assert_eq!(backend.get("test", b"nonexistent").unwrap(), None);

        backend.delete("test", b"key1").unwrap();
        assert_eq!(backend.get("test", b"key1").unwrap(), None);
        // Deletes are idempotent.
        backend.delete("test", b"key1").unwrap();
    }

    #[test]
    fn test_batch_spans_tables() {
        let backend = open_fresh("in-memory-batch");
        backend.put("a", b"stale", b"x").unwrap();

        backend
            .write_batch(vec![
                BatchOp::Put {
                    table: "a",
                    key: b"k".to_vec(),
                    value: b"v".to_vec(),
                },
                BatchOp::Put {
                    table: "b",
                    key: b"k".to_vec(),
                    value: b"w".to_vec(),
                },
                BatchOp::Delete {
                    table: "a",
                    key: b"stale".to_vec(),
                },
            ])
            .unwrap();

        assert_eq!(backend.get("a", b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.get("b", b"k").unwrap(), Some(b"w".to_vec()));
        assert_eq!(backend.get("a", b"stale").unwrap(), None);
    }

    #[test]
    fn test_ordered_scans() {
        let backend = open_fresh("in-memory-scan");
        for key in ["a", "b", "ba", "bb", "c"] {
            backend.put("test", key.as_bytes(), b"v").unwrap();
        }

        let keys = |opts: ScanOptions| -> Vec<Vec<u8>> {
            backend
                .iter("test", opts)
                .unwrap()
                .map(|row| row.unwrap().0)
                .collect()
        };

        assert_eq!(
            keys(ScanOptions {
                gte: Some(b"b".to_vec()),
                lte: Some(b"bb".to_vec()),
                ..Default::default()
            }),
            vec![b"b".to_vec(), b"ba".to_vec(), b"bb".to_vec()]
        );
        assert_eq!(
            keys(ScanOptions {
                gte: Some(b"b".to_vec()),
                lt: Some(b"bb".to_vec()),
                ..Default::default()
            }),
            vec![b"b".to_vec(), b"ba".to_vec()]
        );
        assert_eq!(
            keys(ScanOptions {
                reverse: true,
                limit: Some(2),
                ..Default::default()
            }),
            vec![b"c".to_vec(), b"bb".to_vec()]
        );
        // Inverted bounds yield an empty scan instead of panicking.
        assert_eq!(
            keys(ScanOptions {
                gte: Some(b"z".to_vec()),
                lte: Some(b"a".to_vec()),
                ..Default::default()
            }),
            Vec::<Vec<u8>>::new()
        );
    }

    #[test]
    fn test_reopen_sees_data_until_destroy() {
        let backend = open_fresh("in-memory-reopen");
        backend.put("test", b"k", b"v").unwrap();
        backend.close().unwrap();
        drop(backend);

        let reopened = InMemoryBackend::open("in-memory-reopen", true).unwrap();
        assert_eq!(reopened.get("test", b"k").unwrap(), Some(b"v".to_vec()));
        drop(reopened);

        InMemoryBackend::destroy("in-memory-reopen").unwrap();
        assert!(InMemoryBackend::open("in-memory-reopen", false).is_err());
        let fresh = InMemoryBackend::open("in-memory-reopen", true).unwrap();
        assert_eq!(fresh.get("test", b"k").unwrap(), None);
        InMemoryBackend::destroy("in-memory-reopen").unwrap();
    }
}
