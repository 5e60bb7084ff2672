use crate::api::{tables::TABLES, BatchOp, ScanOptions, ScanResult, StorageBackend};
use crate::error::StoreError;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::Bound;
use std::path::Path;

pub struct FjallBackend {
    keyspace: Keyspace,
    partitions: HashMap<&'static str, PartitionHandle>,
}

impl Debug for FjallBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FjallBackend").finish_non_exhaustive()
    }
}

impl FjallBackend {
    pub fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !create_if_missing && !path.exists() {
            return Err(StoreError::DatabaseDoesNotExist(
                path.to_string_lossy().into_owned(),
            ));
        }
        let keyspace = Config::new(path).open()?;
        let mut partitions = HashMap::new();
        for table in TABLES {
            let handle = keyspace.open_partition(table, PartitionCreateOptions::default())?;
            partitions.insert(table, handle);
        }
        Ok(Self {
            keyspace,
            partitions,
        })
    }

    fn partition(&self, table: &'static str) -> Result<&PartitionHandle, StoreError> {
        self.partitions
            .get(table)
            .ok_or_else(|| StoreError::Backend(format!("unknown table {table}")))
    }
}

fn scan_bounds(opts: &ScanOptions) -> Option<(Bound<Vec<u8>>, Bound<Vec<u8>>)> {
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
    if let (
        Bound::Included(low) | Bound::Excluded(low),
        Bound::Included(high) | Bound::Excluded(high),
    ) = (&lower, &upper)
    {
        if low > high {
            return None;
        }
        if low == high
            && (matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_)))
        {
            return None;
        }
    }
    Some((lower, upper))
}

impl StorageBackend for FjallBackend {
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.partition(table)?.get(key)?;
        Ok(value.map(|slice| slice.to_vec()))
    }

    fn put(&self, table: &'static str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.partition(table)?.insert(key, value)?;
        Ok(())
    }

    fn delete(&self, table: &'static str, key: &[u8]) -> Result<(), StoreError> {
        self.partition(table)?.remove(key)?;
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut batch = self.keyspace.batch();
        for op in ops {
            match op {
                BatchOp::Put { table, key, value } => {
                    batch.insert(self.partition(table)?, key, value);
                }
                BatchOp::Delete { table, key } => {
                    batch.remove(self.partition(table)?, key);
                }
            }
        }
        batch.commit()?;
        Ok(())
    }

    fn iter(
        &self,
        table: &'static str,
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = ScanResult> + '_>, StoreError> {
        let Some(bounds) = scan_bounds(&opts) else {
            return Ok(Box::new(std::iter::empty()));
        };
        let partition = self.partition(table)?;
        let range = partition.range(bounds).map(|row| {
            row.map(|(key, value)| (key.to_vec(), value.to_vec()))
                .map_err(StoreError::from)
        });
        let iter: Box<dyn Iterator<Item = ScanResult> + '_> = if opts.reverse {
            Box::new(range.rev())
        } else {
            Box::new(range)
        };
        match opts.limit {
            Some(limit) => Ok(Box::new(iter.take(limit))),
            None => Ok(iter),
        }
    }

    fn close(&self) -> Result<(), StoreError> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}
