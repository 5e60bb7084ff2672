//! # Storage Backend API
//!
//! This module provides a thin, minimal interface for storage backends:
//!
//! - Thin: Minimal set of operations that databases must provide
//! - Simple: Avoids type-system complexity and focuses on core functionality
//!
//! Rather than implementing business logic in each database backend, this API
//! provides low-level primitives the engine builds upon: point reads and
//! writes per table, ordered range scans, and a multi-table batch that either
//! fully commits or leaves the database untouched.

use crate::error::StoreError;
use std::fmt::Debug;

pub mod tables;

/// Type alias for one row yielded by a range scan.
pub type ScanResult = Result<(Vec<u8>, Vec<u8>), StoreError>;

/// Bounds and shape of an ordered range scan. Bounds are absolute key limits;
/// `reverse` only flips the emission order, it never swaps the bounds.
#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Inclusive lower bound.
    pub gte: Option<Vec<u8>>,
    /// Exclusive lower bound; takes precedence over `gte`.
    pub gt: Option<Vec<u8>>,
    /// Inclusive upper bound.
    pub lte: Option<Vec<u8>>,
    /// Exclusive upper bound; takes precedence over `lte`.
    pub lt: Option<Vec<u8>>,
    /// Emit rows in descending key order.
    pub reverse: bool,
    /// Stop after this many rows.
    pub limit: Option<usize>,
}

/// One entry of an atomic multi-table batch.
#[derive(Clone, Debug)]
pub enum BatchOp {
    Put {
        table: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: &'static str,
        key: Vec<u8>,
    },
}

impl BatchOp {
    pub fn table(&self) -> &'static str {
        match self {
            BatchOp::Put { table, .. } | BatchOp::Delete { table, .. } => table,
        }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key, .. } => key,
        }
    }
}

/// This trait provides the minimal set of operations required from a database
/// backend. Implementations should focus on providing efficient access to the
/// underlying storage without implementing business logic.
pub trait StorageBackend: Debug + Send + Sync + 'static {
    /// Retrieves a value by key from the specified table.
    fn get(&self, table: &'static str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores a key/value pair in the specified table.
    fn put(&self, table: &'static str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Removes a key, doing nothing if it is absent.
    fn delete(&self, table: &'static str, key: &[u8]) -> Result<(), StoreError>;

    /// Applies every operation atomically: all of them become visible
    /// together or none do.
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;

    /// Iterates over an ordered key range of one table.
    fn iter(
        &self,
        table: &'static str,
        opts: ScanOptions,
    ) -> Result<Box<dyn Iterator<Item = ScanResult> + '_>, StoreError>;

    /// Releases the backend handle. Stored data survives until the engine
    /// destroys the database.
    fn close(&self) -> Result<(), StoreError>;
}
