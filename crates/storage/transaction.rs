//! Scoped transaction: a buffered write set over one database with
//! read-your-writes semantics. Reads consult the pending operations first and
//! fall through to the backend; `execute` flushes everything as one atomic
//! backend batch. Exclusion is provided by the operation queue, so the
//! transaction itself carries no locking.

use crate::api::{BatchOp, StorageBackend};
use crate::error::StoreError;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct Transaction {
    ops: Vec<BatchOp>,
    /// Latest buffered state per key; a `None` value records a pending
    /// delete.
    shadow: HashMap<(&'static str, Vec<u8>), Option<Vec<u8>>>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction::default()
    }

    /// Reads through the pending write set: a buffered put returns its value,
    /// a buffered delete reads as absent, anything else reaches the backend.
    pub fn get(
        &self,
        backend: &dyn StorageBackend,
        table: &'static str,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(buffered) = self.shadow.get(&(table, key.to_vec())) {
            return Ok(buffered.clone());
        }
        backend.get(table, key)
    }

    pub fn push(&mut self, op: BatchOp) {
        let buffered = match &op {
            BatchOp::Put { value, .. } => Some(value.clone()),
            BatchOp::Delete { .. } => None,
        };
        self.shadow.insert((op.table(), op.key().to_vec()), buffered);
        self.ops.push(op);
    }

    pub fn batch(&mut self, ops: Vec<BatchOp>) {
        for op in ops {
            self.push(op);
        }
    }

    /// Flushes the write set as one atomic backend batch. Consuming the
    /// transaction makes a second execute unrepresentable.
    pub fn execute(self, backend: &dyn StorageBackend) -> Result<(), StoreError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        backend.write_batch(self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_memory::InMemoryBackend;

    fn backend(name: &str) -> InMemoryBackend {
        InMemoryBackend::destroy(name).unwrap();
        InMemoryBackend::open(name, true).unwrap()
    }

    #[test]
    fn reads_observe_buffered_writes() {
        let backend = backend("txn-ryw");
        backend.put("t", b"k", b"old").unwrap();

        let mut txn = Transaction::new();
        assert_eq!(txn.get(&backend, "t", b"k").unwrap(), Some(b"old".to_vec()));

        txn.push(BatchOp::Put {
            table: "t",
            key: b"k".to_vec(),
            value: b"new".to_vec(),
        });
        assert_eq!(txn.get(&backend, "t", b"k").unwrap(), Some(b"new".to_vec()));
        // The backend is untouched until execute.
        assert_eq!(backend.get("t", b"k").unwrap(), Some(b"old".to_vec()));

        txn.push(BatchOp::Delete {
            table: "t",
            key: b"k".to_vec(),
        });
        assert_eq!(txn.get(&backend, "t", b"k").unwrap(), None);
    }

    #[test]
    fn execute_flushes_in_order() {
        let backend = backend("txn-flush");
        let mut txn = Transaction::new();
        txn.batch(vec![
            BatchOp::Put {
                table: "t",
                key: b"k".to_vec(),
                value: b"a".to_vec(),
            },
            BatchOp::Put {
                table: "t",
                key: b"k".to_vec(),
                value: b"b".to_vec(),
            },
        ]);
        txn.execute(&backend).unwrap();
        assert_eq!(backend.get("t", b"k").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn empty_transaction_is_a_no_op() {
        let backend = backend("txn-empty");
        Transaction::new().execute(&backend).unwrap();
    }
}
