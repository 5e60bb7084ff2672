//! Process-wide handle registry. Backends generally tolerate only one opener
//! per database, so every `Store::open` for the same `(engine, name)` pair
//! shares a single instance. Close decrements the reference count and evicts
//! at zero; destroy evicts unconditionally.

use crate::error::StoreError;
use crate::store::StoreInner;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type RegistryKey = (&'static str, String);

struct Entry {
    inner: Arc<StoreInner>,
    refs: usize,
}

lazy_static! {
    static ref HANDLES: Mutex<HashMap<RegistryKey, Entry>> = Mutex::new(HashMap::new());
}

/// Returns the shared instance for `(engine, name)`, opening it with `open`
/// on first use.
pub(crate) fn acquire<F>(
    engine: &'static str,
    name: &str,
    open: F,
) -> Result<Arc<StoreInner>, StoreError>
where
    F: FnOnce() -> Result<Arc<StoreInner>, StoreError>,
{
    let mut handles = HANDLES.lock().map_err(|_| StoreError::LockPoisoned)?;
    let key = (engine, name.to_string());
    if let Some(entry) = handles.get_mut(&key) {
        entry.refs += 1;
        return Ok(entry.inner.clone());
    }
    let inner = open()?;
    handles.insert(
        key,
        Entry {
            inner: inner.clone(),
            refs: 1,
        },
    );
    Ok(inner)
}

/// Drops one reference. Returns the instance when the count reaches zero, so
/// the caller can tear the backend down.
pub(crate) fn release(
    engine: &'static str,
    name: &str,
) -> Result<Option<Arc<StoreInner>>, StoreError> {
    let mut handles = HANDLES.lock().map_err(|_| StoreError::LockPoisoned)?;
    let key = (engine, name.to_string());
    let Some(entry) = handles.get_mut(&key) else {
        return Ok(None);
    };
    entry.refs -= 1;
    if entry.refs > 0 {
        return Ok(None);
    }
    Ok(handles.remove(&key).map(|entry| entry.inner))
}

/// Removes the entry regardless of its reference count (destroy path).
pub(crate) fn evict(
    engine: &'static str,
    name: &str,
) -> Result<Option<Arc<StoreInner>>, StoreError> {
    let mut handles = HANDLES.lock().map_err(|_| StoreError::LockPoisoned)?;
    Ok(handles
        .remove(&(engine, name.to_string()))
        .map(|entry| entry.inner))
}
