//! This module contains the implementations of the [`StorageBackend`](crate::api::StorageBackend) trait for our
//! different databases.

/// Fjall (LSM) backend
#[cfg(feature = "fjall")]
pub mod fjall;
/// In memory backend - most useful for testing
pub mod in_memory;
