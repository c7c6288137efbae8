//! Storage adapters for lifecycle records
//!
//! The tracker owns no durable state; every mutation goes through a
//! [`LifecycleStore`]. Implementations must provide:
//!
//! - a uniqueness constraint on the record identifier (`insert` fails with
//!   [`StoreError::Duplicate`]),
//! - lookup by identifier,
//! - an ordered scan starting from a given identifier. Identifiers sort by
//!   creation time, so an index keyed on the identifier doubles as the
//!   "records since X" time index.
//!
//! # Provided adapters
//!
//! - [`MemoryStore`]: ordered in-process map, for tests and single-node use.
//! - [`SledStore`]: embedded on-disk tree keyed by the identifier's bytes.

pub mod memory;
pub mod sled;

pub use self::memory::MemoryStore;
pub use self::sled::SledStore;

use async_trait::async_trait;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};
use crate::id::RequestId;
use crate::lifecycle::LifecycleRecord;

/// Errors that can occur when interacting with a storage adapter
#[derive(Error, Debug)]
pub enum StoreError {
    /// Insert hit the uniqueness constraint
    #[error("Record already exists: {0}")]
    Duplicate(RequestId),

    /// Update targeted a record that does not exist
    #[error("Record not found: {0}")]
    NotFound(RequestId),

    /// The backend failed (I/O, corruption, unavailable)
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The adapter call was cancelled or timed out
    #[error("Storage call cancelled: {0}")]
    Cancelled(String),

    /// Configuration does not describe a usable store
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for lifecycle records.
///
/// Every method must have durably applied its effect before returning `Ok`.
/// A write that returns `Err`, or whose future is dropped before it
/// completes, must leave no visible trace.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LifecycleStore: Send + Sync + fmt::Debug {
    /// Returns the name of this adapter
    fn name(&self) -> &'static str;

    /// Persist a new record. Fails with `Duplicate` if the id exists.
    async fn insert(&self, record: &LifecycleRecord) -> StoreResult<()>;

    /// Replace an existing record. Fails with `NotFound` if the id is absent.
    async fn update(&self, record: &LifecycleRecord) -> StoreResult<()>;

    /// Fetch a record by identifier.
    async fn find_by_id(&self, id: RequestId) -> StoreResult<Option<LifecycleRecord>>;

    /// Records in identifier order starting at `start`, at most `limit`.
    async fn scan(&self, start: Bound<RequestId>, limit: usize)
        -> StoreResult<Vec<LifecycleRecord>>;

    /// Number of stored records.
    async fn count(&self) -> StoreResult<usize>;
}

/// Open the adapter described by `config`.
pub fn open_store(config: &StoreConfig) -> StoreResult<Arc<dyn LifecycleStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                StoreError::Configuration("sled backend requires store.path".to_string())
            })?;
            Ok(Arc::new(SledStore::open(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store(&StoreConfig::default()).unwrap();
        assert_eq!(store.name(), "memory");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[test]
    fn test_sled_requires_path() {
        let config = StoreConfig {
            backend: StoreBackend::Sled,
            path: None,
        };
        assert!(matches!(
            open_store(&config),
            Err(StoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_open_sled_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            backend: StoreBackend::Sled,
            path: Some(dir.path().join("records")),
        };
        let store = open_store(&config).unwrap();
        assert_eq!(store.name(), "sled");
    }
}
