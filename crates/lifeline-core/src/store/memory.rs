//! In-process lifecycle store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use super::{LifecycleStore, StoreError, StoreResult};
use crate::id::RequestId;
use crate::lifecycle::LifecycleRecord;

/// Lifecycle store backed by an ordered map.
///
/// The map is keyed by identifier, so iteration order is creation order at
/// millisecond granularity.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RequestId, LifecycleRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LifecycleStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, record: &LifecycleRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &LifecycleRecord) -> StoreResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn find_by_id(&self, id: RequestId) -> StoreResult<Option<LifecycleRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn scan(
        &self,
        start: Bound<RequestId>,
        limit: usize,
    ) -> StoreResult<Vec<LifecycleRecord>> {
        let records = self.records.read().await;
        Ok(records
            .range((start, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.records.read().await.len())
    }
}
