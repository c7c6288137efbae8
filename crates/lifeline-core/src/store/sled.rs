//! Embedded on-disk lifecycle store
//!
//! Records live in one sled tree. Keys are the identifier's 16 big-endian
//! bytes, so the tree's key order is the identifier order and range scans
//! walk records by creation time. Values are JSON documents.
//!
//! A write is applied to the tree and then flushed. Writers hold the store's
//! lock exclusively until the flush settles and readers share it, so no
//! reader sees a document that is not yet durable. If the flush fails or the
//! write future is dropped first, the tree is restored to the previous
//! document before the lock is released.

use async_trait::async_trait;
use ::sled::IVec;
use std::future::Future;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{LifecycleStore, StoreError, StoreResult};
use crate::id::RequestId;
use crate::lifecycle::LifecycleRecord;

const RECORDS_TREE: &str = "lifecycle_records";

impl From<::sled::Error> for StoreError {
    fn from(err: ::sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Lifecycle store persisted with sled.
#[derive(Debug, Clone)]
pub struct SledStore {
    db: ::sled::Db,
    records: ::sled::Tree,
    lock: Arc<RwLock<()>>,
}

impl SledStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = ::sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// A store that is deleted when dropped.
    pub fn temporary() -> StoreResult<Self> {
        let db = ::sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: ::sled::Db) -> StoreResult<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        tracing::debug!(tree = RECORDS_TREE, records = records.len(), "Opened sled store");
        Ok(Self {
            db,
            records,
            lock: Arc::new(RwLock::new(())),
        })
    }

    async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    async fn insert_with<F>(&self, record: &LifecycleRecord, flush: F) -> StoreResult<()>
    where
        F: Future<Output = StoreResult<()>>,
    {
        let value = serde_json::to_vec(record)?;
        let _guard = self.lock.write().await;

        let swapped = self.records.compare_and_swap(
            record.id.to_bytes(),
            None::<&[u8]>,
            Some(value.as_slice()),
        )?;
        if swapped.is_err() {
            return Err(StoreError::Duplicate(record.id));
        }

        let pending = PendingWrite::new(&self.records, record.id, value, None);
        flush.await?;
        pending.commit();
        Ok(())
    }

    async fn update_with<F>(&self, record: &LifecycleRecord, flush: F) -> StoreResult<()>
    where
        F: Future<Output = StoreResult<()>>,
    {
        let value = serde_json::to_vec(record)?;
        let _guard = self.lock.write().await;

        let previous = self
            .records
            .fetch_and_update(record.id.to_bytes(), |old| old.map(|_| value.clone()))?;
        let Some(previous) = previous else {
            return Err(StoreError::NotFound(record.id));
        };

        let pending = PendingWrite::new(&self.records, record.id, value, Some(previous));
        flush.await?;
        pending.commit();
        Ok(())
    }
}

/// A document written to the tree but not yet flushed.
///
/// Dropped without [`commit`](Self::commit), it puts back what was there
/// before, provided the document is still the one it wrote.
struct PendingWrite<'a> {
    tree: &'a ::sled::Tree,
    id: RequestId,
    written: Vec<u8>,
    previous: Option<IVec>,
    armed: bool,
}

impl<'a> PendingWrite<'a> {
    fn new(tree: &'a ::sled::Tree, id: RequestId, written: Vec<u8>, previous: Option<IVec>) -> Self {
        Self {
            tree,
            id,
            written,
            previous,
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingWrite<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let restored = self.previous.take();
        match self.tree.compare_and_swap(
            self.id.to_bytes(),
            Some(self.written.as_slice()),
            restored,
        ) {
            Ok(Ok(())) => {
                tracing::warn!(request_id = %self.id, "Rolled back unflushed write")
            }
            Ok(Err(_)) => tracing::error!(
                request_id = %self.id,
                "Document changed before rollback, leaving it in place"
            ),
            Err(err) => tracing::error!(
                request_id = %self.id,
                error = %err,
                "Failed to roll back unflushed write"
            ),
        }
    }
}

fn key_bound(bound: Bound<RequestId>) -> Bound<[u8; 16]> {
    match bound {
        Bound::Included(id) => Bound::Included(id.to_bytes()),
        Bound::Excluded(id) => Bound::Excluded(id.to_bytes()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[async_trait]
impl LifecycleStore for SledStore {
    fn name(&self) -> &'static str {
        "sled"
    }

    async fn insert(&self, record: &LifecycleRecord) -> StoreResult<()> {
        self.insert_with(record, self.flush()).await
    }

    async fn update(&self, record: &LifecycleRecord) -> StoreResult<()> {
        self.update_with(record, self.flush()).await
    }

    async fn find_by_id(&self, id: RequestId) -> StoreResult<Option<LifecycleRecord>> {
        let _guard = self.lock.read().await;
        match self.records.get(id.to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn scan(
        &self,
        start: Bound<RequestId>,
        limit: usize,
    ) -> StoreResult<Vec<LifecycleRecord>> {
        let _guard = self.lock.read().await;
        let range = (key_bound(start), Bound::<[u8; 16]>::Unbounded);
        let mut out = Vec::with_capacity(limit.min(256));
        for item in self.records.range(range).take(limit) {
            let (_, bytes) = item?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    async fn count(&self) -> StoreResult<usize> {
        let _guard = self.lock.read().await;
        Ok(self.records.len())
    }
}
