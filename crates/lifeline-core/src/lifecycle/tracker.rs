//! Lifecycle tracker
//!
//! Loads a record from the store, applies the state machine in
//! [`LifecycleRecord::apply`], and writes the result back before
//! returning. Nothing is cached between calls, so a failed or cancelled
//! adapter call leaves no in-memory mutation behind.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use super::record::{Applied, LifecycleRecord, PhaseReport};
use crate::clock::{Clock, SystemClock};
use crate::error::{ErrorKind, Result, TrackerError};
use crate::id::{IdGenerator, RequestId};
use crate::store::LifecycleStore;

/// Creates lifecycle records and records phase transitions against them.
#[derive(Debug, Clone)]
pub struct LifecycleTracker {
    store: Arc<dyn LifecycleStore>,
    clock: Arc<dyn Clock>,
    generator: IdGenerator<Arc<dyn Clock>>,
}

impl LifecycleTracker {
    /// Create a tracker using the system clock.
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn LifecycleStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            generator: IdGenerator::with_clock(Arc::clone(&clock)),
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn LifecycleStore> {
        &self.store
    }

    /// Mint an identifier with this tracker's clock.
    pub fn mint(&self) -> RequestId {
        self.generator.next_id()
    }

    /// Create the record for a unit of work.
    ///
    /// Fails with `DuplicateIdentifier` if a record with `id` already exists,
    /// or if the adapter could not claim `id` at all.
    pub async fn create_record(
        &self,
        id: RequestId,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<LifecycleRecord> {
        let record = LifecycleRecord::new(id, metadata, self.clock.now());
        self.store.insert(&record).await.map_err(|err| {
            let err = TrackerError::from_store(err, ErrorKind::DuplicateIdentifier);
            tracing::warn!(request_id = %id, error = %err, "Failed to create lifecycle record");
            err
        })?;

        tracing::debug!(request_id = %id, "Lifecycle record created");
        Ok(record)
    }

    /// Mint an identifier and create its record.
    ///
    /// A duplicate identifier is retried once with a freshly minted one.
    pub async fn start_unit(
        &self,
        metadata: BTreeMap<String, serde_json::Value>,
    ) -> Result<LifecycleRecord> {
        match self.create_record(self.mint(), metadata.clone()).await {
            Err(TrackerError::DuplicateIdentifier(id)) => {
                tracing::warn!(request_id = %id, "Identifier collision, minting a new one");
                self.create_record(self.mint(), metadata).await
            }
            other => other,
        }
    }

    /// Apply a phase report and persist the result.
    ///
    /// Repeating a report that the record already reflects returns the
    /// stored record without writing. A failed read is reported as
    /// `RecordNotFound`, a failed write as `InvalidTransition`.
    pub async fn record_phase(&self, report: PhaseReport) -> Result<LifecycleRecord> {
        let id = report.id;
        let mut record = self
            .store
            .find_by_id(id)
            .await
            .map_err(|err| TrackerError::from_store(err, ErrorKind::RecordNotFound))?
            .ok_or(TrackerError::RecordNotFound(id))?;

        let at = report.at.unwrap_or_else(|| self.clock.now());
        let applied = record.apply(&report, at).map_err(|rejected| {
            tracing::warn!(
                request_id = %id,
                phase = %report.phase,
                system_id = %report.system_id,
                status = ?report.status,
                reason = %rejected.reason,
                "Rejected phase transition"
            );
            TrackerError::InvalidTransition {
                id,
                phase: report.phase.clone(),
                reason: rejected.reason,
            }
        })?;

        if applied == Applied::Changed {
            self.store.update(&record).await.map_err(|err| {
                let err = TrackerError::from_store(err, ErrorKind::InvalidTransition);
                tracing::warn!(
                    request_id = %id,
                    phase = %report.phase,
                    error = %err,
                    "Failed to persist phase"
                );
                err
            })?;
            tracing::debug!(
                request_id = %id,
                phase = %report.phase,
                system_id = %report.system_id,
                status = ?record.status,
                "Phase recorded"
            );
        }

        Ok(record)
    }

    pub async fn get_record(&self, id: RequestId) -> Result<LifecycleRecord> {
        self.store
            .find_by_id(id)
            .await
            .map_err(|err| TrackerError::from_store(err, ErrorKind::RecordNotFound))?
            .ok_or(TrackerError::RecordNotFound(id))
    }

    /// Records created after `after`, oldest first.
    pub async fn records_since(
        &self,
        after: RequestId,
        limit: usize,
    ) -> Result<Vec<LifecycleRecord>> {
        self.scan(Bound::Excluded(after), limit).await
    }

    /// Records whose identifier was minted at or after `since`.
    pub async fn records_since_time(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LifecycleRecord>> {
        let millis = since.timestamp_millis().max(0) as u64;
        let bound = RequestId::lower_bound(millis)?;
        self.scan(Bound::Included(bound), limit).await
    }

    /// The oldest records, for callers without a cursor.
    pub async fn records(&self, limit: usize) -> Result<Vec<LifecycleRecord>> {
        self.scan(Bound::Unbounded, limit).await
    }

    async fn scan(&self, start: Bound<RequestId>, limit: usize) -> Result<Vec<LifecycleRecord>> {
        self.store
            .scan(start, limit)
            .await
            .map_err(|err| TrackerError::from_store(err, ErrorKind::RecordNotFound))
    }
}
