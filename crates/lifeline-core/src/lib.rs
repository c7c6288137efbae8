//! Lifeline core
//!
//! Coordination-free request identifiers and lifecycle tracking.
//!
//! ## Features
//!
//! - **Identifiers**: 128-bit, time-prefixed [`RequestId`]s with a sortable
//!   canonical text form, minted without locks or shared counters.
//! - **Lifecycle tracking**: an append-only phase log per unit of work with
//!   a small state machine guarding transitions.
//! - **Storage adapters**: a persistence contract plus in-memory and
//!   sled-backed implementations.
//! - **Configuration**: layered TOML and environment configuration.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lifeline_core::{LifecycleTracker, MemoryStore, PhaseReport, PhaseStatus};
//! use std::sync::Arc;
//!
//! let tracker = LifecycleTracker::new(Arc::new(MemoryStore::new()));
//! let record = tracker.start_unit(Default::default()).await?;
//!
//! tracker
//!     .record_phase(PhaseReport::new(record.id, "charge", "billing", PhaseStatus::InProgress))
//!     .await?;
//! tracker
//!     .record_phase(
//!         PhaseReport::new(record.id, "charge", "billing", PhaseStatus::Completed).with_final(),
//!     )
//!     .await?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, LifelineConfig, PropagationConfig, QueryConfig, ServerConfig, StoreBackend,
    StoreConfig,
};
pub use error::{ErrorKind, Result, TrackerError};
pub use id::{new_request_id, IdError, IdFields, IdGenerator, MonotonicGenerator, RequestId};
pub use lifecycle::{
    LifecycleRecord, LifecycleTracker, PhaseEntry, PhaseReport, PhaseStatus, RecordStatus,
};
pub use store::{open_store, LifecycleStore, MemoryStore, SledStore, StoreError, StoreResult};
