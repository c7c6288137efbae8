//! Lifecycle tracking for units of work
//!
//! States: `Created -> InProgress -> {Completed, Failed}`. Collaborators
//! report phase transitions; the tracker appends them to the record's phase
//! log and persists the result through a [`LifecycleStore`](crate::store::LifecycleStore).

pub mod record;
pub mod tracker;

pub use record::{
    Applied, LifecycleRecord, PhaseEntry, PhaseReport, PhaseStatus, RecordStatus,
    TransitionRejected,
};
pub use tracker::LifecycleTracker;
