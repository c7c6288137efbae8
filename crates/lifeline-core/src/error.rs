//! Errors surfaced to collaborators of the lifecycle tracker.
//!
//! Exactly four kinds cross the tracker boundary. Adapter failures that are
//! not themselves a duplicate or a missing record are folded into the kind
//! of the operation that failed; the adapter error stays reachable through
//! [`std::error::Error::source`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::id::{IdError, RequestId};
use crate::store::StoreError;

/// Main error type for tracker operations
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Identifier input violates the layout contract
    #[error(transparent)]
    MalformedIdentifier(#[from] IdError),

    /// A record with this identifier already exists
    #[error("Duplicate identifier: {0}")]
    DuplicateIdentifier(RequestId),

    /// No record exists for this identifier
    #[error("Record not found: {0}")]
    RecordNotFound(RequestId),

    /// The report conflicts with a phase or record already ended
    #[error("Invalid transition for {id} phase '{phase}': {reason}")]
    InvalidTransition {
        id: RequestId,
        phase: String,
        reason: String,
    },

    /// The adapter failed or was cancelled; reported as `kind`
    #[error("{kind}: storage call failed: {source}")]
    Storage {
        kind: ErrorKind,
        #[source]
        source: StoreError,
    },
}

impl TrackerError {
    /// Fold an adapter error into the kind of the operation that failed.
    ///
    /// `Duplicate` and `NotFound` keep their own kinds; anything else is
    /// reported as `kind`.
    pub fn from_store(err: StoreError, kind: ErrorKind) -> Self {
        match err {
            StoreError::Duplicate(id) => TrackerError::DuplicateIdentifier(id),
            StoreError::NotFound(id) => TrackerError::RecordNotFound(id),
            source => TrackerError::Storage { kind, source },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::MalformedIdentifier(_) => ErrorKind::MalformedIdentifier,
            TrackerError::DuplicateIdentifier(_) => ErrorKind::DuplicateIdentifier,
            TrackerError::RecordNotFound(_) => ErrorKind::RecordNotFound,
            TrackerError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            TrackerError::Storage { kind, .. } => *kind,
        }
    }

    /// Whether the adapter, rather than the request, caused the failure.
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, TrackerError::Storage { .. })
    }

    /// Whether the caller may retry the same operation.
    ///
    /// A duplicate is retried with a fresh identifier, never the same one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::DuplicateIdentifier(_) | TrackerError::Storage { .. }
        )
    }
}

/// Stable, wire-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedIdentifier,
    DuplicateIdentifier,
    RecordNotFound,
    InvalidTransition,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedIdentifier => "MALFORMED_IDENTIFIER",
            ErrorKind::DuplicateIdentifier => "DUPLICATE_IDENTIFIER",
            ErrorKind::RecordNotFound => "RECORD_NOT_FOUND",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
