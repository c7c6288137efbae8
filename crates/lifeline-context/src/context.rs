//! Execution context bound to one unit of work.

use lifeline_core::RequestId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the context's identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Quoted by the caller on the wire
    Propagated,
    /// Minted locally because the caller sent none (or a malformed one)
    Minted,
}

/// The state carried alongside a unit of work.
///
/// Cloning produces an independent copy; handoffs always clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub request_id: RequestId,
    pub source: IdSource,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ExecutionContext {
    /// Context for an identifier received from upstream.
    pub fn propagated(request_id: RequestId) -> Self {
        Self {
            request_id,
            source: IdSource::Propagated,
            metadata: BTreeMap::new(),
        }
    }

    /// Context for a freshly minted identifier.
    pub fn minted() -> Self {
        Self {
            request_id: RequestId::generate(),
            source: IdSource::Minted,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
