//! Lifeline REST API
//!
//! Serves lifecycle records over HTTP. Every request is a unit of work: the
//! propagation middleware binds its identifier for the duration of the
//! request and echoes it back to the caller.

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{create_router, AppState};

use axum::Router;
use lifeline_context::PropagationState;
use lifeline_core::{open_store, LifecycleTracker, LifelineConfig};
use std::sync::Arc;

/// Open the configured store and assemble the router.
pub fn build_router(config: &LifelineConfig) -> anyhow::Result<Router> {
    let store = open_store(&config.store)?;
    tracing::info!(store = store.name(), "Lifecycle store opened");

    let tracker = LifecycleTracker::new(store);
    let state = Arc::new(AppState::new(tracker, config.query.clone()));
    let propagation = PropagationState::new(&config.propagation.header_name)?;

    Ok(create_router(state, propagation))
}
