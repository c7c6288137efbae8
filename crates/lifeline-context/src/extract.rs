//! Axum extractor for the request's execution context.
//!
//! The context is installed by [`propagate_request_id`](crate::propagate_request_id),
//! which must wrap every route using [`RequestContext`]. Only the middleware
//! can echo a minted identifier back to the caller and bind the carrier, so
//! a route reached without it is rejected rather than given a context
//! nobody else can see.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::context::ExecutionContext;
use crate::response::ExecutionEnvelope;

/// Code reported when a route is not wrapped by the propagation middleware
pub const MISSING_CONTEXT_CODE: &str = "MISSING_EXECUTION_CONTEXT";

/// Axum extractor yielding the [`ExecutionContext`] for this request.
pub struct RequestContext(pub ExecutionContext);

/// Rejection for a request that bypassed the propagation middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingContext;

impl IntoResponse for MissingContext {
    fn into_response(self) -> Response {
        tracing::error!("Route reached without the request-id propagation middleware");
        let envelope = ExecutionEnvelope::<()>::rejected(
            MISSING_CONTEXT_CODE,
            "no execution context; install propagate_request_id on this route",
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = MissingContext;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ExecutionContext>()
            .cloned()
            .map(Self)
            .ok_or(MissingContext)
    }
}
