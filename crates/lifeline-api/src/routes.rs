//! Route definitions for the Lifeline API
//!
//! - POST /v1/records - Create the record for a unit of work
//! - POST /v1/records/:id/phases - Report a phase transition
//! - GET /v1/records/:id - Fetch one record
//! - GET /v1/records - Range scan in identifier (creation) order
//! - GET /health - Health check endpoint
//!
//! Every route runs under the propagation middleware, so responses carry the
//! request identifier both in the header and in the envelope.

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lifeline_context::{propagate_request_id, ExecutionEnvelope, PropagationState, RequestContext};
use lifeline_core::{
    LifecycleRecord, LifecycleTracker, PhaseReport, PhaseStatus, QueryConfig, RequestId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Handler state shared across all routes
#[derive(Debug, Clone)]
pub struct AppState {
    pub tracker: LifecycleTracker,
    pub query: QueryConfig,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(tracker: LifecycleTracker, query: QueryConfig) -> Self {
        Self {
            tracker,
            query,
            start_time: Instant::now(),
        }
    }
}

type Envelope<T> = Json<ExecutionEnvelope<T>>;

/// Body of `POST /v1/records`; the whole body may be omitted
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateRecordRequest {
    /// Explicit identifier; the request's own identifier is used when absent
    pub id: Option<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Body of `POST /v1/records/:id/phases`
#[derive(Debug, Deserialize)]
pub struct PhaseRequest {
    pub phase: String,
    pub system_id: String,
    pub status: PhaseStatus,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// Query of `GET /v1/records`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Exclusive identifier cursor
    pub since: Option<String>,
    /// Inclusive creation-time lower bound
    pub since_time: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<LifecycleRecord>,
    /// Cursor for the next page, absent on the last one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<RequestId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub store: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<usize>,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub version: String,
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>, propagation: PropagationState) -> Router {
    Router::new()
        .route("/v1/records", post(create_record).get(list_records))
        .route("/v1/records/:id", get(get_record))
        .route("/v1/records/:id/phases", post(record_phase))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(from_fn_with_state(propagation, propagate_request_id))
        .layer(TraceLayer::new_for_http())
}

/// POST /v1/records
pub async fn create_record(
    State(state): State<Arc<AppState>>,
    RequestContext(ctx): RequestContext,
    body: Bytes,
) -> Result<(StatusCode, Envelope<LifecycleRecord>), ApiError> {
    let request = parse_create_body(&body)?;
    let id = match request.id.as_deref() {
        Some(raw) => RequestId::parse(raw)?,
        None => ctx.request_id,
    };

    let record = state.tracker.create_record(id, request.metadata).await?;
    tracing::info!(request_id = %id, "Record created");

    Ok((StatusCode::CREATED, Json(ExecutionEnvelope::success(record))))
}

fn parse_create_body(body: &[u8]) -> Result<CreateRecordRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CreateRecordRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::invalid_request(format!("Invalid record body: {err}")))
}

/// POST /v1/records/:id/phases
pub async fn record_phase(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<PhaseRequest>, JsonRejection>,
) -> Result<Envelope<LifecycleRecord>, ApiError> {
    let id = RequestId::parse(&id)?;
    let Json(request) = payload?;
    let mut report = PhaseReport::new(id, request.phase, request.system_id, request.status);
    report.is_final = request.is_final;
    report.at = request.at;

    let record = state.tracker.record_phase(report).await?;
    Ok(Json(ExecutionEnvelope::success(record)))
}

/// GET /v1/records/:id
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Envelope<LifecycleRecord>, ApiError> {
    let id = RequestId::parse(&id)?;
    let record = state.tracker.get_record(id).await?;
    Ok(Json(ExecutionEnvelope::success(record)))
}

/// GET /v1/records?since=<id>&since_time=<rfc3339>&limit=<n>
pub async fn list_records(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Envelope<RecordPage>, ApiError> {
    let Query(query) = query?;
    let limit = state.query.clamp(query.limit);

    let records = match (query.since.as_deref(), query.since_time) {
        (Some(_), Some(_)) => {
            return Err(ApiError::invalid_request(
                "since and since_time cannot be combined",
            ))
        }
        (Some(raw), None) => {
            let after = RequestId::parse(raw)?;
            state.tracker.records_since(after, limit).await?
        }
        (None, Some(since)) => state.tracker.records_since_time(since, limit).await?,
        (None, None) => state.tracker.records(limit).await?,
    };

    let next = if records.len() == limit {
        records.last().map(|record| record.id)
    } else {
        None
    };

    Ok(Json(ExecutionEnvelope::success(RecordPage { records, next })))
}

/// GET /health
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store = state.tracker.store();
    let (status, records) = match store.count().await {
        Ok(count) => (HealthStatus::Healthy, Some(count)),
        Err(err) => {
            tracing::warn!(store = store.name(), error = %err, "Store health check failed");
            (HealthStatus::Unhealthy, None)
        }
    };

    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(HealthResponse {
            status,
            store: store.name().to_string(),
            records,
            uptime_seconds: state.start_time.elapsed().as_secs(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
