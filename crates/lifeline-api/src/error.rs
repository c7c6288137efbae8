//! API error type and its HTTP mapping.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lifeline_context::ExecutionEnvelope;
use lifeline_core::{IdError, TrackerError};

/// Code for requests refused before any tracker operation ran
pub const INVALID_REQUEST_CODE: &str = "INVALID_REQUEST";

/// Errors returned by handlers
#[derive(Debug)]
pub enum ApiError {
    /// A tracker operation failed
    Tracker(TrackerError),
    /// The body or query could not be read
    InvalidRequest { status: StatusCode, message: String },
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Tracker(err) if err.is_storage_failure() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Tracker(TrackerError::MalformedIdentifier(_)) => StatusCode::BAD_REQUEST,
            ApiError::Tracker(TrackerError::RecordNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Tracker(_) => StatusCode::CONFLICT,
            ApiError::InvalidRequest { status, .. } => *status,
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        ApiError::Tracker(err)
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        ApiError::Tracker(TrackerError::MalformedIdentifier(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let envelope = match self {
            ApiError::Tracker(err) => {
                if status.is_server_error() {
                    tracing::error!(kind = err.kind().as_str(), error = %err, "Request failed");
                }
                ExecutionEnvelope::<()>::failure(err.kind(), err.to_string())
            }
            ApiError::InvalidRequest { message, .. } => {
                tracing::debug!(status = %status, error = %message, "Request rejected");
                ExecutionEnvelope::<()>::rejected(INVALID_REQUEST_CODE, message)
            }
        };

        (status, Json(envelope)).into_response()
    }
}
