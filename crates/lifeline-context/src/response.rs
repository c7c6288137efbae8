//! Response envelope that echoes the request identifier.

use lifeline_core::{ErrorKind, RequestId};
use serde::{Deserialize, Serialize};

use crate::carrier;

/// Error body carried by a failed envelope.
///
/// `kind` is set when a tracker operation failed. Requests rejected before
/// reaching the tracker carry only a transport `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
}

/// Response envelope for every endpoint.
///
/// `request_id` is taken from the carrier when the envelope is built, so it
/// is present whenever a unit of work is in scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T: Serialize> ExecutionEnvelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            request_id: carrier::current_id(),
            data: Some(data),
            error: None,
        }
    }

    /// A tracker failure of the given kind.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::error(ErrorBody {
            code: kind.as_str().to_string(),
            kind: Some(kind),
            message: message.into(),
        })
    }

    /// A request refused before any tracker operation ran.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::error(ErrorBody {
            code: code.into(),
            kind: None,
            message: message.into(),
        })
    }

    fn error(body: ErrorBody) -> Self {
        Self {
            success: false,
            request_id: carrier::current_id(),
            data: None,
            error: Some(body),
        }
    }
}
