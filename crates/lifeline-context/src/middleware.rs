//! Request-id propagation middleware
//!
//! For every inbound request this middleware:
//! - reads the identifier header, or mints a new identifier if it is
//!   missing or malformed,
//! - runs the rest of the stack inside a carrier [`scope`](crate::carrier::scope)
//!   and a `request` tracing span,
//! - echoes the identifier in the response header.
//!
//! The scope is the unit-of-work boundary: the binding is released however
//! the handler exits.

use axum::{
    extract::{Request, State},
    http::{header::InvalidHeaderName, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use lifeline_core::RequestId;
use tracing::Instrument;

use crate::carrier;
use crate::context::ExecutionContext;

/// Header used when none is configured
pub const DEFAULT_HEADER: &str = "x-request-id";

/// Middleware state: which header carries the identifier.
#[derive(Debug, Clone)]
pub struct PropagationState {
    header: HeaderName,
}

impl PropagationState {
    pub fn new(header_name: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::try_from(header_name)?,
        })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for PropagationState {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(DEFAULT_HEADER),
        }
    }
}

/// Build the context for an inbound request.
pub fn resolve_context(headers: &HeaderMap, header: &HeaderName) -> ExecutionContext {
    let Some(raw) = headers.get(header) else {
        return ExecutionContext::minted();
    };

    match raw.to_str().ok().map(|v| RequestId::parse(v.trim())) {
        Some(Ok(id)) => ExecutionContext::propagated(id),
        Some(Err(err)) => {
            let ctx = ExecutionContext::minted();
            tracing::warn!(
                header = %header,
                error = %err,
                request_id = %ctx.request_id,
                "Malformed inbound request id, minted a new one"
            );
            ctx
        }
        None => {
            let ctx = ExecutionContext::minted();
            tracing::warn!(
                header = %header,
                request_id = %ctx.request_id,
                "Non-ASCII inbound request id, minted a new one"
            );
            ctx
        }
    }
}

/// Propagation middleware; install with `axum::middleware::from_fn_with_state`.
pub async fn propagate_request_id(
    State(state): State<PropagationState>,
    mut request: Request,
    next: Next,
) -> Response {
    let ctx = resolve_context(request.headers(), &state.header);
    let id = ctx.request_id;
    request.extensions_mut().insert(ctx.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        source = ?ctx.source,
        method = %request.method(),
        uri = %request.uri(),
    );

    let mut response = carrier::scope(ctx, next.run(request))
        .instrument(span)
        .await;

    set_header(response.headers_mut(), &state.header, id);
    response
}

/// Copy the bound identifier into outbound request headers.
///
/// Returns the identifier written, or `None` when nothing is bound.
pub fn inject_request_id(headers: &mut HeaderMap, header: &HeaderName) -> Option<RequestId> {
    let id = carrier::current_id()?;
    set_header(headers, header, id);
    Some(id)
}

fn set_header(headers: &mut HeaderMap, header: &HeaderName, id: RequestId) {
    match HeaderValue::from_str(&id.to_string()) {
        Ok(value) => {
            headers.insert(header.clone(), value);
        }
        Err(err) => tracing::error!(request_id = %id, error = %err, "Unencodable request id"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::IdSource;

    fn header() -> HeaderName {
        HeaderName::from_static(DEFAULT_HEADER)
    }

    #[test]
    fn test_resolve_uses_valid_header() {
        let id = RequestId::generate();
        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_str(&id.to_string()).unwrap());

        let ctx = resolve_context(&headers, &header());
        assert_eq!(ctx.request_id, id);
        assert_eq!(ctx.source, IdSource::Propagated);
    }

    #[test]
    fn test_resolve_mints_when_missing() {
        let ctx = resolve_context(&HeaderMap::new(), &header());
        assert_eq!(ctx.source, IdSource::Minted);
    }

    #[test]
    fn test_resolve_mints_when_malformed() {
        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_static("req-12345"));

        let ctx = resolve_context(&headers, &header());
        assert_eq!(ctx.source, IdSource::Minted);
    }

    #[test]
    fn test_custom_header_name() {
        let state = PropagationState::new("X-Correlation-Id").unwrap();
        assert_eq!(state.header().as_str(), "x-correlation-id");
        assert!(PropagationState::new("bad header").is_err());
    }

    #[tokio::test]
    async fn test_inject_copies_bound_id() {
        let mut headers = HeaderMap::new();
        assert_eq!(inject_request_id(&mut headers, &header()), None);
        assert!(headers.is_empty());

        let ctx = ExecutionContext::minted();
        let id = ctx.request_id;
        carrier::scope(ctx, async {
            assert_eq!(inject_request_id(&mut headers, &header()), Some(id));
        })
        .await;

        assert_eq!(headers[DEFAULT_HEADER], id.to_string().as_str());
    }
}
