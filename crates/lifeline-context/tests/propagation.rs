//! End-to-end propagation through an axum router.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use lifeline_context::{
    carrier, propagate_request_id, IdSource, PropagationState, RequestContext, DEFAULT_HEADER,
    MISSING_CONTEXT_CODE,
};
use lifeline_core::RequestId;
use tower::ServiceExt;

async fn bound_id() -> String {
    carrier::current_id()
        .map(|id| id.to_string())
        .unwrap_or_default()
}

async fn spawned_id() -> String {
    carrier::spawn(async { carrier::current_id() })
        .await
        .ok()
        .flatten()
        .map(|id| id.to_string())
        .unwrap_or_default()
}

async fn extracted(RequestContext(ctx): RequestContext) -> String {
    format!("{}:{:?}", ctx.request_id, ctx.source)
}

fn app(state: PropagationState) -> Router {
    Router::new()
        .route("/bound", get(bound_id))
        .route("/spawned", get(spawned_id))
        .route("/extracted", get(extracted))
        .layer(from_fn_with_state(state, propagate_request_id))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_inbound_id_is_bound_and_echoed() {
    let id = RequestId::generate();
    let request = Request::builder()
        .uri("/bound")
        .header(DEFAULT_HEADER, id.to_string())
        .body(Body::empty())
        .unwrap();

    let response = app(PropagationState::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[DEFAULT_HEADER], id.to_string().as_str());
    assert_eq!(body_string(response).await, id.to_string());
}

#[tokio::test]
async fn test_missing_id_is_minted() {
    let request = Request::builder().uri("/bound").body(Body::empty()).unwrap();

    let response = app(PropagationState::default()).oneshot(request).await.unwrap();
    let echoed = response.headers()[DEFAULT_HEADER].to_str().unwrap().to_string();
    let minted: RequestId = echoed.parse().unwrap();
    assert_eq!(body_string(response).await, minted.to_string());
}

#[tokio::test]
async fn test_malformed_id_is_replaced() {
    let request = Request::builder()
        .uri("/extracted")
        .header(DEFAULT_HEADER, "not-a-request-id")
        .body(Body::empty())
        .unwrap();

    let response = app(PropagationState::default()).oneshot(request).await.unwrap();
    let echoed = response.headers()[DEFAULT_HEADER].to_str().unwrap().to_string();
    assert_ne!(echoed, "not-a-request-id");
    assert_eq!(
        body_string(response).await,
        format!("{}:{:?}", echoed, IdSource::Minted)
    );
}

#[tokio::test]
async fn test_spawned_work_inherits_request_id() {
    let id = RequestId::generate();
    let request = Request::builder()
        .uri("/spawned")
        .header(DEFAULT_HEADER, id.to_string())
        .body(Body::empty())
        .unwrap();

    let response = app(PropagationState::default()).oneshot(request).await.unwrap();
    assert_eq!(body_string(response).await, id.to_string());
}

#[tokio::test]
async fn test_custom_header_name() {
    let state = PropagationState::new("x-correlation-id").unwrap();
    let id = RequestId::generate();
    let request = Request::builder()
        .uri("/bound")
        .header("x-correlation-id", id.to_string())
        .body(Body::empty())
        .unwrap();

    let response = app(state).oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-correlation-id"], id.to_string().as_str());
    assert!(response.headers().get(DEFAULT_HEADER).is_none());
}

#[tokio::test]
async fn test_concurrent_requests_stay_isolated() {
    let router = app(PropagationState::default());
    let mut handles = Vec::new();

    for _ in 0..50 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let id = RequestId::generate();
            let request = Request::builder()
                .uri("/bound")
                .header(DEFAULT_HEADER, id.to_string())
                .body(Body::empty())
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            (id, body_string(response).await)
        }));
    }

    for handle in handles {
        let (sent, seen) = handle.await.unwrap();
        assert_eq!(seen, sent.to_string());
    }
}

#[tokio::test]
async fn test_extractor_without_middleware_is_rejected() {
    let router = Router::new().route("/extracted", get(extracted));
    let request = Request::builder()
        .uri("/extracted")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(DEFAULT_HEADER).is_none());

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], MISSING_CONTEXT_CODE);
}

#[tokio::test]
async fn test_extractor_sees_echoed_minted_id() {
    let request = Request::builder()
        .uri("/extracted")
        .body(Body::empty())
        .unwrap();

    let response = app(PropagationState::default()).oneshot(request).await.unwrap();
    let echoed = response.headers()[DEFAULT_HEADER].to_str().unwrap().to_string();
    assert_eq!(
        body_string(response).await,
        format!("{}:{:?}", echoed, IdSource::Minted)
    );
}
