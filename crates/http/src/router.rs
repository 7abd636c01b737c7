//! The stateless router.
//!
//! Picks the owning shard off the ring and forwards `/kv` requests
//! verbatim, passing the shard's status and body back unchanged. The
//! client's `Content-Type` header travels with the forward so a JSON
//! PUT is stored structured at the shard, same as a direct request.

use crate::types::{ErrorResponse, KeyParams, RouteResponse, RouterHealthResponse};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use ringkv_ring::HashRing;
use std::sync::Arc;
use std::time::Duration;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct RouterState {
    pub ring: HashRing,
    pub http: reqwest::Client,
    pub proxy_timeout: Duration,
}

impl RouterState {
    pub fn new(ring: HashRing, proxy_timeout: Duration) -> Self {
        Self {
            ring,
            http: reqwest::Client::new(),
            proxy_timeout,
        }
    }
}

/// Build the router's axum application.
pub fn router_app(state: Arc<RouterState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/route", get(handle_route))
        .route(
            "/kv",
            get(handle_proxy).put(handle_proxy).delete(handle_proxy),
        )
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<RouterState>>) -> Json<RouterHealthResponse> {
    Json(RouterHealthResponse {
        status: "ok".to_string(),
        shards: state.ring.shards().to_vec(),
        vnodes: state.ring.vnodes(),
    })
}

/// Answer which shard owns a key, without touching it.
async fn handle_route(
    State(state): State<Arc<RouterState>>,
    Query(params): Query<KeyParams>,
) -> Response {
    let Some(key) = params.key.filter(|k| !k.is_empty()) else {
        return missing_key();
    };
    let shard = state.ring.pick(&key).to_string();
    (StatusCode::OK, Json(RouteResponse { key, shard })).into_response()
}

async fn handle_proxy(
    State(state): State<Arc<RouterState>>,
    method: Method,
    Query(params): Query<KeyParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(key) = params.key.filter(|k| !k.is_empty()) else {
        return missing_key();
    };

    let shard = state.ring.pick(&key);
    let url = format!("{}/kv", shard.trim_end_matches('/'));

    let out_method = match method.as_str() {
        "GET" => reqwest::Method::GET,
        "PUT" => reqwest::Method::PUT,
        "DELETE" => reqwest::Method::DELETE,
        _ => return StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    ringkv_metrics::global()
        .proxied_requests
        .with_label_values(&[method.as_str()])
        .inc();

    let mut request = state
        .http
        .request(out_method, &url)
        .query(&[("key", key.as_str())])
        .timeout(state.proxy_timeout);
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        request = request.header("content-type", content_type);
    }
    if !body.is_empty() {
        request = request.body(body.to_vec());
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => return shard_unreachable(shard, e),
    };

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let bytes = match response.bytes().await {
        Ok(b) => b,
        Err(e) => return shard_unreachable(shard, e),
    };

    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(header::CONTENT_TYPE, ct);
    }
    builder
        .body(Body::from(bytes.to_vec()))
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}

async fn handle_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not found")),
    )
        .into_response()
}

fn missing_key() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("missing key parameter")),
    )
        .into_response()
}

fn shard_unreachable(shard: &str, e: reqwest::Error) -> Response {
    tracing::warn!("proxy to {} failed: {}", shard, e);
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse::new(format!("shard unreachable: {}", shard))),
    )
        .into_response()
}
