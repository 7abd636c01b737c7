//! The per-shard HTTP surface.
//!
//! `/kv` carries the data path: GET reads the local table, PUT/DELETE
//! apply locally then replicate unless the request carries the
//! forwarding marker. `/health` and `/stats` are operational endpoints.

use crate::client::HttpReplicaClient;
use crate::types::{
    ErrorResponse, GetResponse, KeyParams, ShardHealthResponse, StatsResponse, WriteResponse,
    FORWARDED_BY_HEADER,
};
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use ringkv_common::Value;
use ringkv_replication::{Mutation, Replicator};
use ringkv_storage::Engine;
use std::sync::Arc;

/// Values above this are rejected by the body limit layer.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct ShardState {
    pub engine: Arc<Engine>,
    pub replicator: Replicator<HttpReplicaClient>,
    pub shard_id: String,
    pub port: u16,
}

/// Build the shard's axum application.
pub fn shard_app(state: Arc<ShardState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route(
            "/kv",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .fallback(handle_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn handle_health(State(state): State<Arc<ShardState>>) -> Json<ShardHealthResponse> {
    Json(ShardHealthResponse {
        status: "ok".to_string(),
        shard: state.shard_id.clone(),
        port: state.port,
    })
}

async fn handle_stats(State(state): State<Arc<ShardState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        shard: state.shard_id.clone(),
        keys: state.engine.key_count(),
    })
}

async fn handle_get(
    State(state): State<Arc<ShardState>>,
    Query(params): Query<KeyParams>,
) -> Response {
    let Some(key) = params.key.filter(|k| !k.is_empty()) else {
        return missing_key();
    };
    let _timer = ringkv_metrics::global().op_timer("get");
    ringkv_metrics::global().kv_gets.inc();

    match state.engine.get(&key) {
        Some(record) => (
            StatusCode::OK,
            Json(GetResponse {
                found: true,
                value: Some(record.value.to_json()),
                ts: Some(record.ts),
            }),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, Json(GetResponse::miss())).into_response(),
    }
}

async fn handle_put(
    State(state): State<Arc<ShardState>>,
    Query(params): Query<KeyParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(key) = params.key.filter(|k| !k.is_empty()) else {
        return missing_key();
    };
    let _timer = ringkv_metrics::global().op_timer("put");
    ringkv_metrics::global().kv_puts.inc();

    let value = match decode_body(&headers, &body) {
        Ok(v) => v,
        Err(response) => return response,
    };

    if let Err(e) = state.engine.put(&key, value.clone()) {
        tracing::error!("put {:?} failed: {}", key, e);
        return engine_failure(&state);
    }

    if headers.contains_key(FORWARDED_BY_HEADER) {
        // A replicated write: apply locally, never fan out again.
        return (
            StatusCode::OK,
            Json(WriteResponse {
                ok: true,
                acks: 1,
                quorum: 1,
            }),
        )
            .into_response();
    }

    let outcome = state.replicator.replicate(&Mutation::Put { key, value }).await;
    (
        StatusCode::OK,
        Json(WriteResponse {
            ok: outcome.ok,
            acks: outcome.acks,
            quorum: outcome.quorum,
        }),
    )
        .into_response()
}

async fn handle_delete(
    State(state): State<Arc<ShardState>>,
    Query(params): Query<KeyParams>,
    headers: HeaderMap,
) -> Response {
    let Some(key) = params.key.filter(|k| !k.is_empty()) else {
        return missing_key();
    };
    let _timer = ringkv_metrics::global().op_timer("delete");
    ringkv_metrics::global().kv_deletes.inc();

    if let Err(e) = state.engine.delete(&key) {
        tracing::error!("delete {:?} failed: {}", key, e);
        return engine_failure(&state);
    }

    if headers.contains_key(FORWARDED_BY_HEADER) {
        return (
            StatusCode::OK,
            Json(WriteResponse {
                ok: true,
                acks: 1,
                quorum: 1,
            }),
        )
            .into_response();
    }

    let outcome = state.replicator.replicate(&Mutation::Delete { key }).await;
    (
        StatusCode::OK,
        Json(WriteResponse {
            ok: outcome.ok,
            acks: outcome.acks,
            quorum: outcome.quorum,
        }),
    )
        .into_response()
}

async fn handle_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("not found")),
    )
        .into_response()
}

/// A JSON content type means the body must parse (400 otherwise) and
/// objects/arrays are stored structured. Any other content type stores
/// the raw body as a string.
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Result<Value, Response> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(v) => Ok(Value::from_json(v)),
            Err(e) => Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(format!("invalid JSON body: {}", e))),
            )
                .into_response()),
        }
    } else {
        Ok(Value::Bytes(String::from_utf8_lossy(body).into_owned()))
    }
}

fn missing_key() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("missing key parameter")),
    )
        .into_response()
}

fn engine_failure(state: &ShardState) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(WriteResponse {
            ok: false,
            acks: 0,
            quorum: state.replicator.quorum(),
        }),
    )
        .into_response()
}
