//! Wire types shared by the shard and router surfaces.

use serde::{Deserialize, Serialize};

/// Header carried by replicated writes so replicas do not re-replicate.
pub const FORWARDED_BY_HEADER: &str = "x-forwarded-by";

/// `?key=` query parameter, optional so handlers can answer 400
/// themselves instead of axum rejecting the request.
#[derive(Debug, Deserialize)]
pub struct KeyParams {
    pub key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShardHealthResponse {
    pub status: String,
    pub shard: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub shard: String,
    pub keys: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<u64>,
}

impl GetResponse {
    pub fn miss() -> Self {
        Self {
            found: false,
            value: None,
            ts: None,
        }
    }
}

/// Reply to PUT/DELETE: quorum bookkeeping. A quorum shortfall is an
/// `ok: false` in an otherwise successful response.
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub ok: bool,
    pub acks: usize,
    pub quorum: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouterHealthResponse {
    pub status: String,
    pub shards: Vec<String>,
    pub vnodes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RouteResponse {
    pub key: String,
    pub shard: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}
