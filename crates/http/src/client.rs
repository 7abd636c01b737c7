//! HTTP implementation of the replica forward.

use crate::types::FORWARDED_BY_HEADER;
use ringkv_common::Value;
use ringkv_replication::{Mutation, ReplicaClient, ReplicaError};

/// Forwards mutations to peer shards over their public `/kv` surface,
/// marked with `X-Forwarded-By` so the peer applies locally only.
#[derive(Debug, Clone, Default)]
pub struct HttpReplicaClient {
    http: reqwest::Client,
}

impl HttpReplicaClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn forward(
        &self,
        replica: &str,
        mutation: &Mutation,
        shard_id: &str,
    ) -> Result<(), ReplicaError> {
        let url = format!("{}/kv", replica.trim_end_matches('/'));

        let request = match mutation {
            Mutation::Put { key, value } => {
                let builder = self
                    .http
                    .put(&url)
                    .query(&[("key", key)])
                    .header(FORWARDED_BY_HEADER, shard_id);
                match value {
                    // `.json` sets the application/json content type the
                    // peer uses to keep the value structured.
                    Value::Json(v) => builder.json(v),
                    Value::Bytes(s) => builder.body(s.clone()),
                }
            }
            Mutation::Delete { key } => self
                .http
                .delete(&url)
                .query(&[("key", key)])
                .header(FORWARDED_BY_HEADER, shard_id),
        };

        let response = request
            .send()
            .await
            .map_err(|e| ReplicaError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ReplicaError::Status(response.status().as_u16()))
        }
    }
}
