//! Abstraction over replica-to-replica forwards.
//!
//! Concrete implementation lives in `ringkv-http`. A trait here keeps
//! the replicator testable with mocks, same seam as the storage/engine
//! split.

use ringkv_common::Value;

/// A write to forward: the same key and value the primary applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put { key: String, value: Value },
    Delete { key: String },
}

impl Mutation {
    pub fn key(&self) -> &str {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("forward failed: {0}")]
    Transport(String),
    #[error("replica returned HTTP {0}")]
    Status(u16),
}

/// Transport for forwarding a mutation to one replica. The forward must
/// carry the `shard_id` marker so the replica applies locally without
/// re-replicating.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    async fn forward(
        &self,
        replica: &str,
        mutation: &Mutation,
        shard_id: &str,
    ) -> Result<(), ReplicaError>;
}
