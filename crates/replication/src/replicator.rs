//! Replication fan-out with quorum early termination.
//!
//! The primary applies a write locally (one ack), then forwards it to
//! every replica concurrently. The wait ends when the ack count reaches
//! `min(quorum, replicas + 1)`, when every forward has settled, or at
//! the deadline; remaining in-flight forwards are cancelled by dropping
//! them. An unreachable quorum surfaces as `ok = false`; the local
//! apply is never rolled back.

use crate::client::{Mutation, ReplicaClient};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Per-shard replication settings.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Peer base URLs. Empty means the shard runs unreplicated.
    pub replicas: Vec<String>,
    /// Required ack count, primary included. At least 1.
    pub quorum: usize,
    /// This shard's identifier, sent as the forwarding marker.
    pub shard_id: String,
    /// Deadline for the whole fan-out; a hung replica cannot stall a
    /// write past this.
    pub forward_timeout: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            replicas: Vec::new(),
            quorum: 1,
            shard_id: String::new(),
            forward_timeout: Duration::from_secs(5),
        }
    }
}

/// What the client is told about a write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReplicationOutcome {
    pub ok: bool,
    pub acks: usize,
    pub quorum: usize,
}

pub struct Replicator<C: ReplicaClient> {
    config: ReplicationConfig,
    client: Arc<C>,
}

impl<C: ReplicaClient> std::fmt::Debug for Replicator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<C: ReplicaClient> Replicator<C> {
    pub fn new(config: ReplicationConfig, client: Arc<C>) -> Self {
        Self { config, client }
    }

    pub fn shard_id(&self) -> &str {
        &self.config.shard_id
    }

    pub fn quorum(&self) -> usize {
        self.config.quorum
    }

    /// Fan `mutation` out to all replicas. The caller has already
    /// applied it locally; that is the first ack.
    pub async fn replicate(&self, mutation: &Mutation) -> ReplicationOutcome {
        if self.config.replicas.is_empty() {
            return ReplicationOutcome {
                ok: true,
                acks: 1,
                quorum: 1,
            };
        }

        // The quorum may be set higher than the live replica set can
        // ever satisfy; stop collecting once everyone could have acked.
        let threshold = self.config.quorum.min(self.config.replicas.len() + 1);
        let deadline = tokio::time::Instant::now() + self.config.forward_timeout;

        ringkv_metrics::global()
            .replication_fanouts
            .inc();

        let mut forwards = FuturesUnordered::new();
        for replica in &self.config.replicas {
            let client = self.client.clone();
            let mutation = mutation.clone();
            let shard_id = self.config.shard_id.clone();
            let url = replica.clone();
            forwards.push(async move {
                let result = client.forward(&url, &mutation, &shard_id).await;
                (url, result)
            });
        }

        let mut acks = 1usize; // local apply
        while acks < threshold {
            match tokio::time::timeout_at(deadline, forwards.next()).await {
                Ok(Some((_, Ok(())))) => acks += 1,
                Ok(Some((url, Err(e)))) => {
                    ringkv_metrics::global().replica_failures.inc();
                    tracing::warn!("replica {} failed to ack: {}", url, e);
                }
                Ok(None) => break, // all forwards settled
                Err(_) => {
                    tracing::warn!(
                        "replication deadline hit with {}/{} acks",
                        acks,
                        self.config.quorum
                    );
                    break;
                }
            }
        }
        // Quorum met (or unattainable): cancel whatever is still in
        // flight. Replicas that already applied keep the write.
        drop(forwards);

        ReplicationOutcome {
            ok: acks >= self.config.quorum,
            acks,
            quorum: self.config.quorum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ReplicaError;
    use ringkv_common::Value;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn put(key: &str, value: &str) -> Mutation {
        Mutation::Put {
            key: key.to_string(),
            value: Value::Bytes(value.to_string()),
        }
    }

    fn config(replicas: &[&str], quorum: usize) -> ReplicationConfig {
        ReplicationConfig {
            replicas: replicas.iter().map(|s| s.to_string()).collect(),
            quorum,
            shard_id: "shard-test".to_string(),
            forward_timeout: Duration::from_secs(5),
        }
    }

    struct OkClient;

    #[async_trait::async_trait]
    impl ReplicaClient for OkClient {
        async fn forward(
            &self,
            _replica: &str,
            _mutation: &Mutation,
            _shard_id: &str,
        ) -> Result<(), ReplicaError> {
            Ok(())
        }
    }

    struct FailingClient {
        fail: HashSet<String>,
    }

    #[async_trait::async_trait]
    impl ReplicaClient for FailingClient {
        async fn forward(
            &self,
            replica: &str,
            _mutation: &Mutation,
            _shard_id: &str,
        ) -> Result<(), ReplicaError> {
            if self.fail.contains(replica) {
                Err(ReplicaError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    /// Acks instantly for some replicas, hangs for the rest.
    struct SlowClient {
        slow: HashSet<String>,
        started: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ReplicaClient for SlowClient {
        async fn forward(
            &self,
            replica: &str,
            _mutation: &Mutation,
            _shard_id: &str,
        ) -> Result<(), ReplicaError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.slow.contains(replica) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_no_replicas_single_ack() {
        // Configured quorum is irrelevant without peers: the reply is
        // always acks=1, quorum=1, ok.
        let r = Replicator::new(config(&[], 3), Arc::new(OkClient));
        let outcome = r.replicate(&put("k", "v")).await;
        assert_eq!(
            outcome,
            ReplicationOutcome {
                ok: true,
                acks: 1,
                quorum: 1
            }
        );
    }

    #[tokio::test]
    async fn test_quorum_reached() {
        let r = Replicator::new(
            config(&["http://r1", "http://r2"], 2),
            Arc::new(OkClient),
        );
        let outcome = r.replicate(&put("k", "v")).await;
        assert!(outcome.ok);
        assert!(outcome.acks >= 2);
        assert_eq!(outcome.quorum, 2);
    }

    #[tokio::test]
    async fn test_impossible_quorum() {
        // One replica, quorum of three: everyone acks, still short.
        let r = Replicator::new(config(&["http://r1"], 3), Arc::new(OkClient));
        let outcome = r.replicate(&put("k", "v")).await;
        assert_eq!(
            outcome,
            ReplicationOutcome {
                ok: false,
                acks: 2,
                quorum: 3
            }
        );
    }

    #[tokio::test]
    async fn test_failed_replicas_do_not_ack() {
        let fail: HashSet<String> =
            ["http://r1", "http://r2"].iter().map(|s| s.to_string()).collect();
        let r = Replicator::new(
            config(&["http://r1", "http://r2"], 2),
            Arc::new(FailingClient { fail }),
        );
        let outcome = r.replicate(&put("k", "v")).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.acks, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_reaches_quorum() {
        let fail: HashSet<String> = ["http://r2"].iter().map(|s| s.to_string()).collect();
        let r = Replicator::new(
            config(&["http://r1", "http://r2"], 2),
            Arc::new(FailingClient { fail }),
        );
        let outcome = r.replicate(&put("k", "v")).await;
        assert!(outcome.ok);
        assert_eq!(outcome.acks, 2);
    }

    #[tokio::test]
    async fn test_slow_replica_superseded() {
        // Quorum is met by the fast replica; the slow one must not hold
        // up the reply.
        let slow: HashSet<String> = ["http://slow"].iter().map(|s| s.to_string()).collect();
        let client = Arc::new(SlowClient {
            slow,
            started: AtomicUsize::new(0),
        });
        let r = Replicator::new(config(&["http://fast", "http://slow"], 2), client.clone());

        let start = tokio::time::Instant::now();
        let outcome = r.replicate(&put("k", "v")).await;
        assert!(outcome.ok);
        assert!(outcome.acks >= 2);
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "slow replica stalled the fan-out"
        );
        // Both forwards actually launched before one was cancelled.
        assert_eq!(client.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_bounds_hung_replicas() {
        let slow: HashSet<String> = ["http://hung"].iter().map(|s| s.to_string()).collect();
        let mut cfg = config(&["http://hung"], 2);
        cfg.forward_timeout = Duration::from_millis(100);
        let r = Replicator::new(
            cfg,
            Arc::new(SlowClient {
                slow,
                started: AtomicUsize::new(0),
            }),
        );

        let start = tokio::time::Instant::now();
        let outcome = r.replicate(&put("k", "v")).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.acks, 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_delete_replicates_like_put() {
        let r = Replicator::new(config(&["http://r1"], 2), Arc::new(OkClient));
        let outcome = r
            .replicate(&Mutation::Delete {
                key: "gone".to_string(),
            })
            .await;
        assert!(outcome.ok);
        assert_eq!(outcome.acks, 2);
    }
}
