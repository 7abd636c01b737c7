//! HTTP surface for ringkv: the per-shard server, the stateless router,
//! and the reqwest-backed replica client.

pub mod client;
pub mod router;
pub mod shard;
pub mod types;

pub use client::HttpReplicaClient;
pub use router::{router_app, RouterState};
pub use shard::{shard_app, ShardState};
