//! Quorum replication for ringkv: fan an originating write out to peer
//! replicas and report once enough acknowledgements are in.

pub mod client;
pub mod replicator;

pub use client::{Mutation, ReplicaClient, ReplicaError};
pub use replicator::{ReplicationConfig, ReplicationOutcome, Replicator};
