//! ringkv-shard: entry point for one storage shard.
//!
//! Opens the storage engine over the data directory (running recovery),
//! wires the replicator, and serves the shard HTTP surface until
//! Ctrl+C, then closes the engine cleanly.

use clap::Parser;
use ringkv_config::ShardConfig;
use ringkv_http::{shard_app, HttpReplicaClient, ShardState};
use ringkv_replication::{ReplicationConfig, Replicator};
use ringkv_storage::{Engine, EngineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "ringkv-shard", about = "One ringkv storage shard")]
struct Args {
    /// HTTP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for the WAL and snapshot.
    #[arg(long)]
    data: Option<PathBuf>,

    /// Comma-separated peer shard base URLs to replicate writes to.
    #[arg(long)]
    replicas: Option<String>,

    /// Required ack count, this shard included.
    #[arg(long)]
    quorum: Option<usize>,

    /// Shard identifier (defaults to shard-<port>).
    #[arg(long)]
    id: Option<String>,

    /// Optional YAML config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this port.
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ringkv_metrics::init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ShardConfig::load_from_file(path)?,
        None => ShardConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data) = args.data {
        config.storage.data_dir = data;
    }
    if let Some(replicas) = args.replicas {
        config.replication.replicas = replicas
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(quorum) = args.quorum {
        config.replication.quorum = quorum;
    }
    if let Some(id) = args.id {
        config.shard_id = id;
    }
    if args.metrics_port.is_some() {
        config.metrics_port = args.metrics_port;
    }
    if config.shard_id.is_empty() {
        config.shard_id = format!("shard-{}", config.port);
    }
    config.validate()?;

    let engine_config = EngineConfig {
        wal_filename: config.storage.wal_filename.clone(),
        snapshot_filename: config.storage.snapshot_filename.clone(),
        snapshot_interval: Duration::from_millis(config.storage.snapshot_interval_ms),
        flush_interval: Duration::from_millis(config.storage.flush_interval_ms),
        truncate_wal_on_snapshot: config.storage.truncate_wal_on_snapshot,
    };
    let engine = Arc::new(Engine::open(&config.storage.data_dir, engine_config)?);

    let replicator = Replicator::new(
        ReplicationConfig {
            replicas: config.replication.replicas.clone(),
            quorum: config.replication.quorum,
            shard_id: config.shard_id.clone(),
            forward_timeout: Duration::from_millis(config.replication.forward_timeout_ms),
        },
        Arc::new(HttpReplicaClient::new()),
    );

    let state = Arc::new(ShardState {
        engine: engine.clone(),
        replicator,
        shard_id: config.shard_id.clone(),
        port: config.port,
    });
    let app = shard_app(state);

    if let Some(metrics_port) = config.metrics_port {
        let addr: std::net::SocketAddr = format!("0.0.0.0:{}", metrics_port).parse()?;
        tokio::spawn(async move {
            if let Err(e) = ringkv_metrics::serve_metrics(addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(
        "shard {} listening on {} (replicas: {}, quorum: {})",
        config.shard_id,
        listener.local_addr()?,
        config.replication.replicas.len(),
        config.replication.quorum
    );

    // Wait out in-flight requests before closing the engine: a handler
    // that already passed the closed check must still get its write
    // into the final drain.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.close().await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received Ctrl+C, draining connections");
    }
}
