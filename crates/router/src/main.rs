//! ringkv-router: stateless request router.
//!
//! Builds the consistent-hash ring once from the configured shard list
//! and proxies `/kv` requests to the owning shard.

use clap::Parser;
use ringkv_config::RouterConfig;
use ringkv_http::{router_app, RouterState};
use ringkv_ring::HashRing;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "ringkv-router", about = "Stateless ringkv request router")]
struct Args {
    /// HTTP listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Comma-separated shard base URLs the ring is built from.
    #[arg(long)]
    shards: Option<String>,

    /// Virtual nodes per shard on the ring.
    #[arg(long)]
    vnodes: Option<usize>,

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
        Some(path) => RouterConfig::load_from_file(path)?,
        None => RouterConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(shards) = args.shards {
        config.shards = shards
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(vnodes) = args.vnodes {
        config.vnodes = vnodes;
    }
    if args.metrics_port.is_some() {
        config.metrics_port = args.metrics_port;
    }
    config.validate()?;

    let ring = HashRing::build(&config.shards, config.vnodes);
    tracing::info!(
        "ring built: {} shards x {} vnodes = {} positions",
        config.shards.len(),
        config.vnodes,
        ring.len()
    );

    let state = Arc::new(RouterState::new(
        ring,
        Duration::from_millis(config.proxy_timeout_ms),
    ));
    let app = router_app(state);

    if let Some(metrics_port) = config.metrics_port {
        let addr: std::net::SocketAddr = format!("0.0.0.0:{}", metrics_port).parse()?;
        tokio::spawn(async move {
            if let Err(e) = ringkv_metrics::serve_metrics(addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("router listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received Ctrl+C, draining connections");
    }
}
