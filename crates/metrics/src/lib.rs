//! Process-wide observability: tracing setup, a shared prometheus
//! registry, and an optional scrape endpoint.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Install the fmt tracing subscriber. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

static GLOBAL: OnceLock<StoreMetrics> = OnceLock::new();

/// The process-wide metrics handle, created on first use.
pub fn global() -> &'static StoreMetrics {
    GLOBAL.get_or_init(StoreMetrics::register)
}

/// Counters and histograms shared by the engine, the replicator and
/// both HTTP surfaces.
pub struct StoreMetrics {
    pub registry: Registry,

    pub kv_puts: IntCounter,
    pub kv_gets: IntCounter,
    pub kv_deletes: IntCounter,
    pub kv_latency_secs: HistogramVec,

    pub replication_fanouts: IntCounter,
    pub replica_failures: IntCounter,

    pub wal_flushes: IntCounter,
    pub wal_bytes_flushed: IntCounter,
    pub snapshots_taken: IntCounter,

    pub proxied_requests: IntCounterVec,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("counter opts");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let c = IntCounterVec::new(Opts::new(name, help), labels).expect("counter vec opts");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registration");
    c
}

impl StoreMetrics {
    fn register() -> Self {
        let registry = Registry::new();

        let latency_opts =
            HistogramOpts::new("ringkv_op_latency_seconds", "KV operation latency in seconds")
                .buckets(vec![
                    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
                ]);
        let kv_latency_secs =
            HistogramVec::new(latency_opts, &["op"]).expect("latency histogram opts");
        registry
            .register(Box::new(kv_latency_secs.clone()))
            .expect("metric registration");

        Self {
            kv_puts: counter(&registry, "ringkv_puts_total", "KV PUT operations"),
            kv_gets: counter(&registry, "ringkv_gets_total", "KV GET operations"),
            kv_deletes: counter(&registry, "ringkv_deletes_total", "KV DELETE operations"),
            kv_latency_secs,
            replication_fanouts: counter(
                &registry,
                "ringkv_replication_fanouts_total",
                "Write fan-outs issued to replica sets",
            ),
            replica_failures: counter(
                &registry,
                "ringkv_replica_failures_total",
                "Replica forwards that failed to ack",
            ),
            wal_flushes: counter(
                &registry,
                "ringkv_wal_flushes_total",
                "WAL buffer flushes to disk",
            ),
            wal_bytes_flushed: counter(
                &registry,
                "ringkv_wal_bytes_flushed_total",
                "Bytes written to the WAL",
            ),
            snapshots_taken: counter(&registry, "ringkv_snapshots_total", "Snapshots written"),
            proxied_requests: counter_vec(
                &registry,
                "ringkv_proxied_requests_total",
                "Requests proxied by the router, by method",
                &["method"],
            ),
            registry,
        }
    }

    /// Latency timer for one KV operation; observes on drop.
    pub fn op_timer(&self, op: &str) -> prometheus::HistogramTimer {
        self.kv_latency_secs.with_label_values(&[op]).start_timer()
    }

    /// Everything in the registry, rendered in the Prometheus text
    /// exposition format.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut out)
            .expect("prometheus text encoding");
        String::from_utf8(out).expect("prometheus output is valid UTF-8")
    }
}

/// Expose `GET /metrics` on `addr`. Serves until the listener fails;
/// call from a `tokio::spawn`.
pub async fn serve_metrics(addr: SocketAddr) -> std::io::Result<()> {
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;

    let app = Router::new().route(
        "/metrics",
        get(|| async {
            (
                [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                global().render(),
            )
        }),
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("metrics exposed at http://{}/metrics", addr);
    axum::serve(listener, app).await
}
