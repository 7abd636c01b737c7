//! Configuration schema and loaders for ringkv processes.
//!
//! Both binaries accept an optional YAML config file; CLI flags override
//! whatever the file says. Everything has a sensible default except the
//! router's shard list, which must be provided.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Shard process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardConfig {
    /// HTTP listen port.
    #[serde(default = "default_shard_port")]
    pub port: u16,

    /// Free-form shard identifier, used as the forwarding marker.
    /// Filled from `--id` or derived from the port when absent.
    #[serde(default)]
    pub shard_id: String,

    /// Replication settings.
    #[serde(default)]
    pub replication: ReplicationSection,

    /// Storage engine settings.
    #[serde(default)]
    pub storage: StorageSection,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            port: default_shard_port(),
            shard_id: String::new(),
            replication: ReplicationSection::default(),
            storage: StorageSection::default(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationSection {
    /// Peer shard base URLs this shard fans writes out to.
    #[serde(default)]
    pub replicas: Vec<String>,

    /// Required ack count, this shard included.
    #[serde(default = "default_quorum")]
    pub quorum: usize,

    /// Deadline for a write fan-out in milliseconds.
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,
}

impl Default for ReplicationSection {
    fn default() -> Self {
        Self {
            replicas: Vec::new(),
            quorum: default_quorum(),
            forward_timeout_ms: default_forward_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Directory for the WAL and snapshot files.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_wal_filename")]
    pub wal_filename: String,

    #[serde(default = "default_snapshot_filename")]
    pub snapshot_filename: String,

    /// Periodic snapshot cadence in milliseconds.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Periodic WAL flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Truncate the WAL after each successful snapshot.
    #[serde(default)]
    pub truncate_wal_on_snapshot: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wal_filename: default_wal_filename(),
            snapshot_filename: default_snapshot_filename(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            truncate_wal_on_snapshot: false,
        }
    }
}

/// Router process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// HTTP listen port.
    #[serde(default = "default_router_port")]
    pub port: u16,

    /// Ordered shard base URLs the ring is built from.
    #[serde(default)]
    pub shards: Vec<String>,

    /// Virtual nodes per shard on the ring.
    #[serde(default = "default_vnodes")]
    pub vnodes: usize,

    /// Deadline for one proxied request in milliseconds.
    #[serde(default = "default_forward_timeout_ms")]
    pub proxy_timeout_ms: u64,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            port: default_router_port(),
            shards: Vec::new(),
            vnodes: default_vnodes(),
            proxy_timeout_ms: default_forward_timeout_ms(),
            metrics_port: None,
        }
    }
}

// --- Defaults ---

fn default_shard_port() -> u16 {
    8100
}
fn default_router_port() -> u16 {
    8080
}
fn default_quorum() -> usize {
    1
}
fn default_forward_timeout_ms() -> u64 {
    5000
}
fn default_vnodes() -> usize {
    100
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_wal_filename() -> String {
    "wal.log".to_string()
}
fn default_snapshot_filename() -> String {
    "snapshot.json.gz".to_string()
}
fn default_snapshot_interval_ms() -> u64 {
    10_000
}
fn default_flush_interval_ms() -> u64 {
    2
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ShardConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_id.is_empty() {
            return Err(ConfigError::Invalid("shard_id must not be empty".into()));
        }
        if self.replication.quorum == 0 {
            return Err(ConfigError::Invalid(
                "replication.quorum must be >= 1".into(),
            ));
        }
        if self.storage.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "storage.flush_interval_ms must be >= 1".into(),
            ));
        }
        if self.storage.wal_filename.is_empty() || self.storage.snapshot_filename.is_empty() {
            return Err(ConfigError::Invalid(
                "storage file names must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    /// Parse without validating: the binary overlays CLI flags first.
    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

impl RouterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid(
                "router requires at least one shard".into(),
            ));
        }
        if self.vnodes < 10 {
            return Err(ConfigError::Invalid(format!(
                "vnodes ({}) must be >= 10",
                self.vnodes
            )));
        }
        Ok(())
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_shard_config() {
        let yaml = r#"
port: 9001
shard_id: "shard-a"
"#;
        let config = ShardConfig::load_from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.shard_id, "shard-a");
        assert_eq!(config.replication.quorum, 1);
        assert!(config.replication.replicas.is_empty());
        assert_eq!(config.storage.wal_filename, "wal.log");
        assert_eq!(config.storage.snapshot_filename, "snapshot.json.gz");
        assert_eq!(config.storage.snapshot_interval_ms, 10_000);
        assert_eq!(config.storage.flush_interval_ms, 2);
        assert!(!config.storage.truncate_wal_on_snapshot);
    }

    #[test]
    fn test_parse_full_shard_config() {
        let yaml = r#"
port: 9002
shard_id: "shard-b"
replication:
  replicas:
    - "http://127.0.0.1:9003"
    - "http://127.0.0.1:9004"
  quorum: 2
  forward_timeout_ms: 2000
storage:
  data_dir: /tmp/ringkv-test
  snapshot_interval_ms: 30000
  flush_interval_ms: 5
  truncate_wal_on_snapshot: true
metrics_port: 9900
"#;
        let config = ShardConfig::load_from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.replication.replicas.len(), 2);
        assert_eq!(config.replication.quorum, 2);
        assert_eq!(config.storage.snapshot_interval_ms, 30_000);
        assert!(config.storage.truncate_wal_on_snapshot);
        assert_eq!(config.metrics_port, Some(9900));
    }

    #[test]
    fn test_rejects_empty_shard_id() {
        let config = ShardConfig::load_from_str("port: 9001\n").unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("shard_id"), "error should mention shard_id: {}", err);
    }

    #[test]
    fn test_rejects_zero_quorum() {
        let yaml = r#"
shard_id: "s"
replication:
  quorum: 0
"#;
        let config = ShardConfig::load_from_str(yaml).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("quorum"), "error should mention quorum: {}", err);
    }

    #[test]
    fn test_rejects_zero_flush_interval() {
        let yaml = r#"
shard_id: "s"
storage:
  flush_interval_ms: 0
"#;
        let config = ShardConfig::load_from_str(yaml).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("flush_interval_ms"));
    }

    #[test]
    fn test_parse_router_config() {
        let yaml = r#"
port: 8080
shards:
  - "http://127.0.0.1:9001"
  - "http://127.0.0.1:9002"
  - "http://127.0.0.1:9003"
vnodes: 150
"#;
        let config = RouterConfig::load_from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.shards.len(), 3);
        assert_eq!(config.vnodes, 150);
    }

    #[test]
    fn test_router_rejects_no_shards() {
        let config = RouterConfig::load_from_str("port: 8080\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_router_rejects_low_vnodes() {
        let yaml = r#"
shards: ["http://127.0.0.1:9001"]
vnodes: 5
"#;
        let config = RouterConfig::load_from_str(yaml).unwrap();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("vnodes"));
    }

    #[test]
    fn test_roundtrip_yaml() {
        let yaml = r#"
port: 9001
shard_id: "shard-a"
"#;
        let config = ShardConfig::load_from_str(yaml).unwrap();
        let serialized = serde_yaml::to_string(&config).unwrap();
        let config2 = ShardConfig::load_from_str(&serialized).unwrap();
        assert_eq!(config.port, config2.port);
        assert_eq!(config.shard_id, config2.shard_id);
    }
}
