//! Node configuration with TOML file support, plus the encryption key file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use msgchain_crypto::CipherKey;

use crate::pipeline::PipelineConfig;
use crate::scheduler::SchedulerConfig;
use crate::NodeError;

/// Configuration for a msgchain node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Durations are plain integers so
/// the file stays readable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_rpc_bind")]
    pub rpc_bind: String,

    /// HTTP server port.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// JSON file holding `{"encryption_key": "..."}`.
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    /// Number of storage nodes each mined block is placed on.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Fixed seed for replica placement. Unset means OS entropy.
    #[serde(default)]
    pub placement_seed: Option<u64>,

    /// How often the offline sweep runs.
    #[serde(default = "default_offline_sweep_interval_secs")]
    pub offline_sweep_interval_secs: u64,

    /// A storage node silent for longer than this is removed.
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,

    /// Smallest batch the mining tick will turn into a block.
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,

    /// A pending buffer this large is mined immediately; also the most
    /// messages one block takes.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    /// How long the oldest `min_batch` messages must wait before the mining
    /// tick mines them.
    #[serde(default = "default_age_timeout_ms")]
    pub age_timeout_ms: u64,

    /// Waiting time worth one priority step.
    #[serde(default = "default_age_quantum_ms")]
    pub age_quantum_ms: u64,

    #[serde(default = "default_aging_tick_ms")]
    pub aging_tick_ms: u64,

    #[serde(default = "default_mining_tick_ms")]
    pub mining_tick_ms: u64,

    /// Upper bound on the summed size estimate of one block.
    #[serde(default = "default_max_block_bytes")]
    pub max_block_bytes: u64,

    /// Capacity of the raw-message queue in front of the cipher worker.
    #[serde(default = "default_queue_capacity")]
    pub encryption_queue_capacity: usize,

    /// Capacity of the encrypted-message queue in front of the pending writer.
    #[serde(default = "default_queue_capacity")]
    pub pending_queue_capacity: usize,

    /// How long a submit call waits for its batch to reach the pending buffer.
    #[serde(default = "default_submit_deadline_ms")]
    pub submit_deadline_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to serve the Prometheus `/metrics` route.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_rpc_port() -> u16 {
    8080
}

fn default_key_file() -> PathBuf {
    PathBuf::from("encryption_key.json")
}

fn default_replication_factor() -> usize {
    msgchain_replication::DEFAULT_REPLICATION_FACTOR
}

fn default_offline_sweep_interval_secs() -> u64 {
    300
}

fn default_node_timeout_secs() -> u64 {
    900
}

fn default_min_batch() -> usize {
    5
}

fn default_max_batch() -> usize {
    100
}

fn default_age_timeout_ms() -> u64 {
    30_000
}

fn default_age_quantum_ms() -> u64 {
    1_000
}

fn default_aging_tick_ms() -> u64 {
    500
}

fn default_mining_tick_ms() -> u64 {
    5_000
}

fn default_max_block_bytes() -> u64 {
    5 * 1024
}

fn default_queue_capacity() -> usize {
    1_000
}

fn default_submit_deadline_ms() -> u64 {
    10_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject settings the scheduler or pipeline cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let fail = |msg: &str| Err(NodeError::Config(msg.to_string()));
        if self.min_batch == 0 {
            return fail("min_batch must be at least 1");
        }
        if self.max_batch < self.min_batch {
            return fail("max_batch must not be smaller than min_batch");
        }
        if self.age_quantum_ms == 0 {
            return fail("age_quantum_ms must be positive");
        }
        if self.aging_tick_ms == 0 || self.mining_tick_ms == 0 {
            return fail("tick intervals must be positive");
        }
        if self.offline_sweep_interval_secs == 0 {
            return fail("offline_sweep_interval_secs must be positive");
        }
        if self.encryption_queue_capacity == 0 || self.pending_queue_capacity == 0 {
            return fail("queue capacities must be positive");
        }
        if self.replication_factor == 0 {
            return fail("replication_factor must be at least 1");
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            min_batch: self.min_batch,
            max_batch: self.max_batch,
            age_timeout: Duration::from_millis(self.age_timeout_ms),
            age_quantum: Duration::from_millis(self.age_quantum_ms),
            max_block_bytes: self.max_block_bytes,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            encryption_queue_capacity: self.encryption_queue_capacity,
            pending_queue_capacity: self.pending_queue_capacity,
            submit_deadline: Duration::from_millis(self.submit_deadline_ms),
        }
    }

    pub fn aging_tick(&self) -> Duration {
        Duration::from_millis(self.aging_tick_ms)
    }

    pub fn mining_tick(&self) -> Duration {
        Duration::from_millis(self.mining_tick_ms)
    }

    pub fn offline_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.offline_sweep_interval_secs)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_bind: default_rpc_bind(),
            rpc_port: default_rpc_port(),
            key_file: default_key_file(),
            replication_factor: default_replication_factor(),
            placement_seed: None,
            offline_sweep_interval_secs: default_offline_sweep_interval_secs(),
            node_timeout_secs: default_node_timeout_secs(),
            min_batch: default_min_batch(),
            max_batch: default_max_batch(),
            age_timeout_ms: default_age_timeout_ms(),
            age_quantum_ms: default_age_quantum_ms(),
            aging_tick_ms: default_aging_tick_ms(),
            mining_tick_ms: default_mining_tick_ms(),
            max_block_bytes: default_max_block_bytes(),
            encryption_queue_capacity: default_queue_capacity(),
            pending_queue_capacity: default_queue_capacity(),
            submit_deadline_ms: default_submit_deadline_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

// ── Key file ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct KeyFile {
    encryption_key: String,
}

/// Load the symmetric key from a `{"encryption_key": "..."}` JSON file.
///
/// The key string's bytes are the key, so it must be 16, 24 or 32 bytes
/// long.
pub fn load_key_file(path: impl AsRef<Path>) -> Result<CipherKey, NodeError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| NodeError::KeyFile(format!("{}: {e}", path.display())))?;
    parse_key_json(&content)
}

/// Parse the key file contents.
pub fn parse_key_json(content: &str) -> Result<CipherKey, NodeError> {
    let file: KeyFile =
        serde_json::from_str(content).map_err(|e| NodeError::KeyFile(e.to_string()))?;
    Ok(CipherKey::new(file.encryption_key.into_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.rpc_port, config.rpc_port);
        assert_eq!(parsed.max_block_bytes, config.max_block_bytes);
        assert_eq!(parsed.placement_seed, None);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.rpc_port, 8080);
        assert_eq!(config.replication_factor, 3);
        assert_eq!(config.max_block_bytes, 5120);
        assert_eq!(config.node_timeout(), Duration::from_secs(900));
        assert_eq!(config.offline_sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.aging_tick(), Duration::from_millis(500));
        assert_eq!(config.mining_tick(), Duration::from_secs(5));
        assert_eq!(config.log_format, "human");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            rpc_port = 9999
            min_batch = 2
            max_batch = 5
            placement_seed = 42
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.rpc_port, 9999);
        assert_eq!(config.min_batch, 2);
        assert_eq!(config.max_batch, 5);
        assert_eq!(config.placement_seed, Some(42));
        assert_eq!(config.log_format, "human"); // default
    }

    #[test]
    fn config_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "submit_deadline_ms = 250").unwrap();
        let config = NodeConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(
            config.pipeline_config().submit_deadline,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/msgchain.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }

    #[test]
    fn validate_rejects_inverted_batches() {
        let config = NodeConfig {
            min_batch: 10,
            max_batch: 5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_quantum() {
        let config = NodeConfig {
            age_quantum_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn key_file_loads_32_byte_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"encryption_key": "0123456789abcdef0123456789abcdef"}}"#
        )
        .unwrap();
        let key = load_key_file(file.path()).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn key_with_bad_length_is_rejected() {
        let result = parse_key_json(r#"{"encryption_key": "short"}"#);
        assert!(matches!(result, Err(NodeError::Cipher(_))));
    }

    #[test]
    fn malformed_key_json_is_rejected() {
        assert!(matches!(
            parse_key_json("not json"),
            Err(NodeError::KeyFile(_))
        ));
        assert!(matches!(
            load_key_file("/nonexistent/key.json"),
            Err(NodeError::KeyFile(_))
        ));
    }
}
