//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use tempo_conflicts::ResolverPolicy;
use tempo_network::IterativeDiscovererConfig;

use crate::NodeError;

/// Tunables of the Tempo core. Every field may be omitted from TOML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoConfig {
    /// Maximum atom ids returned per discovery response.
    #[serde(default = "default_response_limit")]
    pub response_limit: usize,

    /// Cap on the discovery backoff exponent.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bound of the inbound discovery request queue.
    #[serde(default = "default_request_queue_capacity")]
    pub request_queue_capacity: usize,

    #[serde(default = "default_request_processor_threads")]
    pub request_processor_threads: usize,

    /// Peers asked for their temporal proofs per conflict.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default = "default_sampling_timeout_secs")]
    pub sampling_timeout_secs: u64,

    /// Conflict resolution policy: "local" or "momentum".
    #[serde(default)]
    pub resolver: ResolverPolicy,
}

/// Configuration for a Tempo node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for LMDB storage.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in bytes.
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to collect Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Hex-encoded 32-byte seed of the node key. A fresh key is generated
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_seed: Option<String>,

    #[serde(default)]
    pub tempo: TempoConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_response_limit() -> usize {
    10
}

fn default_max_backoff() -> u32 {
    4
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_request_queue_capacity() -> usize {
    8192
}

fn default_request_processor_threads() -> usize {
    2
}

fn default_sample_size() -> usize {
    10
}

fn default_sampling_timeout_secs() -> u64 {
    3
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tempo_data")
}

fn default_map_size() -> usize {
    1 << 30
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl TempoConfig {
    pub fn discoverer_config(&self) -> IterativeDiscovererConfig {
        IterativeDiscovererConfig {
            response_limit: self.response_limit,
            max_backoff: self.max_backoff,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            request_queue_capacity: self.request_queue_capacity,
            request_processor_threads: self.request_processor_threads,
        }
    }

    pub fn sampling_timeout(&self) -> Duration {
        Duration::from_secs(self.sampling_timeout_secs)
    }
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            response_limit: default_response_limit(),
            max_backoff: default_max_backoff(),
            request_timeout_secs: default_request_timeout_secs(),
            request_queue_capacity: default_request_queue_capacity(),
            request_processor_threads: default_request_processor_threads(),
            sample_size: default_sample_size(),
            sampling_timeout_secs: default_sampling_timeout_secs(),
            resolver: ResolverPolicy::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
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

    /// The configured node key seed, if any.
    pub fn seed(&self) -> Result<Option<[u8; 32]>, NodeError> {
        let Some(encoded) = &self.node_seed else {
            return Ok(None);
        };
        let bytes = hex::decode(encoded).map_err(|e| NodeError::Config(format!("node_seed: {e}")))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NodeError::Config("node_seed must be 32 bytes".to_string()))?;
        Ok(Some(seed))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            tempo: TempoConfig::default(),
            data_dir: default_data_dir(),
            map_size: default_map_size(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            node_seed: None,
        }
    }
}
