//! Configuration for termkv components

use crate::common::{Error, NodeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "termkv.toml";

/// Environment prefix, e.g. `TERMKV__POLL_INTERVAL_MS=2000`
const ENV_PREFIX: &str = "TERMKV";

/// One configured cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique, totally ordered identity (higher id = higher priority)
    pub id: NodeId,

    /// Storage endpoint: `http://host:port`, `sled:///path` or `memory://name`
    pub endpoint: String,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Static node set
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Bind address for the request-layer HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Coordination loop cadence
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Upper bound for any single per-node storage call
    #[serde(default = "default_node_timeout")]
    pub node_timeout_ms: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}
fn default_poll_interval() -> u64 {
    10_000
}
fn default_node_timeout() -> u64 {
    5_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            bind_addr: default_bind_addr(),
            poll_interval_ms: default_poll_interval(),
            node_timeout_ms: default_node_timeout(),
            log_level: default_log_level(),
        }
    }
}

impl ClusterConfig {
    /// Load from an optional TOML file, then apply `TERMKV__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    /// Check the static node set and timings before the cluster starts.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("at least one node is required".into()));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(Error::InvalidConfig(format!("duplicate node id {}", node.id)));
            }
            if node.endpoint.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "node {} has an empty endpoint",
                    node.id
                )));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("poll_interval_ms must be > 0".into()));
        }
        if self.node_timeout_ms == 0 {
            return Err(Error::InvalidConfig("node_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Storage node server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeServerConfig {
    /// Bind address for the node HTTP API
    #[serde(default = "default_node_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Local store directory
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

fn default_node_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 6000))
}
fn default_data_path() -> PathBuf {
    PathBuf::from("./node-data")
}

impl Default for NodeServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_node_bind_addr(),
            data_path: default_data_path(),
        }
    }
}
