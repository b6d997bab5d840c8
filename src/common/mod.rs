//! Common utilities and types shared across termkv

pub mod config;
pub mod error;
pub mod utils;

pub use config::{ClusterConfig, NodeConfig, NodeServerConfig};
pub use error::{Error, NodeId, Result};
pub use utils::{parse_duration, parse_duration_ms, shutdown_signal, with_timeout};
