//! # termkv
//!
//! A small replicated record store with:
//! - Exactly one writable master among a fixed set of storage nodes
//! - Term-gated election: a node with stale data can never become master
//! - Full-state resync of replicas that fall behind or rejoin
//! - Synchronous write fan-out from master to all live replicas
//! - HTTP API for clients, HTTP protocol between coordinator and nodes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               termkv-coord                   │
//! │  coordination loop (every poll interval):    │
//! │   health refresh ─▶ election if no master    │
//! │  request layer: write / update / read        │
//! └──────┬──────────────────┬─────────────────┬──┘
//!        │ HTTP             │ HTTP            │ HTTP
//! ┌──────▼──────┐   ┌───────▼─────┐   ┌───────▼─────┐
//! │ node 1      │   │ node 2      │   │ node 3      │
//! │ slave       │   │ slave       │   │ MASTER      │
//! │ term + recs │   │ term + recs │   │ term + recs │
//! └─────────────┘   └─────────────┘   └─────────────┘
//! ```
//!
//! There is exactly one coordinator process. It reads every node's store
//! directly, so elections are local decisions rather than a vote protocol.
//!
//! ## Usage
//!
//! ### Start storage nodes
//! ```bash
//! termkv-node serve --name n1 --bind 0.0.0.0:6001 --data ./n1
//! termkv-node serve --name n2 --bind 0.0.0.0:6002 --data ./n2
//! ```
//!
//! ### Start the coordinator
//! ```bash
//! termkv-coord serve \
//!   --node 1=http://localhost:6001 \
//!   --node 2=http://localhost:6002 \
//!   --poll-interval 10s
//! ```
//!
//! ### Use the CLI
//! ```bash
//! termkv write '{"name": "alice"}'
//! termkv update <record-id> '{"name": "bob"}'
//! termkv read 1
//! termkv status
//! ```

pub mod common;
pub mod coordinator;
pub mod node;
pub mod storage;

// Re-export commonly used types
pub use common::{ClusterConfig, Error, NodeId, Result};
pub use coordinator::{Cluster, Coordinator, Role};
pub use node::NodeServer;
pub use storage::ApplicationRecord;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
