//! Coordinator: term-gated master election and full-state replication
//!
//! The coordinator is responsible for:
//! - Node registry and per-node term bookkeeping
//! - Health monitoring and rejoin detection
//! - Master election gated by term freshness
//! - State transfer and write fan-out from master to slaves
//! - The request-layer HTTP API

pub mod cluster;
pub mod election;
pub mod health;
pub mod http;
pub mod registry;
pub mod replication;
pub mod server;
pub mod term;

pub use cluster::{Cluster, ReadOutcome};
pub use election::{check_eligible, ElectionEngine};
pub use health::HealthMonitor;
pub use registry::{NodeDescriptor, NodeStatus, Registry, Role, SharedRegistry};
pub use replication::{Propagation, Replicator, WriteOp, WriteOutcome};
pub use server::Coordinator;
pub use term::TermStore;
