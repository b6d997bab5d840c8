//! Coordination loop and request-layer facade
//!
//! A single background task runs `tick()` on a fixed cadence: health refresh,
//! then an election if no alive coordinator remains. Ticks never overlap.
//! The loop can also be woken early, e.g. when a client write discovers the
//! coordinator is gone.

use crate::common::{ClusterConfig, Error, NodeId, Result};
use crate::coordinator::election::ElectionEngine;
use crate::coordinator::health::HealthMonitor;
use crate::coordinator::registry::{NodeDescriptor, NodeStatus, Registry, Role, SharedRegistry};
use crate::coordinator::replication::{Replicator, WriteOutcome};
use crate::coordinator::term::TermStore;
use crate::storage::{ApplicationRecord, StorageAdapter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Records held by one node, with its current role and term
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOutcome {
    pub node_id: NodeId,
    pub records: Vec<ApplicationRecord>,
    pub role: Role,
    pub term: u64,
}

#[derive(Clone)]
pub struct Cluster {
    nodes: SharedRegistry,
    health: HealthMonitor,
    election: ElectionEngine,
    replication: Replicator,
    wake: Arc<Notify>,
    tick_lock: Arc<Mutex<()>>,
    poll_interval: Duration,
}

impl Cluster {
    pub fn new(config: &ClusterConfig, adapter: Arc<dyn StorageAdapter>) -> Result<Self> {
        config.validate()?;
        let nodes = SharedRegistry::new(
            Registry::new(&config.nodes),
            adapter,
            config.node_timeout(),
        );
        let wake = Arc::new(Notify::new());
        let terms = TermStore::new(nodes.clone());
        let replication = Replicator::new(nodes.clone(), wake.clone());
        let health = HealthMonitor::new(nodes.clone(), terms.clone(), replication.clone());
        let election = ElectionEngine::new(nodes.clone(), terms, replication.clone());

        Ok(Self {
            nodes,
            health,
            election,
            replication,
            wake,
            tick_lock: Arc::new(Mutex::new(())),
            poll_interval: config.poll_interval(),
        })
    }

    /// One coordination round. Returns the coordinator after the round.
    pub async fn tick(&self) -> Option<NodeId> {
        let _running = self.tick_lock.lock().await;
        self.health.refresh().await;

        if let Some(id) = self.nodes.read().await.coordinator_id() {
            return Some(id);
        }
        self.election.elect().await
    }

    /// Spawn the coordination loop. The first tick runs immediately.
    pub fn start(&self) -> JoinHandle<()> {
        let cluster = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cluster.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cluster.wake.notified() => {
                        tracing::info!("Coordination loop woken early");
                    }
                }
                match cluster.tick().await {
                    Some(id) => tracing::debug!("Tick done, coordinator is node {}", id),
                    None => tracing::warn!("Tick done, no coordinator"),
                }
            }
        })
    }

    /// Ask the loop to run a round now instead of waiting for the next tick.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    pub async fn write(&self, payload: serde_json::Value) -> Result<WriteOutcome> {
        self.replication.write(payload).await
    }

    pub async fn update(&self, id: Uuid, payload: serde_json::Value) -> Result<ApplicationRecord> {
        self.replication.update(id, payload).await
    }

    /// Records as held by `node_id`, which must be alive.
    pub async fn read(&self, node_id: NodeId) -> Result<ReadOutcome> {
        let alive = self
            .nodes
            .read()
            .await
            .get(node_id)
            .is_some_and(|d| d.alive);
        if !alive {
            return Err(Error::NodeUnavailable(node_id));
        }

        let records = self
            .nodes
            .call(node_id, "list_records", |s| async move { s.list_records().await })
            .await
            .map_err(|_| Error::NodeUnavailable(node_id))?;

        let reg = self.nodes.read().await;
        let desc = reg.get(node_id).ok_or(Error::NodeUnavailable(node_id))?;
        Ok(ReadOutcome {
            node_id,
            records,
            role: desc.role,
            term: desc.term,
        })
    }

    pub async fn status(&self) -> Vec<NodeStatus> {
        self.nodes.read().await.status()
    }

    pub async fn coordinator(&self) -> Option<NodeDescriptor> {
        self.nodes.read().await.coordinator().cloned()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.nodes
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn election(&self) -> &ElectionEngine {
        &self.election
    }

    pub fn replication(&self) -> &Replicator {
        &self.replication
    }
}
