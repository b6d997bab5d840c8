//! Node registry
//!
//! Holds the static node set (ascending id), each node's liveness, role and
//! last-known term, the cached storage connection, the coordinator pointer and
//! the process-wide election term.
//!
//! The registry sits behind one `tokio::sync::RwLock`. Storage calls are never
//! made while the lock is held: callers snapshot what they need, release, do
//! I/O, then re-acquire to apply the outcome.

use crate::common::{with_timeout, Error, NodeConfig, NodeId, Result};
use crate::storage::{NodeStore, StorageAdapter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Role assigned by the election engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Unknown,
    Master,
    Slave,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unknown => write!(f, "unknown"),
            Role::Master => write!(f, "master"),
            Role::Slave => write!(f, "slave"),
        }
    }
}

/// One configured cluster member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub endpoint: String,
    pub alive: bool,
    pub role: Role,
    pub term: u64,
}

/// Row of the `status()` view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub endpoint: String,
    pub alive: bool,
    pub role: Role,
    pub term: u64,
    pub is_coordinator: bool,
}

struct Slot {
    desc: NodeDescriptor,
    conn: Option<Arc<dyn NodeStore>>,
    /// Bumped on every demotion, so a probe that started before a failure
    /// cannot revive the node afterwards.
    generation: u64,
}

/// Cluster membership state
pub struct Registry {
    slots: Vec<Slot>,
    coordinator: Option<NodeId>,
    global_term: u64,
}

impl Registry {
    pub fn new(nodes: &[NodeConfig]) -> Self {
        let mut slots: Vec<Slot> = nodes
            .iter()
            .map(|n| Slot {
                desc: NodeDescriptor {
                    id: n.id,
                    endpoint: n.endpoint.clone(),
                    alive: false,
                    role: Role::Unknown,
                    term: 0,
                },
                conn: None,
                generation: 0,
            })
            .collect();
        slots.sort_by_key(|s| s.desc.id);
        Self {
            slots,
            coordinator: None,
            global_term: 0,
        }
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.desc.id == id)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.desc.id == id)
    }

    /// All descriptors, ascending id
    pub fn list_nodes(&self) -> Vec<NodeDescriptor> {
        self.slots.iter().map(|s| s.desc.clone()).collect()
    }

    pub fn get(&self, id: NodeId) -> Option<&NodeDescriptor> {
        self.slot(id).map(|s| &s.desc)
    }

    pub fn generation(&self, id: NodeId) -> u64 {
        self.slot(id).map_or(0, |s| s.generation)
    }

    pub fn connection(&self, id: NodeId) -> Option<Arc<dyn NodeStore>> {
        self.slot(id).and_then(|s| s.conn.clone())
    }

    pub fn cache_connection(&mut self, id: NodeId, conn: Arc<dyn NodeStore>) {
        if let Some(slot) = self.slot_mut(id) {
            slot.conn = Some(conn);
        }
    }

    /// Mark a node reachable with the term read from its store. Ignored if the
    /// node was demoted since `generation` was observed.
    pub fn mark_alive(&mut self, id: NodeId, generation: u64, term: u64) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        if slot.generation != generation {
            return false;
        }
        if !slot.desc.alive {
            tracing::info!("Node {} is alive (term {})", id, term);
        }
        slot.desc.alive = true;
        slot.desc.term = term;
        true
    }

    /// Demote a node: not alive, role unknown, cached connection dropped.
    pub fn mark_dead(&mut self, id: NodeId, reason: &str) {
        let Some(slot) = self.slot_mut(id) else {
            return;
        };
        if slot.desc.alive {
            tracing::warn!("Node {} marked dead: {}", id, reason);
        }
        slot.desc.alive = false;
        slot.desc.role = Role::Unknown;
        slot.conn = None;
        slot.generation += 1;
        if self.coordinator == Some(id) {
            tracing::warn!("Coordinator {} lost", id);
            self.coordinator = None;
        }
    }

    pub fn set_role(&mut self, id: NodeId, role: Role) {
        if let Some(slot) = self.slot_mut(id) {
            slot.desc.role = role;
        }
    }

    pub fn set_term(&mut self, id: NodeId, term: u64) {
        if let Some(slot) = self.slot_mut(id) {
            slot.desc.term = term;
        }
    }

    /// Alive node ids in election priority order (highest id first)
    pub fn candidates(&self) -> Vec<NodeId> {
        self.slots
            .iter()
            .rev()
            .filter(|s| s.desc.alive)
            .map(|s| s.desc.id)
            .collect()
    }

    /// Alive node ids other than `except`, ascending
    pub fn alive_except(&self, except: NodeId) -> Vec<NodeId> {
        self.slots
            .iter()
            .filter(|s| s.desc.alive && s.desc.id != except)
            .map(|s| s.desc.id)
            .collect()
    }

    /// Highest term among alive nodes (0 if none alive)
    pub fn highest_alive_term(&self) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.desc.alive)
            .map(|s| s.desc.term)
            .max()
            .unwrap_or(0)
    }

    /// Highest term ever observed on any node, alive or not
    pub fn highest_known_term(&self) -> u64 {
        self.slots.iter().map(|s| s.desc.term).max().unwrap_or(0)
    }

    pub fn global_term(&self) -> u64 {
        self.global_term
    }

    /// Advance the election term, never below a term already seen in the
    /// cluster (the process may have restarted with terms on disk).
    pub fn next_global_term(&mut self) -> u64 {
        self.global_term = self.global_term.max(self.highest_known_term()) + 1;
        self.global_term
    }

    /// Coordinator id, only while it is alive and holds the master role
    pub fn coordinator_id(&self) -> Option<NodeId> {
        self.coordinator().map(|d| d.id)
    }

    pub fn coordinator(&self) -> Option<&NodeDescriptor> {
        self.coordinator
            .and_then(|id| self.get(id))
            .filter(|d| d.alive && d.role == Role::Master)
    }

    pub fn set_coordinator(&mut self, id: Option<NodeId>) {
        self.coordinator = id;
    }

    pub fn status(&self) -> Vec<NodeStatus> {
        let coordinator = self.coordinator_id();
        self.slots
            .iter()
            .map(|s| NodeStatus {
                id: s.desc.id,
                endpoint: s.desc.endpoint.clone(),
                alive: s.desc.alive,
                role: s.desc.role,
                term: s.desc.term,
                is_coordinator: coordinator == Some(s.desc.id),
            })
            .collect()
    }
}

/// Registry handle shared by the health monitor, election and replication
/// engines and the request layer.
#[derive(Clone)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Registry>>,
    adapter: Arc<dyn StorageAdapter>,
    timeout: Duration,
}

impl SharedRegistry {
    pub fn new(registry: Registry, adapter: Arc<dyn StorageAdapter>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
            adapter,
            timeout,
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.write().await
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn mark_dead(&self, id: NodeId, reason: &str) {
        self.write().await.mark_dead(id, reason);
    }

    /// Cached connection, or a fresh one through the storage adapter.
    /// A failed connect demotes the node.
    pub async fn connection(&self, id: NodeId) -> Result<Arc<dyn NodeStore>> {
        let (cached, endpoint) = {
            let reg = self.read().await;
            let desc = reg.get(id).ok_or(Error::NodeUnavailable(id))?;
            (reg.connection(id), desc.endpoint.clone())
        };
        if let Some(conn) = cached {
            return Ok(conn);
        }
        match with_timeout(self.timeout, "connect", self.adapter.connect(&endpoint)).await {
            Ok(conn) => {
                self.write().await.cache_connection(id, conn.clone());
                Ok(conn)
            }
            Err(e) => {
                self.mark_dead(id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Run one bounded storage call against node `id`. Any failure, timeout
    /// included, demotes the node before the error is returned.
    pub async fn call<T, F, Fut>(&self, id: NodeId, what: &str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn NodeStore>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.connection(id).await?;
        match with_timeout(self.timeout, what, f(conn)).await {
            Ok(v) => Ok(v),
            Err(e) => {
                self.mark_dead(id, &format!("{} failed: {}", what, e)).await;
                Err(e)
            }
        }
    }
}
