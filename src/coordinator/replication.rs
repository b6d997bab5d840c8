//! Replication engine
//!
//! Two paths move application data from the coordinator to replicas:
//!
//! - **State transfer** (`synchronize`): read every record on the coordinator,
//!   wipe the replica, bulk-insert the copy, then write the coordinator's term
//!   to the replica. The term is written last, so a replica whose copy failed
//!   half way never looks caught up.
//! - **Write fan-out** (`propagate`): after the coordinator durably commits a
//!   write, the same write is applied to every alive replica concurrently. A
//!   replica that fails is demoted and will be resynchronized when the health
//!   monitor sees it again; the client write still succeeds.
//!
//! A state transfer and a fan-out must not interleave on the same replica, or
//! the replica could miss a write committed between the snapshot read and the
//! bulk insert. Writes hold the shared side of `gate`, transfers the exclusive
//! side.

use crate::common::{with_timeout, Error, NodeId, Result};
use crate::coordinator::registry::{Role, SharedRegistry};
use crate::storage::ApplicationRecord;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

/// Result of a client write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub record: ApplicationRecord,
    pub coordinator_id: NodeId,
    pub term: u64,
}

/// What fan-out did for one write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    pub replicated: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

/// A committed coordinator write to mirror on replicas
#[derive(Debug, Clone)]
pub enum WriteOp {
    Insert(ApplicationRecord),
    Update { id: Uuid, payload: serde_json::Value },
}

impl WriteOp {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::Insert(_) => "insert_record",
            WriteOp::Update { .. } => "update_record",
        }
    }
}

#[derive(Clone)]
pub struct Replicator {
    nodes: SharedRegistry,
    gate: Arc<RwLock<()>>,
    wake: Arc<Notify>,
}

impl Replicator {
    /// `wake` is notified when a write finds the coordinator gone.
    pub fn new(nodes: SharedRegistry, wake: Arc<Notify>) -> Self {
        Self {
            nodes,
            gate: Arc::new(RwLock::new(())),
            wake,
        }
    }

    /// Full state transfer from the coordinator `source` to `target`.
    pub async fn synchronize(&self, target: NodeId, source: NodeId) -> Result<()> {
        let _exclusive = self.gate.write().await;
        self.transfer(target, source).await
    }

    /// State transfer to several targets under one exclusive gate. Targets are
    /// independent; one failing does not stop the others.
    pub async fn synchronize_all(
        &self,
        targets: &[NodeId],
        source: NodeId,
    ) -> Vec<(NodeId, Result<()>)> {
        let _exclusive = self.gate.write().await;
        let results = join_all(targets.iter().map(|&t| self.transfer(t, source))).await;
        targets.iter().copied().zip(results).collect()
    }

    /// State transfer to a node coming back from the dead, then admit it as a
    /// slave while still holding the gate, so no write can land between the
    /// copy and the admission. Returns false if the node was demoted again
    /// since `generation` was observed.
    pub async fn admit(&self, target: NodeId, source: NodeId, generation: u64) -> Result<bool> {
        let _exclusive = self.gate.write().await;
        self.transfer(target, source).await?;

        let mut reg = self.nodes.write().await;
        let term = reg.get(source).map_or(0, |d| d.term);
        let admitted = reg.mark_alive(target, generation, term);
        if admitted {
            reg.set_role(target, Role::Slave);
        }
        Ok(admitted)
    }

    async fn transfer(&self, target: NodeId, source: NodeId) -> Result<()> {
        if target == source {
            return Err(Error::Internal(format!(
                "node {} cannot synchronize from itself",
                target
            )));
        }
        let source_term = {
            let reg = self.nodes.read().await;
            match reg.coordinator() {
                Some(c) if c.id == source => c.term,
                _ => return Err(Error::NoCoordinator),
            }
        };

        tracing::info!(
            "Synchronizing node {} from coordinator {} (term {})",
            target,
            source,
            source_term
        );

        let records = self
            .nodes
            .call(source, "list_records", |s| async move { s.list_records().await })
            .await?;
        let count = records.len();

        let copied = self
            .nodes
            .call(target, "state transfer", |t| async move {
                t.delete_all_records().await?;
                t.insert_records(records).await?;
                t.set_term(source_term).await
            })
            .await;
        if let Err(e) = copied {
            let err = Error::ReplicationFailed {
                node: target,
                reason: e.to_string(),
            };
            tracing::warn!("{}", err);
            return Err(err);
        }

        self.nodes.write().await.set_term(target, source_term);
        tracing::info!(
            "Node {} synchronized: {} records, term {}",
            target,
            count,
            source_term
        );
        Ok(())
    }

    /// Client write: commit on the coordinator, then fan out.
    pub async fn write(&self, payload: serde_json::Value) -> Result<WriteOutcome> {
        let _shared = self.gate.read().await;
        let (coordinator_id, term, replicas) = self.write_targets().await?;

        let record = self
            .commit(coordinator_id, "insert_record", |s| async move {
                s.insert_record(ApplicationRecord::new(payload)).await
            })
            .await?;

        self.propagate(WriteOp::Insert(record.clone()), &replicas)
            .await;
        Ok(WriteOutcome {
            record,
            coordinator_id,
            term,
        })
    }

    /// Client update of an existing record: commit on the coordinator, then
    /// fan out. `Error::NotFound` if the coordinator does not hold `id`.
    pub async fn update(&self, id: Uuid, payload: serde_json::Value) -> Result<ApplicationRecord> {
        let _shared = self.gate.read().await;
        let (coordinator_id, _, replicas) = self.write_targets().await?;

        let update = payload.clone();
        let record = self
            .commit(coordinator_id, "update_record", |s| async move {
                s.update_record(id, update).await
            })
            .await?;

        self.propagate(WriteOp::Update { id, payload }, &replicas)
            .await;
        Ok(record)
    }

    /// Mirror a committed write on `replicas`, concurrently and without quorum.
    pub async fn propagate(&self, op: WriteOp, replicas: &[NodeId]) -> Propagation {
        let results = join_all(replicas.iter().map(|&id| {
            let op = op.clone();
            async move {
                let conn = self.nodes.connection(id).await?;
                with_timeout(self.nodes.timeout(), op.name(), async move {
                    match op {
                        WriteOp::Insert(record) => conn.insert_record(record).await,
                        WriteOp::Update { id, payload } => conn.update_record(id, payload).await,
                    }
                })
                .await
            }
        }))
        .await;

        let mut outcome = Propagation::default();
        for (&id, res) in replicas.iter().zip(results) {
            match res {
                Ok(_) => outcome.replicated.push(id),
                Err(e) => {
                    let err = Error::ReplicationFailed {
                        node: id,
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                    self.nodes.mark_dead(id, &err.to_string()).await;
                    outcome.failed.push(id);
                }
            }
        }
        outcome
    }

    /// Coordinator id and term plus the alive replicas at this instant.
    async fn write_targets(&self) -> Result<(NodeId, u64, Vec<NodeId>)> {
        let reg = self.nodes.read().await;
        let coordinator = reg.coordinator().ok_or(Error::NoCoordinator)?;
        Ok((
            coordinator.id,
            coordinator.term,
            reg.alive_except(coordinator.id),
        ))
    }

    /// Apply a write to the coordinator. `NotFound` passes through; any other
    /// failure demotes the coordinator, wakes the coordination loop and
    /// surfaces as `NoCoordinator`.
    async fn commit<F, Fut>(&self, coordinator: NodeId, what: &str, f: F) -> Result<ApplicationRecord>
    where
        F: FnOnce(Arc<dyn crate::storage::NodeStore>) -> Fut,
        Fut: std::future::Future<Output = Result<ApplicationRecord>>,
    {
        let conn = match self.nodes.connection(coordinator).await {
            Ok(conn) => conn,
            Err(_) => {
                self.wake.notify_one();
                return Err(Error::NoCoordinator);
            }
        };
        match with_timeout(self.nodes.timeout(), what, f(conn)).await {
            Ok(record) => Ok(record),
            Err(Error::NotFound(id)) => Err(Error::NotFound(id)),
            Err(e) => {
                self.nodes
                    .mark_dead(coordinator, &format!("{} failed: {}", what, e))
                    .await;
                self.wake.notify_one();
                Err(Error::NoCoordinator)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeConfig;
    use crate::coordinator::registry::Registry;
    use crate::storage::{MemoryAdapter, NodeStore};
    use serde_json::json;
    use std::time::Duration;

    async fn cluster(ids: &[NodeId]) -> (Arc<MemoryAdapter>, SharedRegistry, Replicator) {
        let adapter = Arc::new(MemoryAdapter::new());
        let configs: Vec<_> = ids
            .iter()
            .map(|&id| NodeConfig {
                id,
                endpoint: format!("memory://n{}", id),
            })
            .collect();
        let nodes = SharedRegistry::new(
            Registry::new(&configs),
            adapter.clone(),
            Duration::from_millis(200),
        );
        let replicator = Replicator::new(nodes.clone(), Arc::new(Notify::new()));
        (adapter, nodes, replicator)
    }

    /// Settle `master` as coordinator at `term`, everyone else as slaves.
    async fn settle(nodes: &SharedRegistry, master: NodeId, term: u64) {
        let mut reg = nodes.write().await;
        for desc in reg.list_nodes() {
            let gen = reg.generation(desc.id);
            reg.mark_alive(desc.id, gen, term);
            reg.set_role(
                desc.id,
                if desc.id == master { Role::Master } else { Role::Slave },
            );
        }
        reg.set_coordinator(Some(master));
    }

    #[tokio::test]
    async fn test_synchronize_replaces_target_state() {
        let (adapter, nodes, replicator) = cluster(&[1, 2]).await;
        let source = adapter.add_node("n2");
        let target = adapter.add_node("n1");
        source.set_term(3).await.unwrap();
        for n in 0..3 {
            source
                .insert_record(ApplicationRecord::new(json!({ "n": n })))
                .await
                .unwrap();
        }
        target
            .insert_record(ApplicationRecord::new(json!("stale")))
            .await
            .unwrap();
        settle(&nodes, 2, 3).await;
        nodes.write().await.set_term(1, 1);

        replicator.synchronize(1, 2).await.unwrap();

        assert_eq!(
            target.list_records().await.unwrap(),
            source.list_records().await.unwrap()
        );
        assert_eq!(target.peek_term(), Some(3));
        assert_eq!(nodes.read().await.get(1).unwrap().term, 3);
    }

    #[tokio::test]
    async fn test_synchronize_twice_is_idempotent() {
        let (adapter, nodes, replicator) = cluster(&[1, 2]).await;
        let source = adapter.add_node("n2");
        source
            .insert_record(ApplicationRecord::new(json!("a")))
            .await
            .unwrap();
        settle(&nodes, 2, 1).await;

        replicator.synchronize(1, 2).await.unwrap();
        let first = adapter.add_node("n1").list_records().await.unwrap();
        replicator.synchronize(1, 2).await.unwrap();
        let second = adapter.add_node("n1").list_records().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_synchronize_requires_coordinator_source() {
        let (_adapter, nodes, replicator) = cluster(&[1, 2]).await;
        settle(&nodes, 2, 1).await;
        assert!(matches!(
            replicator.synchronize(2, 1).await,
            Err(Error::NoCoordinator)
        ));
        assert!(replicator.synchronize(2, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_transfer_keeps_old_term_and_demotes() {
        let (adapter, nodes, replicator) = cluster(&[1, 2]).await;
        let target = adapter.add_node("n1");
        target.set_term(1).await.unwrap();
        settle(&nodes, 2, 2).await;
        nodes.write().await.set_term(1, 1);
        target.set_available(false);

        let res = replicator.synchronize(1, 2).await;
        assert!(matches!(res, Err(Error::ReplicationFailed { node: 1, .. })));
        assert_eq!(target.peek_term(), Some(1));
        assert!(!nodes.read().await.get(1).unwrap().alive);
    }

    #[tokio::test]
    async fn test_admit_rejoins_as_slave() {
        let (adapter, nodes, replicator) = cluster(&[1, 2]).await;
        adapter
            .add_node("n2")
            .insert_record(ApplicationRecord::new(json!("x")))
            .await
            .unwrap();
        settle(&nodes, 2, 4).await;
        nodes.mark_dead(1, "down").await;
        let generation = nodes.read().await.generation(1);

        assert!(replicator.admit(1, 2, generation).await.unwrap());

        let reg = nodes.read().await;
        let desc = reg.get(1).unwrap();
        assert!(desc.alive);
        assert_eq!(desc.role, Role::Slave);
        assert_eq!(desc.term, 4);
        assert_eq!(adapter.add_node("n1").len(), 1);
    }

    #[tokio::test]
    async fn test_admit_ignores_demotion_during_transfer() {
        let (_adapter, nodes, replicator) = cluster(&[1, 2]).await;
        settle(&nodes, 2, 1).await;
        nodes.mark_dead(1, "down").await;
        let generation = nodes.read().await.generation(1);
        nodes.mark_dead(1, "down again").await;

        assert!(!replicator.admit(1, 2, generation).await.unwrap());
        assert!(!nodes.read().await.get(1).unwrap().alive);
    }

    #[tokio::test]
    async fn test_write_survives_replica_failure() {
        let (adapter, nodes, replicator) = cluster(&[1, 2, 3]).await;
        settle(&nodes, 3, 1).await;
        adapter.add_node("n1").set_available(false);

        let outcome = replicator.write(json!({"k": "v"})).await.unwrap();
        assert_eq!(outcome.coordinator_id, 3);
        assert_eq!(outcome.term, 1);

        assert_eq!(adapter.add_node("n3").len(), 1);
        assert_eq!(adapter.add_node("n2").len(), 1);
        assert!(adapter.add_node("n1").is_empty());
        let reg = nodes.read().await;
        assert!(!reg.get(1).unwrap().alive);
        assert!(reg.get(2).unwrap().alive);
    }

    #[tokio::test]
    async fn test_update_propagates_and_missing_is_not_found() {
        let (adapter, nodes, replicator) = cluster(&[1, 2]).await;
        settle(&nodes, 2, 1).await;

        let written = replicator.write(json!({"v": 1})).await.unwrap().record;
        let updated = replicator.update(written.id, json!({"v": 2})).await.unwrap();
        assert_eq!(updated.id, written.id);
        assert_eq!(updated.created_at, written.created_at);

        let replica = adapter.add_node("n1").list_records().await.unwrap();
        assert_eq!(replica, vec![updated]);

        let missing = replicator.update(Uuid::new_v4(), json!({})).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        // A missing record is a client error, not a coordinator failure.
        assert_eq!(nodes.read().await.coordinator_id(), Some(2));
    }

    #[tokio::test]
    async fn test_write_without_coordinator() {
        let (_adapter, _nodes, replicator) = cluster(&[1, 2]).await;
        assert!(matches!(
            replicator.write(json!({})).await,
            Err(Error::NoCoordinator)
        ));
    }

    #[tokio::test]
    async fn test_coordinator_commit_failure_wakes_loop() {
        let (adapter, nodes, _) = cluster(&[1, 2]).await;
        let wake = Arc::new(Notify::new());
        let replicator = Replicator::new(nodes.clone(), wake.clone());
        settle(&nodes, 2, 1).await;
        adapter.add_node("n2").set_available(false);

        assert!(matches!(
            replicator.write(json!({})).await,
            Err(Error::NoCoordinator)
        ));
        assert_eq!(nodes.read().await.coordinator_id(), None);
        tokio::time::timeout(Duration::from_secs(1), wake.notified())
            .await
            .unwrap();
    }
}
