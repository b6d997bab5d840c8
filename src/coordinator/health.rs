//! Health monitor
//!
//! One `refresh()` pass checks every configured node with a bounded term read:
//! - no coordinator: every node is (re)connected and probed; reachable nodes
//!   become alive with the term found on disk.
//! - coordinator designated: the coordinator is probed first. Alive nodes at
//!   the coordinator's term get the same light probe. Nodes coming back from
//!   the dead, and alive nodes whose term fell behind (e.g. storage wiped
//!   between two polls), are fully resynchronized from the coordinator before
//!   they are marked alive as slaves.
//!
//! A node whose term is ahead of the coordinator's holds newer data than the
//! coordinator; it is marked alive and the coordinator is dropped so the next
//! election can pick it.
//!
//! Rejoins are detected by polling, so a recovered node stays out of the
//! cluster for up to one poll interval.

use crate::common::{NodeId, Result};
use crate::coordinator::registry::SharedRegistry;
use crate::coordinator::replication::Replicator;
use crate::coordinator::term::TermStore;
use futures_util::future::join_all;

#[derive(Clone)]
pub struct HealthMonitor {
    nodes: SharedRegistry,
    terms: TermStore,
    replication: Replicator,
}

impl HealthMonitor {
    pub fn new(nodes: SharedRegistry, terms: TermStore, replication: Replicator) -> Self {
        Self {
            nodes,
            terms,
            replication,
        }
    }

    /// Re-evaluate liveness of every node. Never fails; unreachable nodes are
    /// demoted.
    pub async fn refresh(&self) {
        let (coordinator, nodes) = {
            let reg = self.nodes.read().await;
            (reg.coordinator_id(), reg.list_nodes())
        };

        let coordinator = match coordinator {
            Some(id) => self.probe(id).await.ok().map(|_| id),
            None => None,
        };

        join_all(
            nodes
                .iter()
                .filter(|d| Some(d.id) != coordinator)
                .map(|d| async move {
                    let res = match coordinator {
                        Some(c) => self.follow(d.id, d.alive, c).await,
                        None => self.probe(d.id).await.map(|_| ()),
                    };
                    if let Err(e) = res {
                        tracing::debug!("Health check of node {} failed: {}", d.id, e);
                    }
                }),
        )
        .await;
    }

    /// Light pass: one term read, refreshing liveness and term.
    async fn probe(&self, id: NodeId) -> Result<u64> {
        let generation = self.nodes.read().await.generation(id);
        let term = self.terms.get_term(id).await?;
        self.nodes.write().await.mark_alive(id, generation, term);
        Ok(term)
    }

    /// Check a non-coordinator node while a coordinator is in charge. Only an
    /// alive node already at the coordinator's term stays on the light path.
    async fn follow(&self, id: NodeId, was_alive: bool, coordinator: NodeId) -> Result<()> {
        let generation = self.nodes.read().await.generation(id);
        let term = self.terms.get_term(id).await?;

        let coordinator_term = self
            .nodes
            .read()
            .await
            .get(coordinator)
            .map_or(0, |d| d.term);
        if term > coordinator_term {
            tracing::warn!(
                "Node {} is at term {} ahead of coordinator {} (term {}); forcing election",
                id,
                term,
                coordinator,
                coordinator_term
            );
            let mut reg = self.nodes.write().await;
            reg.mark_alive(id, generation, term);
            reg.set_coordinator(None);
            return Ok(());
        }

        if was_alive && term == coordinator_term {
            self.nodes.write().await.mark_alive(id, generation, term);
            return Ok(());
        }

        if was_alive {
            tracing::warn!(
                "Node {} fell behind to term {} (coordinator at {}), resynchronizing",
                id,
                term,
                coordinator_term
            );
        } else {
            tracing::info!("Node {} rejoining at term {}, resynchronizing", id, term);
        }
        if !self.replication.admit(id, coordinator, generation).await? {
            tracing::debug!("Node {} demoted again during rejoin", id);
        }
        Ok(())
    }
}
