//! Election engine
//!
//! ```text
//! NoCoordinator ──elect()──▶ Electing ──▶ Settled(coordinator)
//!       ▲                                        │
//!       └────────── coordinator dies ────────────┘
//! ```
//!
//! Candidates are the alive nodes, highest id first. A candidate is eligible
//! only if its term is not behind the highest alive term; an ineligible
//! candidate is resynchronized from the current coordinator (if any) and
//! skipped for this pass. The first eligible candidate becomes master at a
//! fresh term and every other alive node is demoted to slave and fully
//! resynchronized from it.
//!
//! The coordination loop only elects once no coordinator is tracked, so there
//! the catch-up step has no source and the promote-time resync is what brings
//! a lagging node up. The catch-up matters when `elect()` runs while a
//! coordinator is still in charge.
//!
//! Elections are local computations: the engine reads every node's store
//! directly, so no vote messages are exchanged. This assumes exactly one
//! coordinating process, and that it does not die half way through.

use crate::common::{Error, NodeId, Result};
use crate::coordinator::registry::{NodeDescriptor, Role, SharedRegistry};
use crate::coordinator::replication::Replicator;
use crate::coordinator::term::TermStore;

/// Gate: a node behind the cluster's highest alive term cannot lead.
pub fn check_eligible(candidate: &NodeDescriptor, highest_alive_term: u64) -> Result<()> {
    if candidate.term < highest_alive_term {
        return Err(Error::StaleTerm {
            node: candidate.id,
            term: candidate.term,
            highest: highest_alive_term,
        });
    }
    Ok(())
}

#[derive(Clone)]
pub struct ElectionEngine {
    nodes: SharedRegistry,
    terms: TermStore,
    replication: Replicator,
}

impl ElectionEngine {
    pub fn new(nodes: SharedRegistry, terms: TermStore, replication: Replicator) -> Self {
        Self {
            nodes,
            terms,
            replication,
        }
    }

    /// Run one election pass. Returns the new coordinator, or `None` when no
    /// alive node is eligible (retried on the next tick).
    pub async fn elect(&self) -> Option<NodeId> {
        let (term, candidates) = {
            let mut reg = self.nodes.write().await;
            (reg.next_global_term(), reg.candidates())
        };
        tracing::info!(
            "Starting election for term {} ({} candidates)",
            term,
            candidates.len()
        );

        for candidate in candidates {
            let (desc, highest, coordinator) = {
                let reg = self.nodes.read().await;
                let Some(desc) = reg.get(candidate).filter(|d| d.alive).cloned() else {
                    continue;
                };
                (desc, reg.highest_alive_term(), reg.coordinator_id())
            };

            if let Err(stale) = check_eligible(&desc, highest) {
                tracing::info!("Rejecting candidate: {}", stale);
                if let Some(source) = coordinator.filter(|&c| c != candidate) {
                    // Catch up now so the node can qualify on a later pass.
                    if let Err(e) = self.replication.synchronize(candidate, source).await {
                        tracing::warn!("Catch-up of node {} failed: {}", candidate, e);
                    }
                }
                continue;
            }

            match self.promote(candidate, term).await {
                Ok(()) => return Some(candidate),
                Err(e) => {
                    tracing::warn!("Candidate {} could not take term {}: {}", candidate, term, e);
                }
            }
        }

        self.nodes.write().await.set_coordinator(None);
        tracing::warn!("Election for term {} failed: no eligible node", term);
        None
    }

    /// Make `winner` master at `term`, then demote and resync everyone else.
    async fn promote(&self, winner: NodeId, term: u64) -> Result<()> {
        self.terms.set_term(winner, term).await?;

        let followers = {
            let mut reg = self.nodes.write().await;
            reg.set_role(winner, Role::Master);
            reg.set_coordinator(Some(winner));
            let followers = reg.alive_except(winner);
            for &id in &followers {
                reg.set_role(id, Role::Slave);
            }
            followers
        };
        tracing::info!("Node {} elected master for term {}", winner, term);

        for (id, res) in self
            .replication
            .synchronize_all(&followers, winner)
            .await
        {
            if let Err(e) = res {
                tracing::warn!("Node {} left out of term {}: {}", id, term, e);
            }
        }
        Ok(())
    }
}
