//! Per-node durable term record
//!
//! Reads and writes go through the node's storage connection under the
//! configured timeout. A failed call demotes the node (see
//! [`SharedRegistry::call`]); callers get the error back but are expected to
//! carry on.

use crate::common::{NodeId, Result};
use crate::coordinator::registry::SharedRegistry;

#[derive(Clone)]
pub struct TermStore {
    nodes: SharedRegistry,
}

impl TermStore {
    pub fn new(nodes: SharedRegistry) -> Self {
        Self { nodes }
    }

    /// Persisted term of `id`, created as 0 if absent.
    pub async fn get_term(&self, id: NodeId) -> Result<u64> {
        self.nodes
            .call(id, "get_term", |store| async move { store.get_term().await })
            .await
    }

    /// Persist `term` for `id` and mirror it into the descriptor.
    pub async fn set_term(&self, id: NodeId, term: u64) -> Result<()> {
        self.nodes
            .call(id, "set_term", |store| async move { store.set_term(term).await })
            .await?;
        self.nodes.write().await.set_term(id, term);
        Ok(())
    }
}
