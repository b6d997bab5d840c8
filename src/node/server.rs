//! Storage node server

use crate::common::{shutdown_signal, NodeServerConfig, Result};
use crate::node::http::{create_router, NodeState};
use crate::storage::NodeStore;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct NodeServer {
    config: NodeServerConfig,
    node_name: String,
}

impl NodeServer {
    pub fn new(config: NodeServerConfig, node_name: String) -> Self {
        Self { config, node_name }
    }

    #[cfg(feature = "sled-backend")]
    fn open_store(&self) -> Result<Arc<dyn NodeStore>> {
        std::fs::create_dir_all(&self.config.data_path)?;
        Ok(Arc::new(crate::storage::SledStore::open(
            &self.config.data_path,
        )?))
    }

    #[cfg(not(feature = "sled-backend"))]
    fn open_store(&self) -> Result<Arc<dyn NodeStore>> {
        tracing::warn!("Built without sled-backend: node data is kept in memory only");
        Ok(Arc::new(crate::storage::MemoryStore::new(
            self.node_name.clone(),
        )))
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting storage node: {}", self.node_name);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Data path: {}", self.config.data_path.display());

        let store = self.open_store()?;
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        serve_store(listener, store, self.node_name, shutdown_signal()).await
    }
}

/// Serve `store` on an already-bound listener until `shutdown` resolves.
pub async fn serve_store<F>(
    listener: TcpListener,
    store: Arc<dyn NodeStore>,
    node_name: String,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(NodeState { store, node_name });
    tracing::info!("✓ Storage node ready on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
