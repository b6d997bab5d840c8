//! Coordinator server

use crate::common::{shutdown_signal, ClusterConfig, Result};
use crate::coordinator::cluster::Cluster;
use crate::coordinator::http::{create_router, CoordState};
use crate::storage::Backends;
use std::sync::Arc;

pub struct Coordinator {
    config: ClusterConfig,
}

impl Coordinator {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting coordinator");
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Poll interval: {:?}", self.config.poll_interval());
        tracing::info!("  Node timeout: {:?}", self.config.node_timeout());
        for node in &self.config.nodes {
            tracing::info!("  Node {}: {}", node.id, node.endpoint);
        }

        let adapter = Arc::new(Backends::new(self.config.node_timeout())?);
        let cluster = Cluster::new(&self.config, adapter)?;
        let loop_handle = cluster.start();

        let http_router = create_router(CoordState { cluster });
        let http_listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Coordinator ready");

        let res = axum::serve(http_listener, http_router)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        loop_handle.abort();
        if let Err(e) = res {
            tracing::error!("HTTP server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }
}
