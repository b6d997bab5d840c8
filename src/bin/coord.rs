//! Coordinator binary

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use termkv::common::{parse_duration_ms, ClusterConfig, NodeConfig};
use termkv::Coordinator;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "termkv-coord")]
#[command(about = "termkv coordinator: master election and replication")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Config file (TOML); defaults to ./termkv.toml if present
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Cluster member as ID=ENDPOINT (repeatable)
        #[arg(long = "node", value_parser = parse_node)]
        nodes: Vec<NodeConfig>,

        /// Coordination loop cadence (e.g. 10s)
        #[arg(long)]
        poll_interval: Option<String>,

        /// Per-node call timeout (e.g. 5s)
        #[arg(long)]
        node_timeout: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long)]
        log_level: Option<String>,
    },
}

fn parse_node(s: &str) -> Result<NodeConfig, String> {
    let (id, endpoint) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ID=ENDPOINT, got {}", s))?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid node id: {}", id))?;
    Ok(NodeConfig {
        id,
        endpoint: endpoint.trim().to_string(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            nodes,
            poll_interval,
            node_timeout,
            log_level,
        } => {
            // Load config from file/env, then override with CLI arguments
            let mut cluster_config = ClusterConfig::load(config.as_deref())?;
            if let Some(bind) = bind {
                cluster_config.bind_addr = bind;
            }
            if !nodes.is_empty() {
                cluster_config.nodes = nodes;
            }
            if let Some(interval) = poll_interval {
                cluster_config.poll_interval_ms = parse_duration_ms(&interval)?;
            }
            if let Some(timeout) = node_timeout {
                cluster_config.node_timeout_ms = parse_duration_ms(&timeout)?;
            }
            if let Some(level) = log_level {
                cluster_config.log_level = level;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| cluster_config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            cluster_config.validate()?;
            Coordinator::new(cluster_config).serve().await?;
        }
    }

    Ok(())
}
