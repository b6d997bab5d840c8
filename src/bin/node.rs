//! Storage node binary

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use termkv::common::NodeServerConfig;
use termkv::NodeServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "termkv-node")]
#[command(about = "termkv storage node - holds one replica's term and records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start storage node server
    Serve {
        /// Node name (for logs and /health)
        #[arg(long, default_value = "node-1")]
        name: String,

        /// Bind address for HTTP
        #[arg(long, default_value = "0.0.0.0:6000")]
        bind: SocketAddr,

        /// Data directory for storage
        #[arg(long, default_value = "./node-data")]
        data: PathBuf,

        /// Log level (trace, debug, info, warn, error)
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            name,
            bind,
            data,
            log_level,
        } => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| log_level.into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            let config = NodeServerConfig {
                bind_addr: bind,
                data_path: data,
            };
            NodeServer::new(config, name).serve().await?;
        }
    }

    Ok(())
}
