//! CLI for the coordinator request layer

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "termkv")]
#[command(about = "termkv client CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5000")]
    coordinator: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every node's liveness, role and term
    Status,

    /// Write a new record (JSON payload)
    Write {
        /// Payload, e.g. '{"name": "alice"}'
        payload: String,
    },

    /// Replace the payload of an existing record
    Update {
        /// Record id
        id: String,

        /// Payload
        payload: String,
    },

    /// List the records held by one node
    Read {
        /// Node id
        node: u64,
    },

    /// Ask the coordinator to run a coordination round now
    Elect,
}

fn parse_payload(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).context("payload must be valid JSON")
}

async fn expect_json(resp: reqwest::Response) -> anyhow::Result<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    if !status.is_success() {
        let reason = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        bail!("{}: {}", status, reason);
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.coordinator.trim_end_matches('/');

    match cli.command {
        Commands::Status => {
            let body = expect_json(client.get(format!("{}/status", base)).send().await?).await?;
            println!("{:<6} {:<8} {:<8} {:<6} endpoint", "id", "alive", "role", "term");
            for node in body.as_array().into_iter().flatten() {
                let marker = if node["is_coordinator"].as_bool() == Some(true) {
                    " *"
                } else {
                    ""
                };
                println!(
                    "{:<6} {:<8} {:<8} {:<6} {}{}",
                    node["id"].to_string(),
                    node["alive"].to_string(),
                    node["role"].as_str().unwrap_or("?"),
                    node["term"].to_string(),
                    node["endpoint"].as_str().unwrap_or(""),
                    marker
                );
            }
        }

        Commands::Write { payload } => {
            let payload = parse_payload(&payload)?;
            let resp = client
                .post(format!("{}/records", base))
                .json(&json!({ "payload": payload }))
                .send()
                .await?;
            let body = expect_json(resp).await?;
            println!("Written by node {} at term {}:", body["coordinator_id"], body["term"]);
            println!("{}", serde_json::to_string_pretty(&body["record"])?);
        }

        Commands::Update { id, payload } => {
            let payload = parse_payload(&payload)?;
            let resp = client
                .put(format!("{}/records/{}", base, id))
                .json(&json!({ "payload": payload }))
                .send()
                .await?;
            let body = expect_json(resp).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Commands::Read { node } => {
            let resp = client
                .get(format!("{}/nodes/{}/records", base, node))
                .send()
                .await?;
            let body = expect_json(resp).await?;
            println!(
                "Node {} ({}, term {}):",
                node,
                body["role"].as_str().unwrap_or("?"),
                body["term"]
            );
            println!("{}", serde_json::to_string_pretty(&body["records"])?);
        }

        Commands::Elect => {
            let resp = client.post(format!("{}/admin/elect", base)).send().await?;
            expect_json(resp).await?;
            println!("Coordination round triggered");
        }
    }

    Ok(())
}
