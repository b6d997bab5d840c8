//! Coordinator restart over persistent sled nodes

#![cfg(feature = "sled-backend")]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use termkv::common::{ClusterConfig, NodeConfig};
use termkv::storage::Backends;
use termkv::Cluster;

fn config(dir: &TempDir) -> ClusterConfig {
    ClusterConfig {
        nodes: (1..=2)
            .map(|id| NodeConfig {
                id,
                endpoint: format!("sled://{}", dir.path().join(format!("n{}", id)).display()),
            })
            .collect(),
        node_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn open(config: &ClusterConfig) -> Cluster {
    let adapter = Arc::new(Backends::new(Duration::from_secs(2)).unwrap());
    Cluster::new(config, adapter).unwrap()
}

#[tokio::test]
async fn test_restart_keeps_records_and_advances_term() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    // First coordinator run
    {
        let cluster = open(&config);
        assert_eq!(cluster.tick().await, Some(2));
        cluster.write(json!({"name": "alice"})).await.unwrap();
        cluster.write(json!({"name": "bob"})).await.unwrap();
    }

    // Restart: terms come back from disk and the next election goes past them
    {
        let cluster = open(&config);
        assert_eq!(cluster.tick().await, Some(2));
        assert_eq!(cluster.coordinator().await.unwrap().term, 2);

        for id in [1, 2] {
            let view = cluster.read(id).await.unwrap();
            assert_eq!(view.term, 2);
            assert_eq!(view.records.len(), 2);
        }
    }
}
