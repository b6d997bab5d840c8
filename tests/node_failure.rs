//! Node failure and recovery tests for termkv

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use termkv::common::{ClusterConfig, NodeConfig};
use termkv::storage::{MemoryAdapter, MemoryStore, NodeStore};
use termkv::{Cluster, Role};

fn cluster(ids: &[u64]) -> (Cluster, Vec<Arc<MemoryStore>>) {
    let adapter = Arc::new(MemoryAdapter::new());
    let stores = ids
        .iter()
        .map(|id| adapter.add_node(&format!("n{}", id)))
        .collect();
    let config = ClusterConfig {
        nodes: ids
            .iter()
            .map(|&id| NodeConfig {
                id,
                endpoint: format!("memory://n{}", id),
            })
            .collect(),
        poll_interval_ms: 50,
        node_timeout_ms: 200,
        ..Default::default()
    };
    (Cluster::new(&config, adapter).unwrap(), stores)
}

#[tokio::test]
async fn test_coordinator_failure_promotes_next_node() {
    let (cluster, stores) = cluster(&[1, 2, 3]);
    assert_eq!(cluster.tick().await, Some(3));
    cluster.write(json!("before failover")).await.unwrap();

    stores[2].set_available(false);
    assert_eq!(cluster.tick().await, Some(2));

    let status = cluster.status().await;
    assert!(!status[2].alive);
    assert_eq!(status[2].role, Role::Unknown);
    assert_eq!(status[1].role, Role::Master);
    assert_eq!(status[0].role, Role::Slave);
    // Strictly newer than every term handed out before
    assert_eq!(status[1].term, 2);
    assert_eq!(status[0].term, 2);

    // Data written under the old coordinator survives
    let outcome = cluster.write(json!("after failover")).await.unwrap();
    assert_eq!(outcome.coordinator_id, 2);
    assert_eq!(outcome.term, 2);
    assert_eq!(stores[0].len(), 2);
    assert_eq!(stores[1].len(), 2);
}

#[tokio::test]
async fn test_coordinator_failure_on_write_wakes_election() {
    let (cluster, stores) = cluster(&[1, 2]);
    cluster.tick().await;
    stores[1].set_available(false);

    let err = cluster.write(json!("lost")).await.unwrap_err();
    assert!(matches!(err, termkv::Error::NoCoordinator));
    assert!(cluster.coordinator().await.is_none());

    assert_eq!(cluster.tick().await, Some(1));
    let outcome = cluster.write(json!("kept")).await.unwrap();
    assert_eq!(outcome.coordinator_id, 1);
}

#[tokio::test]
async fn test_rejoining_replica_catches_up() {
    let (cluster, stores) = cluster(&[1, 2, 3]);
    assert_eq!(cluster.tick().await, Some(3));

    // Node 1 misses a write at term 1
    stores[0].set_available(false);
    cluster.write(json!("r1")).await.unwrap();
    assert!(!cluster.status().await[0].alive);

    // Two failovers push the cluster to term 3 while node 1 is away
    stores[2].set_available(false);
    assert_eq!(cluster.tick().await, Some(2));
    stores[2].set_available(true);
    cluster.tick().await;
    assert_eq!(cluster.status().await[2].role, Role::Slave);

    stores[1].set_available(false);
    assert_eq!(cluster.tick().await, Some(3));
    cluster.write(json!("r2")).await.unwrap();
    assert_eq!(stores[0].peek_term(), Some(1));

    stores[0].set_available(true);
    assert_eq!(cluster.tick().await, Some(3));

    let status = cluster.status().await;
    assert!(status[0].alive);
    assert_eq!(status[0].role, Role::Slave);
    assert_eq!(status[0].term, 3);
    assert_eq!(stores[0].peek_term(), Some(3));
    assert_eq!(
        stores[0].list_records().await.unwrap(),
        stores[2].list_records().await.unwrap()
    );
    assert_eq!(stores[0].len(), 2);
}

#[tokio::test]
async fn test_slow_replica_is_demoted() {
    let (cluster, stores) = cluster(&[1, 2]);
    cluster.tick().await;
    stores[0].set_latency(Duration::from_millis(500));

    let outcome = cluster.write(json!("fast path")).await.unwrap();
    assert_eq!(outcome.coordinator_id, 2);
    assert!(!cluster.status().await[0].alive);

    // Back to normal speed, the next round resyncs it
    stores[0].set_latency(Duration::ZERO);
    cluster.tick().await;
    let status = cluster.status().await;
    assert!(status[0].alive);
    assert_eq!(status[0].role, Role::Slave);
    assert_eq!(stores[0].len(), 1);
}

#[tokio::test]
async fn test_rejoin_detected_only_on_next_round() {
    let (cluster, stores) = cluster(&[1, 2]);
    cluster.tick().await;
    stores[0].set_available(false);
    cluster.tick().await;
    assert!(!cluster.status().await[0].alive);

    stores[0].set_available(true);
    // No round has run yet
    assert!(!cluster.status().await[0].alive);
    cluster.tick().await;
    assert!(cluster.status().await[0].alive);
}

#[tokio::test]
async fn test_alive_replica_with_wiped_storage_is_resynced() {
    let (cluster, stores) = cluster(&[1, 2]);
    assert_eq!(cluster.tick().await, Some(2));
    cluster.write(json!("a")).await.unwrap();
    cluster.write(json!("b")).await.unwrap();

    // Node 1 restarts with empty storage between two rounds, never seen down
    stores[0].delete_all_records().await.unwrap();
    stores[0].set_term(0).await.unwrap();

    assert_eq!(cluster.tick().await, Some(2));

    let status = cluster.status().await;
    assert!(status[0].alive);
    assert_eq!(status[0].role, Role::Slave);
    assert_eq!(status[0].term, 1);
    assert_eq!(stores[0].peek_term(), Some(1));
    assert_eq!(
        stores[0].list_records().await.unwrap(),
        stores[1].list_records().await.unwrap()
    );
    assert_eq!(stores[0].len(), 2);

    // Steady state stays on the light path
    assert_eq!(cluster.tick().await, Some(2));
    assert_eq!(cluster.status().await[0].term, 1);
}
