//! Term-gating tests: a node holding older data must never lead, and a node
//! holding newer data must not be overwritten by an older coordinator

use serde_json::json;
use std::sync::Arc;
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
        node_timeout_ms: 500,
        ..Default::default()
    };
    (Cluster::new(&config, adapter).unwrap(), stores)
}

#[tokio::test]
async fn test_stale_high_id_node_is_skipped() {
    let (cluster, stores) = cluster(&[1, 2, 3]);
    stores[0].set_term(4).await.unwrap();
    stores[1].set_term(4).await.unwrap();
    stores[2].set_term(2).await.unwrap();

    // Node 3 has the highest id but lags behind; node 2 is the best eligible
    assert_eq!(cluster.tick().await, Some(2));

    let status = cluster.status().await;
    assert_eq!(status[1].role, Role::Master);
    assert_eq!(status[1].term, 5);
    assert_eq!(status[2].role, Role::Slave);
    assert_eq!(status[2].term, 5);
    assert_eq!(status[0].term, 5);
    assert_eq!(stores[2].peek_term(), Some(5));
}

#[tokio::test]
async fn test_election_term_exceeds_terms_on_disk() {
    let (cluster, stores) = cluster(&[1, 2]);
    stores[0].set_term(7).await.unwrap();
    stores[1].set_term(7).await.unwrap();

    assert_eq!(cluster.tick().await, Some(2));
    let coordinator = cluster.coordinator().await.unwrap();
    assert_eq!(coordinator.term, 8);
    assert_eq!(cluster.registry().read().await.global_term(), 8);
}

#[tokio::test]
async fn test_rejoin_ahead_of_coordinator_forces_election() {
    let (cluster, stores) = cluster(&[1, 2]);
    assert_eq!(cluster.tick().await, Some(2));

    stores[0].set_available(false);
    cluster.write(json!("only on node 2")).await.unwrap();
    assert!(!cluster.status().await[0].alive);

    // Node 1 comes back carrying a term the coordinator never issued
    stores[0].set_available(true);
    stores[0].set_term(5).await.unwrap();

    assert_eq!(cluster.tick().await, Some(1));

    let status = cluster.status().await;
    assert_eq!(status[0].role, Role::Master);
    assert_eq!(status[0].term, 6);
    assert_eq!(status[1].role, Role::Slave);
    assert_eq!(status[1].term, 6);
    // Node 2 now mirrors the newer node
    assert_eq!(
        stores[1].list_records().await.unwrap(),
        stores[0].list_records().await.unwrap()
    );
}

#[tokio::test]
async fn test_single_coordinator_at_all_times() {
    let (cluster, stores) = cluster(&[1, 2, 3]);
    for victim in [2, 1, 0] {
        cluster.tick().await;
        let masters = cluster
            .status()
            .await
            .iter()
            .filter(|s| s.alive && s.role == Role::Master)
            .count();
        assert_eq!(masters, 1);
        stores[victim].set_available(false);
    }

    cluster.tick().await;
    assert!(cluster
        .status()
        .await
        .iter()
        .all(|s| s.role != Role::Master || !s.alive));
}
