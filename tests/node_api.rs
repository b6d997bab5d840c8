//! Storage node HTTP API, driven through the HTTP storage adapter and
//! through a coordinator running over real sockets

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use termkv::common::{ClusterConfig, NodeConfig};
use termkv::node::server::serve_store;
use termkv::storage::{Backends, HttpAdapter, MemoryStore, NodeStore, StorageAdapter};
use termkv::{ApplicationRecord, Cluster, Error, Role};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct TestNode {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    stop: Option<oneshot::Sender<()>>,
}

impl TestNode {
    async fn spawn(name: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(MemoryStore::new(name));
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(serve_store(listener, store.clone(), name.to_string(), async move {
            rx.await.ok();
        }));
        Self {
            addr,
            store,
            stop: Some(tx),
        }
    }

    fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn test_http_store_operations() {
    let node = TestNode::spawn("n1").await;
    let adapter = HttpAdapter::new(Duration::from_secs(2)).unwrap();
    let remote = adapter.connect(&node.endpoint()).await.unwrap();

    assert_eq!(remote.get_term().await.unwrap(), 0);
    remote.set_term(3).await.unwrap();
    assert_eq!(remote.get_term().await.unwrap(), 3);
    assert_eq!(node.store.peek_term(), Some(3));

    let record = remote
        .insert_record(ApplicationRecord::new(json!({"name": "alice"})))
        .await
        .unwrap();
    let updated = remote
        .update_record(record.id, json!({"name": "bob"}))
        .await
        .unwrap();
    assert_eq!(updated.id, record.id);
    assert_eq!(updated.payload, json!({"name": "bob"}));

    let missing = remote.update_record(uuid::Uuid::new_v4(), json!(1)).await;
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let batch = vec![
        ApplicationRecord::new(json!(1)),
        ApplicationRecord::new(json!(2)),
    ];
    remote.delete_all_records().await.unwrap();
    remote.insert_records(batch).await.unwrap();
    assert_eq!(remote.list_records().await.unwrap().len(), 2);
    assert_eq!(node.store.len(), 2);
}

#[tokio::test]
async fn test_http_store_reports_unavailable_node() {
    let node = TestNode::spawn("n1").await;
    let adapter = HttpAdapter::new(Duration::from_secs(2)).unwrap();
    let remote = adapter.connect(&node.endpoint()).await.unwrap();

    node.store.set_available(false);
    assert!(matches!(
        remote.get_term().await,
        Err(Error::ConnectionFailed(_))
    ));
    assert!(matches!(
        remote.list_records().await,
        Err(Error::ConnectionFailed(_))
    ));
    assert!(adapter.connect(&node.endpoint()).await.is_ok());
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = HttpAdapter::new(Duration::from_millis(500)).unwrap();
    assert!(adapter.connect(&format!("http://{}", addr)).await.is_err());
}

#[tokio::test]
async fn test_cluster_over_http_nodes() {
    let nodes = [TestNode::spawn("n1").await, TestNode::spawn("n2").await];
    let config = ClusterConfig {
        nodes: nodes
            .iter()
            .enumerate()
            .map(|(i, n)| NodeConfig {
                id: i as u64 + 1,
                endpoint: n.endpoint(),
            })
            .collect(),
        node_timeout_ms: 2_000,
        ..Default::default()
    };
    let adapter = Arc::new(Backends::new(config.node_timeout()).unwrap());
    let cluster = Cluster::new(&config, adapter).unwrap();

    assert_eq!(cluster.tick().await, Some(2));
    let outcome = cluster.write(json!({"k": "v"})).await.unwrap();
    assert_eq!(outcome.term, 1);
    assert_eq!(nodes[0].store.len(), 1);
    assert_eq!(nodes[1].store.len(), 1);

    // Master fails over to node 1, which already holds the record
    nodes[1].store.set_available(false);
    assert_eq!(cluster.tick().await, Some(1));
    let view = cluster.read(1).await.unwrap();
    assert_eq!(view.role, Role::Master);
    assert_eq!(view.term, 2);
    assert_eq!(view.records.len(), 1);
}
