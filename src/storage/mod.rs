//! Storage adapter contract and backends
//!
//! Every cluster member owns one store holding:
//! - a single term record under a sentinel key
//! - the application record collection
//!
//! The coordinator never shares storage between nodes; it reaches each node's
//! store through a [`StorageAdapter`], which hands out [`NodeStore`] handles.
//! Endpoints select the backend by scheme:
//!
//! ```text
//! memory://name      in-process store (tests, demos)
//! sled:///var/n1     local sled database
//! http://host:6000   remote termkv-node server
//! ```

pub mod http;
pub mod memory;
#[cfg(feature = "sled-backend")]
pub mod sled_store;

use crate::common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub use self::http::{HttpAdapter, HttpNodeStore};
pub use memory::{MemoryAdapter, MemoryStore};
#[cfg(feature = "sled-backend")]
pub use sled_store::{SledAdapter, SledStore};

/// Sentinel key of the per-node term record
pub const TERM_KEY: &str = "__term__";

/// Application payload with a stable identity and creation timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: Uuid,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Sort order every backend uses for `list_records`
pub(crate) fn sort_records(records: &mut [ApplicationRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}

/// Handle on one node's store.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Read the term record, creating it with 0 if absent.
    async fn get_term(&self) -> Result<u64>;

    /// Idempotent upsert of the term record.
    async fn set_term(&self, term: u64) -> Result<()>;

    /// All application records, oldest first.
    async fn list_records(&self) -> Result<Vec<ApplicationRecord>>;

    async fn delete_all_records(&self) -> Result<()>;

    /// Bulk insert, preserving ids and timestamps.
    async fn insert_records(&self, records: Vec<ApplicationRecord>) -> Result<()>;

    async fn insert_record(&self, record: ApplicationRecord) -> Result<ApplicationRecord>;

    /// Replace the payload of an existing record. `Error::NotFound` if missing.
    async fn update_record(
        &self,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<ApplicationRecord>;
}

/// Opens [`NodeStore`] handles from endpoint descriptors.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeStore>>;
}

/// Dispatches `connect` to a backend by endpoint scheme.
pub struct Backends {
    memory: Arc<MemoryAdapter>,
    #[cfg(feature = "sled-backend")]
    sled: SledAdapter,
    http: HttpAdapter,
}

impl Backends {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            memory: Arc::new(MemoryAdapter::new()),
            #[cfg(feature = "sled-backend")]
            sled: SledAdapter::new(),
            http: HttpAdapter::new(request_timeout)?,
        })
    }

    /// Shared in-process backend, so callers can reach `memory://` stores directly.
    pub fn memory(&self) -> Arc<MemoryAdapter> {
        self.memory.clone()
    }
}

#[async_trait]
impl StorageAdapter for Backends {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeStore>> {
        let (scheme, _) = endpoint
            .split_once("://")
            .ok_or_else(|| Error::InvalidConfig(format!("endpoint without scheme: {}", endpoint)))?;
        match scheme {
            "memory" => self.memory.connect(endpoint).await,
            #[cfg(feature = "sled-backend")]
            "sled" => self.sled.connect(endpoint).await,
            "http" | "https" => self.http.connect(endpoint).await,
            other => Err(Error::InvalidConfig(format!(
                "unsupported endpoint scheme: {}",
                other
            ))),
        }
    }
}
