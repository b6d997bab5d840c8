//! In-memory node store
//!
//! Each `memory://name` endpoint maps to one shared [`MemoryStore`]. A store can
//! be switched off (or slowed down) to simulate a crashed or hung node: every
//! call on an unavailable store, including `connect`, fails with
//! `Error::ConnectionFailed`.

use super::{sort_records, ApplicationRecord, NodeStore, StorageAdapter};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use uuid::Uuid;

const SCHEME: &str = "memory://";

#[derive(Default)]
struct MemoryState {
    term: Option<u64>,
    records: HashMap<Uuid, ApplicationRecord>,
}

/// In-memory store with fault injection
pub struct MemoryStore {
    name: String,
    state: Mutex<MemoryState>,
    available: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simulate a crash (`false`) or a restart (`true`). Data survives.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Delay applied before every call, to exercise per-node timeouts.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of records held, regardless of availability.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Term as persisted, without creating it and regardless of availability.
    pub fn peek_term(&self) -> Option<u64> {
        self.lock().term
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ready(&self) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::ConnectionFailed(format!(
                "memory store {} is down",
                self.name
            )))
        }
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_term(&self) -> Result<u64> {
        self.ready().await?;
        Ok(*self.lock().term.get_or_insert(0))
    }

    async fn set_term(&self, term: u64) -> Result<()> {
        self.ready().await?;
        self.lock().term = Some(term);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ApplicationRecord>> {
        self.ready().await?;
        let mut records: Vec<_> = self.lock().records.values().cloned().collect();
        sort_records(&mut records);
        Ok(records)
    }

    async fn delete_all_records(&self) -> Result<()> {
        self.ready().await?;
        self.lock().records.clear();
        Ok(())
    }

    async fn insert_records(&self, records: Vec<ApplicationRecord>) -> Result<()> {
        self.ready().await?;
        let mut state = self.lock();
        for record in records {
            state.records.insert(record.id, record);
        }
        Ok(())
    }

    async fn insert_record(&self, record: ApplicationRecord) -> Result<ApplicationRecord> {
        self.ready().await?;
        self.lock().records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_record(
        &self,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<ApplicationRecord> {
        self.ready().await?;
        let mut state = self.lock();
        let record = state
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.payload = payload;
        Ok(record.clone())
    }
}

/// Registry of named in-memory stores
#[derive(Default)]
pub struct MemoryAdapter {
    stores: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the store behind `memory://name`.
    pub fn add_node(&self, name: &str) -> Arc<MemoryStore> {
        let name = name.strip_prefix(SCHEME).unwrap_or(name);
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone()
    }

    pub fn store(&self, name: &str) -> Option<Arc<MemoryStore>> {
        let name = name.strip_prefix(SCHEME).unwrap_or(name);
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeStore>> {
        let store = self.add_node(endpoint);
        store.ready().await?;
        Ok(store)
    }
}
