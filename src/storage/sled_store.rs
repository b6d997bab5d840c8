//! Durable node store on sled
//!
//! Layout:
//! - default tree: `__term__` -> u64 (big endian)
//! - `records` tree: uuid bytes -> JSON-encoded `ApplicationRecord`
//!
//! Every mutation is flushed before returning, so an acknowledged write is
//! on disk.

use super::{sort_records, ApplicationRecord, NodeStore, StorageAdapter, TERM_KEY};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

const SCHEME: &str = "sled://";
const RECORDS_TREE: &str = "records";

/// Node store backed by a sled database
pub struct SledStore {
    db: sled::Db,
    records: sled::Tree,
}

impl SledStore {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        Ok(Self { db, records })
    }

    fn decode_term(bytes: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| Error::Serialization("term record is not 8 bytes".into()))?;
        Ok(u64::from_be_bytes(raw))
    }

    async fn flush(&self) -> Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl NodeStore for SledStore {
    async fn get_term(&self) -> Result<u64> {
        if let Some(bytes) = self.db.get(TERM_KEY)? {
            return Self::decode_term(&bytes);
        }
        // Create-if-absent; a concurrent creator wins and we read its value.
        match self
            .db
            .compare_and_swap(TERM_KEY, None as Option<&[u8]>, Some(&0u64.to_be_bytes()[..]))?
        {
            Ok(()) => {
                self.flush().await?;
                Ok(0)
            }
            Err(cas) => match cas.current {
                Some(bytes) => Self::decode_term(&bytes),
                None => Ok(0),
            },
        }
    }

    async fn set_term(&self, term: u64) -> Result<()> {
        self.db.insert(TERM_KEY, &term.to_be_bytes()[..])?;
        self.flush().await
    }

    async fn list_records(&self) -> Result<Vec<ApplicationRecord>> {
        let mut records = Vec::with_capacity(self.records.len());
        for item in self.records.iter() {
            let (_, value) = item?;
            records.push(serde_json::from_slice::<ApplicationRecord>(&value)?);
        }
        sort_records(&mut records);
        Ok(records)
    }

    async fn delete_all_records(&self) -> Result<()> {
        self.records.clear()?;
        self.flush().await
    }

    async fn insert_records(&self, records: Vec<ApplicationRecord>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for record in &records {
            batch.insert(record.id.as_bytes().to_vec(), serde_json::to_vec(record)?);
        }
        self.records.apply_batch(batch)?;
        self.flush().await
    }

    async fn insert_record(&self, record: ApplicationRecord) -> Result<ApplicationRecord> {
        self.records
            .insert(record.id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.flush().await?;
        Ok(record)
    }

    async fn update_record(
        &self,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<ApplicationRecord> {
        let bytes = self
            .records
            .get(id.as_bytes())?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut record: ApplicationRecord = serde_json::from_slice(&bytes)?;
        record.payload = payload;
        self.records
            .insert(id.as_bytes(), serde_json::to_vec(&record)?)?;
        self.flush().await?;
        Ok(record)
    }
}

/// Opens `sled://<path>` endpoints, caching one database per path.
///
/// sled holds an exclusive lock on its directory, so reconnecting after a
/// failure must reuse the already-open database.
#[derive(Default)]
pub struct SledAdapter {
    dbs: Mutex<HashMap<String, sled::Db>>,
}

impl SledAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageAdapter for SledAdapter {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeStore>> {
        let path = endpoint.strip_prefix(SCHEME).unwrap_or(endpoint).to_string();
        let cached = self
            .dbs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&path)
            .cloned();
        let db = match cached {
            Some(db) => db,
            None => {
                let open_path = path.clone();
                let db = tokio::task::spawn_blocking(move || sled::open(open_path))
                    .await
                    .map_err(|e| Error::Internal(format!("sled open task failed: {}", e)))?
                    .map_err(|e| Error::ConnectionFailed(format!("{}: {}", path, e)))?;
                self.dbs
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(path)
                    .or_insert(db)
                    .clone()
            }
        };
        Ok(Arc::new(SledStore::from_db(db)?))
    }
}
