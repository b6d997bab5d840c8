//! HTTP client for remote `termkv-node` servers

use super::{ApplicationRecord, NodeStore, StorageAdapter};
use crate::common::{Error, Result};
use crate::node::http::{TermBody, UpdateBody};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Opens handles on `http://` node endpoints. Connecting probes `/health`.
pub struct HttpAdapter {
    client: Client,
}

impl HttpAdapter {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StorageAdapter for HttpAdapter {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn NodeStore>> {
        let store = HttpNodeStore {
            client: self.client.clone(),
            base: endpoint.trim_end_matches('/').to_string(),
        };
        let resp = store.client.get(store.url("/health")).send().await?;
        check(resp).await?;
        Ok(Arc::new(store))
    }
}

/// Node store reached over HTTP
pub struct HttpNodeStore {
    client: Client,
    base: String,
}

impl HttpNodeStore {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

/// Map non-2xx responses onto the error taxonomy.
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound(body)),
        StatusCode::SERVICE_UNAVAILABLE => Err(Error::ConnectionFailed(body)),
        _ => Err(Error::Http(format!("{}: {}", status, body))),
    }
}

#[async_trait]
impl NodeStore for HttpNodeStore {
    async fn get_term(&self) -> Result<u64> {
        let resp = self.client.get(self.url("/term")).send().await?;
        let body: TermBody = check(resp).await?.json().await?;
        Ok(body.term)
    }

    async fn set_term(&self, term: u64) -> Result<()> {
        let resp = self
            .client
            .put(self.url("/term"))
            .json(&TermBody { term })
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<ApplicationRecord>> {
        let resp = self.client.get(self.url("/records")).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn delete_all_records(&self) -> Result<()> {
        let resp = self.client.delete(self.url("/records")).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn insert_records(&self, records: Vec<ApplicationRecord>) -> Result<()> {
        let resp = self
            .client
            .post(self.url("/records/bulk"))
            .json(&records)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn insert_record(&self, record: ApplicationRecord) -> Result<ApplicationRecord> {
        let resp = self
            .client
            .post(self.url("/records"))
            .json(&record)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn update_record(
        &self,
        id: Uuid,
        payload: serde_json::Value,
    ) -> Result<ApplicationRecord> {
        let resp = self
            .client
            .put(self.url(&format!("/records/{}", id)))
            .json(&UpdateBody { payload })
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}
