//! Paginated source API client
//!
//! Thin typed layer over the rate-limited HTTP client. The engine needs only
//! three operations: fetch one page of a collection, fetch a whole collection
//! (auto-paginating until an empty page), and fetch an irregularly-shaped
//! endpoint as raw JSON.

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::domain::errors::{SyncError, SyncResult};
use crate::infrastructure::config::SourceApiConfig;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};

pub struct SourceApiClient {
    http: HttpClient,
    base_url: Url,
    page_size: u32,
}

impl SourceApiClient {
    pub fn new(config: &SourceApiConfig) -> anyhow::Result<Self> {
        let http = HttpClient::new(HttpClientConfig::from(config))?;
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;
        Ok(Self { http, base_url, page_size: config.page_size.max(1) })
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> SyncResult<Url> {
        let mut url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(SyncError::network)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetch one page of a collection. `page` is 1-based.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        page: u32,
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<T>> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let mut full_query = query.to_vec();
        full_query.push(("page", page.to_string()));
        full_query.push(("per_page", self.page_size.to_string()));
        let url = self.endpoint(path, &full_query)?;

        let response = self
            .http
            .get_with_cancellation(url.as_str(), cancel)
            .await
            .map_err(|e| self.classify(e, cancel))?;
        let records = response.json::<Vec<T>>().await.map_err(SyncError::network)?;
        Ok(records)
    }

    /// Fetch a whole collection, auto-paginating until an empty page.
    pub async fn get_all_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> SyncResult<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.get_page::<T>(path, query, page, cancel).await?;
            let fetched = batch.len();
            all.extend(batch);
            // A short page means the next one would be empty
            if fetched < self.page_size as usize {
                break;
            }
            page += 1;
        }
        tracing::debug!("Fetched {} records from {} ({} pages)", all.len(), path, page);
        Ok(all)
    }

    /// Fetch an endpoint with an irregular shape as raw JSON.
    pub async fn get_raw(
        &self,
        path: &str,
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> SyncResult<serde_json::Value> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let url = self.endpoint(path, query)?;
        let response = self
            .http
            .get_with_cancellation(url.as_str(), cancel)
            .await
            .map_err(|e| self.classify(e, cancel))?;
        let value = response.json::<serde_json::Value>().await.map_err(SyncError::network)?;
        Ok(value)
    }

    fn classify(&self, err: anyhow::Error, cancel: &CancellationToken) -> SyncError {
        if cancel.is_cancelled() { SyncError::Cancelled } else { SyncError::network(err) }
    }
}
