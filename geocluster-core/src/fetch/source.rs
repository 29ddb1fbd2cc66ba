//! Paginated upstream source
//!
//! `PageSource` is the seam between fetch workers and the network. The
//! HTTP implementation uses reqwest; tests plug in scripted sources.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::record::{PagePayload, RawCity};
use crate::error::{GeoClusterError, Result};

/// Classified answer to a page request
#[derive(Debug, Clone)]
pub enum PageResponse {
    /// Upstream asked us to slow down
    Throttled,
    /// Any other non-success status
    Failed { status: u16 },
    /// Success; an empty list means the page has no data
    Items(Vec<RawCity>),
}

/// Source of paginated city items
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `limit` items starting at `offset`.
    ///
    /// `Err` is a transport or decoding failure; statuses are classified
    /// into `PageResponse`.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<PageResponse>;

    /// Human-readable request target, for logs
    fn describe(&self, offset: usize, limit: usize) -> String {
        format!("offset={} limit={}", offset, limit)
    }
}

/// Configuration for the HTTP source
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Endpoint, without query string
    pub base_url: String,
    /// Extra headers sent with every request (API key, host)
    pub headers: HashMap<String, String>,
    /// Sort specification passed as `sort=`
    pub sort: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://wft-geo-db.p.rapidapi.com/v1/geo/cities".into(),
            headers: HashMap::new(),
            sort: "+countryCode".into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed page source
pub struct HttpPageSource {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpPageSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GeoClusterError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    fn page_url(&self, offset: usize, limit: usize) -> String {
        format!(
            "{}?offset={}&limit={}&sort={}",
            self.config.base_url,
            offset,
            limit,
            self.config.sort.replace('+', "%2B")
        )
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<PageResponse> {
        let url = self.page_url(offset, limit);

        let mut request = self.client.get(&url);
        for (name, value) in &self.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.send().await.map_err(|e| GeoClusterError::RequestFailed {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PageResponse::Throttled);
        }
        if !status.is_success() {
            return Ok(PageResponse::Failed {
                status: status.as_u16(),
            });
        }

        let body: Bytes = resp.bytes().await.map_err(|e| GeoClusterError::RequestFailed {
            url: url.clone(),
            reason: format!("failed to read body: {}", e),
        })?;

        let payload = decode_page(&body).map_err(|reason| GeoClusterError::InvalidPayload {
            url: url.clone(),
            reason,
        })?;

        debug!("Fetched {} items from {}", payload.len(), url);
        Ok(PageResponse::Items(payload))
    }

    fn describe(&self, offset: usize, limit: usize) -> String {
        self.page_url(offset, limit)
    }
}

/// Decode a page body; a missing `data` field reads as an empty page
pub fn decode_page(body: &[u8]) -> std::result::Result<Vec<RawCity>, String> {
    let payload: PagePayload = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    Ok(payload.data.unwrap_or_default())
}
