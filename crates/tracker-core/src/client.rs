//! HTTP client for the remote tracking service.
//!
//! The service exposes a single endpoint taking an `action` query parameter.
//! Position batches are requested with `action=getPositions`:
//!
//! ```text
//! {base}?action=getPositions&key=K&num=N&from_ts=T&format=json
//! ```
//!
//! `from_ts` is left out when no starting timestamp is known, and `num` is
//! left out when asking for the latest fix only.
//!
//! # Example
//!
//! ```no_run
//! use tracker_core::{DataSource, TrackingClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = TrackingClient::new("http://www.instamapper.com/api", "API-KEY")?;
//!
//! let samples = client.fetch_positions(1_314_198_000, 100).await?;
//! println!("{} new fixes", samples.len());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use tracker_types::PositionSample;

use crate::error::{SourceError, SourceResult};
use crate::source::{DataSource, PositionBatch};

/// Request timeout used by [`TrackingClient::new`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the tracking service's position API.
#[derive(Debug, Clone)]
pub struct TrackingClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TrackingClient {
    /// Create a client with the default request timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Endpoint of the service (e.g. "http://www.instamapper.com/api")
    /// * `api_key` - Key identifying the tracked devices
    pub fn new(base_url: &str, api_key: &str) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(SourceError::Request)?;

        Self::with_client(base_url, api_key, client)
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(base_url: &str, api_key: &str, client: Client) -> SourceResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SourceError::InvalidUrl(format!(
                "URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL requesting up to `limit` fixes from `since` onwards.
    pub fn positions_url(&self, since: i64, limit: u32) -> SourceResult<Url> {
        let num = limit.to_string();
        let from_ts = since.to_string();

        let mut params = vec![
            ("action", "getPositions"),
            ("key", self.api_key.as_str()),
            ("num", num.as_str()),
        ];
        if since != 0 {
            params.push(("from_ts", from_ts.as_str()));
        }
        params.push(("format", "json"));

        self.build_url(&params)
    }

    /// URL requesting the latest fix of each device.
    pub fn most_recent_url(&self) -> SourceResult<Url> {
        self.build_url(&[
            ("action", "getPositions"),
            ("key", self.api_key.as_str()),
            ("format", "json"),
        ])
    }

    fn build_url(&self, params: &[(&str, &str)]) -> SourceResult<Url> {
        Url::parse_with_params(&self.base_url, params)
            .map_err(|e| SourceError::InvalidUrl(format!("{}: {}", self.base_url, e)))
    }

    async fn get_batch(&self, url: Url) -> SourceResult<Vec<PositionSample>> {
        // Keep the API key out of logs and errors
        let shown = self.base_url.clone();
        debug!("Requesting positions from {}", shown);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::NotReachable {
                url: shown,
                source: e.without_url(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .ok()
                .filter(|body| !body.trim().is_empty())
                .unwrap_or_else(|| status.to_string());

            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|e| e.without_url())?;
        let samples = parse_batch(&body)?;
        debug!("Tracking service returned {} positions", samples.len());

        Ok(samples)
    }
}

#[async_trait]
impl DataSource for TrackingClient {
    async fn fetch_positions(&self, since: i64, limit: u32) -> SourceResult<Vec<PositionSample>> {
        let url = self.positions_url(since, limit)?;
        self.get_batch(url).await
    }

    async fn most_recent(&self) -> SourceResult<Vec<PositionSample>> {
        let url = self.most_recent_url()?;
        self.get_batch(url).await
    }
}

/// Decode a position batch response body.
pub fn parse_batch(body: &str) -> SourceResult<Vec<PositionSample>> {
    let batch: PositionBatch = serde_json::from_str(body)?;
    Ok(batch.positions)
}
