//! HTTP client for the astrology API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ChartKind, ChartRequest, DEFAULT_TIMEZONE};
use crate::Result;

/// Default astrology API base URL.
pub const DEFAULT_CHART_API_URL: &str = "https://json.freeastrologyapi.com";

/// Source of raw chart JSON.
#[async_trait]
pub trait ChartProvider: Send + Sync {
    /// Fetch one chart. `None` means the chart is unavailable.
    async fn fetch(&self, kind: ChartKind, request: &ChartRequest) -> Option<String>;
}

/// The `chart_api` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartApiSettings {
    /// Base URL; chart paths are appended.
    pub base_url: String,
    /// Value of the `x-api-key` header.
    pub api_key: Option<String>,
    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Timezone offset in hours used for new requests.
    pub timezone: f64,
}

impl Default for ChartApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CHART_API_URL.to_string(),
            api_key: None,
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            timezone: DEFAULT_TIMEZONE,
        }
    }
}

impl ChartApiSettings {
    /// Build an HTTP client with the configured timeouts.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .build()?;
        Ok(client)
    }
}

/// Astrology API client over an injected [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ChartApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ChartApiClient {
    /// Create a client.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Create a client from settings, building its own HTTP client.
    pub fn from_settings(settings: &ChartApiSettings) -> Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            settings.base_url.clone(),
            settings.api_key.clone().unwrap_or_default(),
        ))
    }

    fn url(&self, kind: ChartKind) -> String {
        format!("{}/{}", self.base_url, kind.path())
    }

    async fn post(&self, kind: ChartKind, request: &ChartRequest) -> Result<Option<String>> {
        let response = self
            .http
            .post(self.url(kind))
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::OK {
            Ok(Some(body))
        } else {
            warn!(chart = %kind, status = %status, body = %body, "chart API error");
            Ok(None)
        }
    }
}

#[async_trait]
impl ChartProvider for ChartApiClient {
    async fn fetch(&self, kind: ChartKind, request: &ChartRequest) -> Option<String> {
        debug!(chart = %kind, url = %self.url(kind), "fetching chart");
        match self.post(kind, request).await {
            Ok(body) => body,
            Err(e) => {
                warn!(chart = %kind, error = %e, "chart request failed");
                None
            }
        }
    }
}
