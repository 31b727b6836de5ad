//! Persisted reading history
//!
//! A peer data source for presentation consumers. The session core never
//! calls it.

use crate::config::HistorySection;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// One reading persisted by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedReading {
    pub recorded_at: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub threshold_value: Option<f64>,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("History endpoint returned HTTP {0}")]
    Status(u16),
    #[error("Invalid history URL: {0}")]
    InvalidUrl(String),
}

/// Source of persisted readings
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_history(&self) -> Result<Vec<PersistedReading>, HistoryError>;
}

/// `GET`s the configured endpoint
pub struct HttpHistoryClient {
    client: Client,
    url: Url,
}

impl HttpHistoryClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, HistoryError> {
        let url = Url::parse(url.trim())
            .map_err(|e| HistoryError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(HistoryError::InvalidUrl(format!(
                "unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    pub fn from_section(section: &HistorySection) -> Result<Self, HistoryError> {
        Self::new(&section.url, Duration::from_millis(section.timeout_ms))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HistorySource for HttpHistoryClient {
    async fn fetch_history(&self) -> Result<Vec<PersistedReading>, HistoryError> {
        debug!("Fetching reading history from {}", self.url);
        let response = self.client.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("History endpoint returned {}", status);
            return Err(HistoryError::Status(status.as_u16()));
        }

        // A null body means there is nothing persisted yet
        let readings: Option<Vec<PersistedReading>> = response.json().await?;
        Ok(readings.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unparseable_url() {
        let result = HttpHistoryClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(HistoryError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let result = HttpHistoryClient::new("mqtt://localhost:1883", Duration::from_secs(1));
        assert!(matches!(result, Err(HistoryError::InvalidUrl(_))));
    }

    #[test]
    fn test_from_section() {
        let section = HistorySection {
            url: "http://localhost:3000/api/sensor-readings".to_string(),
            timeout_ms: 2500,
        };

        let client = HttpHistoryClient::from_section(&section).unwrap();

        assert_eq!(client.url().path(), "/api/sensor-readings");
    }

    #[test]
    fn test_persisted_reading_allows_null_measurements() {
        let reading: PersistedReading = serde_json::from_str(
            r#"{"recorded_at": "2024-01-01T00:00:00Z", "temperature": null}"#,
        )
        .unwrap();

        assert_eq!(reading.temperature, None);
        assert_eq!(reading.threshold_value, None);
    }
}
