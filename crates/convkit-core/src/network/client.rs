//! Thin wrapper around `reqwest::Client` with convkit defaults.

use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use crate::config::NetworkConfig;
use crate::{ConvkitError, Result};

/// HTTP client used for weight downloads.
///
/// Only the connect phase has a timeout: weight files can be hundreds of
/// megabytes and a total-request timeout would cut off slow but healthy
/// transfers.
pub struct HttpClient {
    client: Client,
    connect_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| ConvkitError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            client,
            connect_timeout: timeout,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Make a GET request. Non-2xx responses are returned, not turned into errors.
    pub async fn get(&self, url: &str) -> Result<Response> {
        debug!(
            "GET {} ({}, connect timeout {:?})",
            url,
            extract_domain(url),
            self.connect_timeout
        );
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| ConvkitError::Network {
                message: format!("GET {} failed: {}", url, e),
                source: Some(e),
            })
    }

    /// Any 2xx status counts as success.
    pub fn is_success(status: StatusCode) -> bool {
        status.is_success()
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://github.com/ultralytics/assets/releases/download/v8.3.0/yolo11n.pt"),
            "github.com"
        );
        assert_eq!(extract_domain("invalid-url"), "unknown");
    }

    #[test]
    fn test_success_statuses() {
        assert!(HttpClient::is_success(StatusCode::OK));
        assert!(HttpClient::is_success(StatusCode::NO_CONTENT));
        assert!(!HttpClient::is_success(StatusCode::NOT_FOUND));
        assert!(!HttpClient::is_success(StatusCode::FOUND));
    }

    #[tokio::test]
    async fn test_client_with_timeout() {
        let client = HttpClient::with_connect_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(client.connect_timeout(), Duration::from_secs(5));
    }
}
