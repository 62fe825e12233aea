//! Streaming weight downloads.
//!
//! The body is written to `<dest>.part` and renamed onto `dest` only after
//! the stream finished and the file was flushed, so `dest` never exists in a
//! truncated form.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::IoResultExt;
use crate::network::client::HttpClient;
use crate::pipeline::WeightsSource;
use crate::{ConvkitError, Result};

/// How often a long download logs how far it got.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Fetches weights over HTTP.
pub struct HttpFetcher {
    http: Arc<HttpClient>,
    temp_suffix: String,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(Arc::new(HttpClient::new()?)))
    }

    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
        }
    }

    /// Path the body is streamed to before the final rename.
    pub fn temp_path(&self, destination: &Path) -> PathBuf {
        PathBuf::from(format!("{}{}", destination.display(), self.temp_suffix))
    }

    /// Download `url` to `destination`, returning the number of bytes written.
    pub async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).with_path(parent)?;
        }

        let temp_path = self.temp_path(destination);
        match self.do_download(url, &temp_path).await {
            Ok(bytes) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    ConvkitError::io("moving download to final destination", destination, e)
                })?;
                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    async fn do_download(&self, url: &str, temp_path: &Path) -> Result<u64> {
        let response = self.http.get(url).await?;
        let status = response.status();

        if !HttpClient::is_success(status) {
            return Err(ConvkitError::DownloadFailed {
                url: url.to_string(),
                message: format!("Download failed with status {}", status),
            });
        }

        let total_bytes = response.content_length();
        let mut file = std::fs::File::create(temp_path)
            .map_err(|e| ConvkitError::io("creating temp file", temp_path, e))?;

        let mut bytes_downloaded: u64 = 0;
        let mut last_log = Instant::now();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| ConvkitError::Network {
                message: format!("Error reading download stream: {}", e),
                source: Some(e),
            })?;

            file.write_all(&chunk)
                .map_err(|e| ConvkitError::io("writing temp file", temp_path, e))?;
            bytes_downloaded += chunk.len() as u64;

            if last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                match total_bytes {
                    Some(total) if total > 0 => debug!(
                        "{}: {}/{} bytes ({:.1}%)",
                        url,
                        bytes_downloaded,
                        total,
                        bytes_downloaded as f64 / total as f64 * 100.0
                    ),
                    _ => debug!("{}: {} bytes", url, bytes_downloaded),
                }
                last_log = Instant::now();
            }
        }

        file.flush()
            .map_err(|e| ConvkitError::io("flushing temp file", temp_path, e))?;
        file.sync_all()
            .map_err(|e| ConvkitError::io("syncing temp file", temp_path, e))?;

        Ok(bytes_downloaded)
    }
}

#[async_trait]
impl WeightsSource for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        self.download(url, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tempfile::TempDir;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_download_writes_body_byte_for_byte() {
        let body: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        let expected = body.clone();
        let base = serve(Router::new().route(
            "/m1.pt",
            get(move || {
                let body = body.clone();
                async move { body }
            }),
        ))
        .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("models/m1.pt");
        let fetcher = HttpFetcher::new().unwrap();

        let bytes = fetcher.download(&format!("{base}/m1.pt"), &dest).await.unwrap();

        assert_eq!(bytes, expected.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), expected);
        assert!(!fetcher.temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_error_status_leaves_no_file() {
        let base = serve(Router::new().route(
            "/gone.pt",
            get(|| async { (StatusCode::NOT_FOUND, "missing") }),
        ))
        .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("gone.pt");
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher
            .download(&format!("{base}/gone.pt"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvkitError::DownloadFailed { .. }));
        assert!(err.to_string().contains("404"));
        assert!(!dest.exists());
        assert!(!fetcher.temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_download_connection_refused_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("m.pt");
        let fetcher = HttpFetcher::new().unwrap();

        let err = fetcher
            .download(&format!("http://{addr}/m.pt"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvkitError::Network { .. }));
        assert!(!dest.exists());
    }
}
