//! Making sure source weights are cached locally.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use super::types::{FetchOutcome, StageError};
use crate::Result;

/// Where missing weights come from.
#[async_trait]
pub trait WeightsSource: Send + Sync {
    /// Write the resource at `url` to `destination`; return the byte count.
    ///
    /// Implementations must not leave a partial file at `destination` on error.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

/// Ensure `dest_path` holds the weights for `model_id`.
///
/// An existing file is trusted as-is, whatever its size. Only a missing file
/// triggers a download, and only when `url` is registered.
pub async fn ensure_fetched(
    source: &dyn WeightsSource,
    model_id: &str,
    url: Option<&str>,
    dest_path: &Path,
) -> FetchOutcome {
    if dest_path.exists() {
        info!("Using existing {} weights at {}", model_id, dest_path.display());
        return FetchOutcome::Present;
    }

    let Some(url) = url else {
        warn!(
            "No download URL for {}; place {} manually",
            model_id,
            dest_path.display()
        );
        return FetchOutcome::Failed {
            error: StageError::SourceUnavailable {
                reason: "no source registered".to_string(),
            },
        };
    };

    info!("Downloading {} weights from {}", model_id, url);
    match source.fetch(url, dest_path).await {
        Ok(bytes) => FetchOutcome::Downloaded { bytes },
        Err(e) => {
            warn!("Failed to download {}: {}", model_id, e);
            FetchOutcome::Failed {
                error: StageError::SourceUnavailable {
                    reason: e.to_string(),
                },
            }
        }
    }
}
