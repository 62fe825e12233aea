//! convkit core - idempotent fetch-and-export pipeline for model catalogs.
//!
//! For every model in a [`Catalog`] the pipeline makes sure the source weights
//! are cached locally, then exports them to an alternate format with an
//! [`ExportBackend`] and installs the result at a canonical path. All
//! decisions are based on what exists on disk, so a run can be repeated at
//! any time.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use convkit_core::{Catalog, ConversionOrchestrator, HttpFetcher, PipelineConfig, UltralyticsBackend};
//!
//! #[tokio::main]
//! async fn main() -> convkit_core::Result<()> {
//!     let config = PipelineConfig::new("/srv/convert", Catalog::default());
//!     let backend = UltralyticsBackend::new(&config.work_dir);
//!     backend.ensure_environment().await?;
//!
//!     let orchestrator = ConversionOrchestrator::new(
//!         config,
//!         Arc::new(HttpFetcher::new()?),
//!         Arc::new(backend),
//!     );
//!     let summary = orchestrator.run().await?;
//!     println!("{} installed, {} failed", summary.installed(), summary.failed());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod network;
pub mod pipeline;
pub mod publish;
pub mod store;
pub mod sweeper;

pub use catalog::{ArtifactDescriptor, Catalog, CatalogFile, ModelEntry, Stage, StageKind};
pub use config::{PipelineConfig, SweepConfig};
pub use error::{ConvkitError, Result};
pub use export::{ExportBackend, ExportResult, ModelHandle, UltralyticsBackend};
pub use network::HttpFetcher;
pub use pipeline::{
    catalog_status, ConversionOrchestrator, ConversionOutcome, FetchOutcome, ModelStatus,
    RunSummary, StageError, WeightsSource,
};
pub use publish::PublishReport;
pub use store::ArtifactStore;
pub use sweeper::{StaleFileSweeper, SweepReport};
