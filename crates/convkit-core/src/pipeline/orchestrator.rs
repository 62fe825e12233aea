//! Conversion orchestrator.
//!
//! A run has three phases, always in this order and always sequential:
//!
//! 1. fetch: every catalog entry gets its weights if they are not on disk
//! 2. sweep: stale calibration byproducts are removed once
//! 3. convert: each entry is evaluated stage by stage and exported if needed
//!
//! Per-model failures are recorded in the [`RunSummary`] and never stop the
//! loop. The only error a run returns is failing to create the models
//! directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::fetch::{ensure_fetched, WeightsSource};
use super::types::{
    ConversionOutcome, FetchReport, ModelReport, ModelStatus, RunSummary, StageError, StageStatus,
};
use crate::catalog::{ArtifactDescriptor, Catalog, ModelEntry};
use crate::config::PipelineConfig;
use crate::export::{ExportBackend, ExportResult};
use crate::publish::publish_exports;
use crate::store::ArtifactStore;
use crate::sweeper::StaleFileSweeper;
use crate::Result;

pub struct ConversionOrchestrator {
    config: PipelineConfig,
    store: ArtifactStore,
    source: Arc<dyn WeightsSource>,
    backend: Arc<dyn ExportBackend>,
}

impl ConversionOrchestrator {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn WeightsSource>,
        backend: Arc<dyn ExportBackend>,
    ) -> Self {
        let store = ArtifactStore::new(&config.models_dir);
        Self {
            config,
            store,
            source,
            backend,
        }
    }

    /// Run the whole pipeline over the catalog.
    pub async fn run(&self) -> Result<RunSummary> {
        self.store.ensure_root()?;
        info!(
            "Processing {} models in {}",
            self.config.catalog.len(),
            self.store.root().display()
        );

        let fetches = self.fetch_all().await;
        let sweep = StaleFileSweeper::new(&self.config.sweep).sweep();

        let mut models = Vec::with_capacity(self.config.catalog.len());
        for entry in self.config.catalog.iter() {
            let outcome = self.convert_model(entry).await;
            models.push(ModelReport {
                model_id: entry.id.clone(),
                outcome,
            });
        }

        let publish = match &self.config.publish_dir {
            Some(dir) => match publish_exports(&self.store, &self.config.catalog, dir) {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!("Publishing to {} failed: {}", dir.display(), e);
                    None
                }
            },
            None => None,
        };

        let summary = RunSummary {
            fetches,
            sweep,
            models,
            publish,
        };
        info!(
            "Run finished: {} complete, {} installed, {} failed",
            summary.complete(),
            summary.installed(),
            summary.failed()
        );
        Ok(summary)
    }

    /// Fetch phase: make sure every model's weights are cached.
    pub async fn fetch_all(&self) -> Vec<FetchReport> {
        let mut reports = Vec::with_capacity(self.config.catalog.len());
        for entry in self.config.catalog.iter() {
            let dest = entry.weights_path(self.store.root());
            let outcome =
                ensure_fetched(self.source.as_ref(), &entry.id, entry.source_url.as_deref(), &dest)
                    .await;
            reports.push(FetchReport {
                model_id: entry.id.clone(),
                outcome,
            });
        }
        reports
    }

    /// Stage-by-stage view of every model, without doing any work.
    pub fn status(&self) -> Vec<ModelStatus> {
        catalog_status(&self.store, &self.config.catalog)
    }

    pub fn evaluate(&self, entry: &ModelEntry) -> ModelStatus {
        evaluate_entry(&self.store, entry)
    }

    /// Decide and perform the work for one model.
    pub async fn convert_model(&self, entry: &ModelEntry) -> ConversionOutcome {
        let status = self.evaluate(entry);
        if status.is_complete() {
            info!("Skipping {}: all artifacts already exist", entry.id);
            return ConversionOutcome::Complete;
        }
        for missing in status.missing() {
            debug!(
                "{}: {} missing at {}",
                entry.id,
                missing.stage.kind,
                missing.stage.descriptor.path().display()
            );
        }

        let weights = entry.weights_path(self.store.root());
        if !ArtifactStore::check(&ArtifactDescriptor::File {
            path: weights.clone(),
        }) {
            warn!(
                "Skipping {}: {} does not exist or is empty",
                entry.id,
                weights.display()
            );
            return ConversionOutcome::SourceMissing { path: weights };
        }

        info!(
            "Exporting {} to {} with {}...",
            weights.display(),
            entry.export.format,
            self.backend.name()
        );
        let result = match self.export(entry, &weights).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} export failed for {}: {}", entry.export.format, entry.id, e);
                return ConversionOutcome::ExportFailed {
                    error: StageError::ExportRaised {
                        cause: e.to_string(),
                    },
                };
            }
        };

        let save_dir = match self.locate_output(result) {
            Ok(dir) => dir,
            Err(reported) => {
                warn!(
                    "{} export directory not found for {}. Conversion failed or not supported on this platform.",
                    entry.export.format, entry.id
                );
                return ConversionOutcome::ExportFailed {
                    error: StageError::ExportDirectoryMissing { reported },
                };
            }
        };
        log_export_contents(entry, &save_dir);

        let canonical = entry.export_dir(self.store.root());
        match self.store.atomic_replace(&save_dir, &canonical) {
            Ok(_) => {
                info!("Exported model moved to {}", canonical.display());
                ConversionOutcome::Installed {
                    export_dir: canonical,
                }
            }
            Err(e) => {
                warn!("Could not install export for {}: {}", entry.id, e);
                ConversionOutcome::ExportFailed {
                    error: StageError::InstallFailed {
                        cause: e.to_string(),
                    },
                }
            }
        }
    }

    async fn export(&self, entry: &ModelEntry, weights: &Path) -> Result<ExportResult> {
        let model = self.backend.load(weights).await?;
        model
            .export(&entry.export.format, &entry.export_name())
            .await
    }

    /// The directory the export wrote to, or what it reported if that is unusable.
    fn locate_output(&self, result: ExportResult) -> std::result::Result<PathBuf, Option<PathBuf>> {
        match result.save_dir {
            Some(dir) => {
                let dir = if dir.is_relative() {
                    self.config.work_dir.join(dir)
                } else {
                    dir
                };
                if dir.is_dir() {
                    Ok(dir)
                } else {
                    Err(Some(dir))
                }
            }
            None => Err(None),
        }
    }
}

/// Stage-by-stage view of every model in `catalog`. Reads the filesystem only.
pub fn catalog_status(store: &ArtifactStore, catalog: &Catalog) -> Vec<ModelStatus> {
    catalog
        .iter()
        .map(|entry| evaluate_entry(store, entry))
        .collect()
}

fn evaluate_entry(store: &ArtifactStore, entry: &ModelEntry) -> ModelStatus {
    let stages = entry
        .stages(store.root())
        .into_iter()
        .map(|stage| {
            let present = ArtifactStore::check(&stage.descriptor);
            StageStatus { stage, present }
        })
        .collect();
    ModelStatus {
        model_id: entry.id.clone(),
        stages,
    }
}

/// Diagnostic listing of an export directory. Has no effect on the outcome.
fn log_export_contents(entry: &ModelEntry, dir: &Path) {
    let names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect(),
        Err(e) => {
            debug!("Could not list {}: {}", dir.display(), e);
            return;
        }
    };
    let binaries: Vec<&String> = names
        .iter()
        .filter(|n| n.ends_with(&entry.export.binary_suffix))
        .collect();
    debug!("Contents of {}: {:?}", dir.display(), names);
    debug!(
        "{} export for {}: {} exists: {}, {} files: {:?}",
        entry.export.format,
        entry.id,
        entry.export.manifest_name,
        names.contains(&entry.export.manifest_name),
        entry.export.binary_suffix,
        binaries
    );
}
