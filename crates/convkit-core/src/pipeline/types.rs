//! Outcome types for a pipeline run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::Stage;
use crate::publish::PublishReport;
use crate::sweeper::SweepReport;

/// Why a stage of one model could not be produced.
///
/// These are recovered at the per-model boundary: they end up in the run
/// summary and the log, never abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum StageError {
    /// No URL registered, or the download failed.
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    #[error("source weights missing or empty at {}", path.display())]
    SourceMissingLocally { path: PathBuf },

    /// Loading or exporting raised an error.
    #[error("export failed: {cause}")]
    ExportRaised { cause: String },

    /// Export reported success but its output directory is not on disk.
    #[error("export directory not found")]
    ExportDirectoryMissing { reported: Option<PathBuf> },

    /// The export was produced but could not be moved into place.
    #[error("failed to install export: {cause}")]
    InstallFailed { cause: String },
}

/// Result of making sure a model's weights are on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
    /// A file already existed at the weights path.
    Present,
    Downloaded { bytes: u64 },
    Failed { error: StageError },
}

/// Terminal state of one model after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// Every stage was already satisfied; nothing was done.
    Complete,
    SourceMissing { path: PathBuf },
    ExportFailed { error: StageError },
    Installed { export_dir: PathBuf },
}

impl ConversionOutcome {
    /// The failure behind this outcome, if any.
    pub fn error(&self) -> Option<StageError> {
        match self {
            ConversionOutcome::SourceMissing { path } => {
                Some(StageError::SourceMissingLocally { path: path.clone() })
            }
            ConversionOutcome::ExportFailed { error } => Some(error.clone()),
            ConversionOutcome::Complete | ConversionOutcome::Installed { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversionOutcome::Complete => "complete",
            ConversionOutcome::SourceMissing { .. } => "source-missing",
            ConversionOutcome::ExportFailed { .. } => "export-failed",
            ConversionOutcome::Installed { .. } => "installed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub model_id: String,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelReport {
    pub model_id: String,
    pub outcome: ConversionOutcome,
}

/// One stage and whether it is currently satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStatus {
    #[serde(flatten)]
    pub stage: Stage,
    pub present: bool,
}

/// Stage-by-stage view of one model, as used for the skip decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub stages: Vec<StageStatus>,
}

impl ModelStatus {
    /// All stages satisfied. Partial sets never count.
    pub fn is_complete(&self) -> bool {
        !self.stages.is_empty() && self.stages.iter().all(|s| s.present)
    }

    pub fn missing(&self) -> impl Iterator<Item = &StageStatus> {
        self.stages.iter().filter(|s| !s.present)
    }
}

/// Everything a run did, in catalog order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub fetches: Vec<FetchReport>,
    pub sweep: SweepReport,
    pub models: Vec<ModelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishReport>,
}

impl RunSummary {
    pub fn downloaded(&self) -> usize {
        self.fetches
            .iter()
            .filter(|f| matches!(f.outcome, FetchOutcome::Downloaded { .. }))
            .count()
    }

    pub fn complete(&self) -> usize {
        self.count(|o| matches!(o, ConversionOutcome::Complete))
    }

    pub fn installed(&self) -> usize {
        self.count(|o| matches!(o, ConversionOutcome::Installed { .. }))
    }

    /// Models that ended in source-missing or export-failed.
    pub fn failed(&self) -> usize {
        self.count(|o| o.error().is_some())
    }

    pub fn outcome(&self, model_id: &str) -> Option<&ConversionOutcome> {
        self.models
            .iter()
            .find(|m| m.model_id == model_id)
            .map(|m| &m.outcome)
    }

    fn count(&self, pred: impl Fn(&ConversionOutcome) -> bool) -> usize {
        self.models.iter().filter(|m| pred(&m.outcome)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            models: vec![
                ModelReport {
                    model_id: "a".into(),
                    outcome: ConversionOutcome::Complete,
                },
                ModelReport {
                    model_id: "b".into(),
                    outcome: ConversionOutcome::SourceMissing {
                        path: "/m/b.pt".into(),
                    },
                },
                ModelReport {
                    model_id: "c".into(),
                    outcome: ConversionOutcome::Installed {
                        export_dir: "/m/c_web_model".into(),
                    },
                },
            ],
            ..RunSummary::default()
        };
        assert_eq!(summary.complete(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.installed(), 1);
        assert_eq!(summary.outcome("b").map(|o| o.label()), Some("source-missing"));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = ConversionOutcome::ExportFailed {
            error: StageError::ExportDirectoryMissing { reported: None },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "export_failed");
        assert_eq!(json["error"]["error"], "export_directory_missing");
    }

    #[test]
    fn test_stage_error_messages() {
        let err = StageError::SourceUnavailable {
            reason: "no source registered".into(),
        };
        assert_eq!(err.to_string(), "source unavailable: no source registered");
        assert_eq!(
            StageError::ExportDirectoryMissing { reported: None }.to_string(),
            "export directory not found"
        );
    }
}
