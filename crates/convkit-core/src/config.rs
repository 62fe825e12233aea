//! Centralized configuration for convkit.
//!
//! Compile-time defaults live on unit structs with associated constants.
//! [`PipelineConfig`] is the immutable runtime configuration handed to the
//! orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::Catalog;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const USER_AGENT: &'static str = "convkit/0.1";
}

/// Directory and file names under the working directory.
pub struct PathsConfig;

impl PathsConfig {
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const DATA_DIR_NAME: &'static str = ".convkit";
    pub const SCRIPTS_DIR_NAME: &'static str = "scripts";
    pub const EXPORT_VENV_DIR_NAME: &'static str = "export-venv";
    pub const STAGING_SUFFIX: &'static str = ".incoming";
    pub const RETIRED_SUFFIX: &'static str = ".retired";
}

/// The catalog used when no catalog file is given.
pub struct DefaultCatalog;

impl DefaultCatalog {
    pub const SOURCE_BASE_URL: &'static str =
        "https://github.com/ultralytics/assets/releases/download/v8.3.0";
    pub const MODEL_IDS: &'static [&'static str] =
        &["yolo11n", "yolo11s", "yoloe-11s-seg", "yoloe-11m-seg"];
    pub const WEIGHTS_EXT: &'static str = "pt";
    pub const SIBLING_EXTS: &'static [&'static str] = &["onnx", "pb"];
    pub const EXPORT_FORMAT: &'static str = "tfjs";
    pub const EXPORT_SUFFIX: &'static str = "web_model";
    pub const MANIFEST_NAME: &'static str = "model.json";
    pub const BINARY_SUFFIX: &'static str = ".bin";
}

/// Byproducts left behind by int8 calibration during export.
pub struct SweepDefaults;

impl SweepDefaults {
    pub const PREFIX: &'static str = "calibration_image_sample_data";
    pub const SUFFIX: &'static str = ".npy";
}

/// Which files the stale-file sweeper removes, and where it looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub prefix: String,
    pub suffix: String,
    pub dirs: Vec<PathBuf>,
}

impl SweepConfig {
    /// Default pattern, searched in the working directory and models directory.
    pub fn for_dirs(dirs: Vec<PathBuf>) -> Self {
        Self {
            prefix: SweepDefaults::PREFIX.to_string(),
            suffix: SweepDefaults::SUFFIX.to_string(),
            dirs,
        }
    }
}

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory the export engine runs in. Calibration byproducts land here.
    pub work_dir: PathBuf,
    /// Directory holding every model's artifacts.
    pub models_dir: PathBuf,
    pub catalog: Catalog,
    pub sweep: SweepConfig,
    /// When set, installed export directories are copied to `<publish_dir>/<id>/`.
    pub publish_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Configuration rooted at `work_dir` with `<work_dir>/models` as the models directory.
    pub fn new(work_dir: impl Into<PathBuf>, catalog: Catalog) -> Self {
        let work_dir = work_dir.into();
        let models_dir = work_dir.join(PathsConfig::MODELS_DIR_NAME);
        Self::with_models_dir(work_dir, models_dir, catalog)
    }

    pub fn with_models_dir(
        work_dir: impl Into<PathBuf>,
        models_dir: impl Into<PathBuf>,
        catalog: Catalog,
    ) -> Self {
        let work_dir = work_dir.into();
        let models_dir = models_dir.into();
        let sweep = SweepConfig::for_dirs(vec![work_dir.clone(), models_dir.clone()]);
        Self {
            work_dir,
            models_dir,
            catalog,
            sweep,
            publish_dir: None,
        }
    }

    pub fn with_publish_dir(mut self, publish_dir: impl Into<PathBuf>) -> Self {
        self.publish_dir = Some(publish_dir.into());
        self
    }

    pub fn with_sweep(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    /// `<work_dir>/.convkit`, home of the export backend's scripts and venv.
    pub fn data_dir(&self) -> PathBuf {
        data_dir(&self.work_dir)
    }
}

/// `<work_dir>/.convkit`.
pub fn data_dir(work_dir: &Path) -> PathBuf {
    work_dir.join(PathsConfig::DATA_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = PipelineConfig::new("/srv/convert", Catalog::default());
        assert_eq!(config.models_dir, PathBuf::from("/srv/convert/models"));
        assert_eq!(
            config.sweep.dirs,
            vec![
                PathBuf::from("/srv/convert"),
                PathBuf::from("/srv/convert/models")
            ]
        );
        assert!(config.publish_dir.is_none());
        assert!(config.data_dir().ends_with(".convkit"));
    }

    #[test]
    fn test_default_catalog_has_two_siblings() {
        assert_eq!(DefaultCatalog::SIBLING_EXTS.len(), 2);
        assert!(NetworkConfig::CONNECT_TIMEOUT > Duration::ZERO);
    }
}
