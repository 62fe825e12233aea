//! Removal of stale calibration byproducts.
//!
//! Int8 calibration during export drops sample files into whatever directory
//! the exporter ran in. They are deleted once per run, before any per-model
//! work. A file that cannot be removed is logged and skipped.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::SweepConfig;

/// A file the sweeper could not delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<SweepFailure>,
}

pub struct StaleFileSweeper<'a> {
    config: &'a SweepConfig,
}

impl<'a> StaleFileSweeper<'a> {
    pub fn new(config: &'a SweepConfig) -> Self {
        Self { config }
    }

    pub fn matches(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.config.prefix) && file_name.ends_with(&self.config.suffix)
    }

    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut visited = HashSet::new();

        for dir in &self.config.dirs {
            let key = dir.canonicalize().unwrap_or_else(|_| dir.clone());
            if !visited.insert(key) {
                continue;
            }

            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping sweep of {}: {}", dir.display(), e);
                    continue;
                }
            };

            for entry in entries.filter_map(|e| e.ok()) {
                let name = entry.file_name();
                if !self.matches(&name.to_string_lossy()) {
                    continue;
                }
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }

                let path = entry.path();
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!("Removed leftover calibration file: {}", path.display());
                        report.removed.push(path);
                    }
                    Err(e) => {
                        warn!("Could not remove {}: {}", path.display(), e);
                        report.failed.push(SweepFailure {
                            path,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }
}
