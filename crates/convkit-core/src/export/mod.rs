//! Model export capability.
//!
//! The pipeline only needs two things from an export engine: load a weights
//! file into a model handle, and export that handle to a named format. Both
//! are expressed as traits so the orchestrator can run against the real
//! Ultralytics exporter or an in-process fake.

mod scripts;
mod subprocess;
pub mod ultralytics;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use subprocess::ScriptLine;
pub use ultralytics::UltralyticsBackend;

use crate::Result;

/// What an export reported back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportResult {
    /// Directory the engine actually wrote to. May differ from the requested name.
    pub save_dir: Option<PathBuf>,
}

/// An export engine.
#[async_trait]
pub trait ExportBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `load` can be called without further setup.
    fn is_ready(&self) -> bool;

    /// Prepare whatever the engine needs (interpreter, packages, scripts).
    async fn ensure_environment(&self) -> Result<()>;

    /// Load a weights file into a handle that can be exported.
    async fn load(&self, weights: &Path) -> Result<Box<dyn ModelHandle>>;
}

/// A loaded model.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// Export to `format`, using `name` as the output name hint.
    async fn export(&self, format: &str, name: &str) -> Result<ExportResult>;
}
