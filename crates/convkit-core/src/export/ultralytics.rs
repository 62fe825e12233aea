//! Ultralytics export backend.
//!
//! Runs the embedded export script with a Python interpreter that has
//! `ultralytics` installed. By default that interpreter lives in a managed
//! virtual environment under `<work_dir>/.convkit/export-venv`; a caller can
//! supply its own interpreter instead. The script runs with `work_dir` as its
//! current directory, which is where Ultralytics drops calibration files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::scripts;
use super::subprocess::run_script;
use super::{ExportBackend, ExportResult, ModelHandle};
use crate::config::{self, PathsConfig};
use crate::{ConvkitError, Result};

/// Get the path to the Python executable within a virtual environment.
fn venv_python(venv: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        venv.join("Scripts").join("python.exe")
    }
    #[cfg(not(windows))]
    {
        venv.join("bin").join("python")
    }
}

pub struct UltralyticsBackend {
    work_dir: PathBuf,
    base_dir: PathBuf,
    /// Caller-supplied interpreter; disables the managed venv.
    interpreter: Option<PathBuf>,
}

impl UltralyticsBackend {
    pub fn new(work_dir: &Path) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            base_dir: config::data_dir(work_dir),
            interpreter: None,
        }
    }

    /// Use `python` instead of the managed virtual environment.
    pub fn with_interpreter(mut self, python: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(python.into());
        self
    }

    fn scripts_dir(&self) -> PathBuf {
        self.base_dir.join(PathsConfig::SCRIPTS_DIR_NAME)
    }

    fn venv_dir(&self) -> PathBuf {
        self.base_dir.join(PathsConfig::EXPORT_VENV_DIR_NAME)
    }

    /// Interpreter the export script runs under.
    pub fn python(&self) -> PathBuf {
        self.interpreter
            .clone()
            .unwrap_or_else(|| venv_python(&self.venv_dir()))
    }

    pub fn export_script(&self) -> PathBuf {
        scripts::export_script(&self.scripts_dir())
    }

    async fn setup_venv(&self) -> Result<()> {
        let venv_dir = self.venv_dir();
        let python = self.python();

        if python.exists() {
            debug!("Export venv already exists at {}", venv_dir.display());
            return Ok(());
        }

        info!("Creating export virtual environment at {}", venv_dir.display());
        let output = Command::new("python3")
            .arg("-m")
            .arg("venv")
            .arg(&venv_dir)
            .output()
            .await
            .map_err(|e| env_error(format!("Failed to create venv: {e}")))?;

        if !output.status.success() {
            return Err(env_error(format!(
                "Failed to create Python venv. Ensure python3 is installed. Error: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let output = Command::new(&python)
            .args(["-m", "pip", "install", "--upgrade", "pip"])
            .output()
            .await
            .map_err(|e| env_error(format!("Failed to upgrade pip: {e}")))?;

        if !output.status.success() {
            warn!(
                "pip upgrade failed (non-fatal): {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let requirements = self.scripts_dir().join(scripts::REQUIREMENTS_NAME);
        info!("Installing export dependencies...");
        let output = Command::new(&python)
            .args(["-m", "pip", "install", "-r"])
            .arg(&requirements)
            .output()
            .await
            .map_err(|e| env_error(format!("Failed to install dependencies: {e}")))?;

        if !output.status.success() {
            return Err(env_error(format!(
                "Failed to install export dependencies: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

fn env_error(message: String) -> ConvkitError {
    ConvkitError::ExportEnvNotReady {
        backend: "ultralytics".to_string(),
        message,
    }
}

#[async_trait]
impl ExportBackend for UltralyticsBackend {
    fn name(&self) -> &str {
        "ultralytics"
    }

    fn is_ready(&self) -> bool {
        let interpreter_ok = match &self.interpreter {
            // A bare command name is resolved through PATH at spawn time.
            Some(python) => python.components().count() == 1 || python.exists(),
            None => self.python().exists(),
        };
        interpreter_ok && self.export_script().exists()
    }

    async fn ensure_environment(&self) -> Result<()> {
        scripts::ensure_scripts_deployed(&self.scripts_dir())?;
        if self.interpreter.is_none() {
            self.setup_venv().await?;
        }
        info!("Ultralytics export environment ready");
        Ok(())
    }

    async fn load(&self, weights: &Path) -> Result<Box<dyn ModelHandle>> {
        if !self.is_ready() {
            return Err(env_error(
                "export environment not set up. Call ensure_environment() first.".to_string(),
            ));
        }
        if !weights.is_file() {
            return Err(ConvkitError::FileNotFound(weights.to_path_buf()));
        }

        Ok(Box::new(UltralyticsModel {
            python: self.python(),
            script: self.export_script(),
            weights: std::path::absolute(weights)?,
            work_dir: self.work_dir.clone(),
        }))
    }
}

/// A weights file bound to a ready interpreter.
struct UltralyticsModel {
    python: PathBuf,
    script: PathBuf,
    weights: PathBuf,
    work_dir: PathBuf,
}

#[async_trait]
impl ModelHandle for UltralyticsModel {
    async fn export(&self, format: &str, name: &str) -> Result<ExportResult> {
        let mut command = Command::new(&self.python);
        command
            .arg(&self.script)
            .arg("--weights")
            .arg(&self.weights)
            .arg("--format")
            .arg(format)
            .arg("--name")
            .arg(name)
            .current_dir(&self.work_dir);

        let line = run_script("export_model.py", command).await?;
        let save_dir = line.save_dir.map(|dir| {
            let dir = PathBuf::from(dir);
            if dir.is_relative() {
                self.work_dir.join(dir)
            } else {
                dir
            }
        });
        Ok(ExportResult { save_dir })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_live_under_data_dir() {
        let backend = UltralyticsBackend::new(Path::new("/work"));
        assert!(backend.export_script().starts_with("/work/.convkit/scripts"));
        assert!(backend.python().starts_with("/work/.convkit/export-venv"));
        assert!(!backend.is_ready());
    }

    #[tokio::test]
    async fn test_load_requires_ready_environment() {
        let temp = TempDir::new().unwrap();
        let backend = UltralyticsBackend::new(temp.path());
        let err = backend
            .load(&temp.path().join("m.pt"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConvkitError::ExportEnvNotReady { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_export_with_custom_interpreter() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let work = temp.path();
        let fake_python = work.join("fake-python");
        // Ignores the script; writes an export dir named after --name in cwd.
        std::fs::write(
            &fake_python,
            r#"#!/bin/sh
while [ $# -gt 0 ]; do
  case "$1" in
    --name) name="$2"; shift ;;
  esac
  shift
done
mkdir -p "runs/$name"
echo '{}' > "runs/$name/model.json"
echo 'x' > "runs/$name/group1-shard1of1.bin"
echo '{"stage":"complete","save_dir":"runs/'"$name"'"}'
"#,
        )
        .unwrap();
        std::fs::set_permissions(&fake_python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let weights = work.join("models/m.pt");
        std::fs::create_dir_all(weights.parent().unwrap()).unwrap();
        std::fs::write(&weights, b"weights").unwrap();

        let backend = UltralyticsBackend::new(work).with_interpreter(&fake_python);
        backend.ensure_environment().await.unwrap();
        assert!(backend.is_ready());

        let model = backend.load(&weights).await.unwrap();
        let result = model.export("tfjs", "m_web_model").await.unwrap();

        let save_dir = result.save_dir.unwrap();
        assert_eq!(save_dir, work.join("runs/m_web_model"));
        assert!(save_dir.join("model.json").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_load_missing_weights() {
        let temp = TempDir::new().unwrap();
        let backend = UltralyticsBackend::new(temp.path()).with_interpreter("python3");
        backend.ensure_environment().await.unwrap();

        let err = backend
            .load(&temp.path().join("absent.pt"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConvkitError::FileNotFound(_)));
    }
}
