//! Embedded Python export script and deployment utilities.
//!
//! The script is stored as a string constant and written to disk on first use
//! or when the embedded version changes (detected via hash comparison).

use crate::error::IoResultExt;
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_SCRIPT_NAME: &str = "export_model.py";
pub const REQUIREMENTS_NAME: &str = "requirements.txt";

/// Python requirements for the export virtual environment.
pub const REQUIREMENTS: &str = "\
ultralytics>=8.3.0
tensorflowjs>=4.0.0
";

/// Python script that loads a weights file with Ultralytics and exports it.
///
/// Emits JSON lines on stdout. The final line has `stage: "complete"` and the
/// absolute `save_dir`, or `stage: "error"` with a message.
pub const EXPORT_SCRIPT: &str = r#"#!/usr/bin/env python3
"""Export a weights file to another format with Ultralytics.

Reports progress as JSON lines on stdout.
"""
import argparse
import json
import os
import sys


def progress(stage, **kwargs):
    """Emit a JSON progress line to stdout."""
    print(json.dumps({"stage": stage, **kwargs}), flush=True)


def main():
    parser = argparse.ArgumentParser(description="Export a model with Ultralytics")
    parser.add_argument("--weights", required=True, help="Source weights file")
    parser.add_argument("--format", required=True, help="Target export format")
    parser.add_argument("--name", required=True, help="Output name hint")
    args = parser.parse_args()

    try:
        from ultralytics import YOLO
    except ImportError as e:
        progress("error", message=f"Missing required package: {e}")
        sys.exit(1)

    progress("loading", message=f"Loading {args.weights}")
    try:
        model = YOLO(args.weights)
        progress("exporting", message=f"Exporting to {args.format}")
        result = model.export(format=args.format, name=args.name)
    except Exception as e:
        progress("error", message=f"{type(e).__name__}: {e}")
        sys.exit(1)

    save_dir = getattr(result, "save_dir", None)
    if save_dir is None and isinstance(result, (str, os.PathLike)):
        save_dir = result
    if save_dir is not None:
        save_dir = os.path.abspath(os.fspath(save_dir))
    progress("complete", save_dir=save_dir)


if __name__ == "__main__":
    main()
"#;

/// Compute a short hash of a string for staleness checking.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Path of the deployed export script.
pub fn export_script(scripts_dir: &Path) -> PathBuf {
    scripts_dir.join(EXPORT_SCRIPT_NAME)
}

/// Deploy the embedded script and requirements if missing or outdated.
pub fn ensure_scripts_deployed(scripts_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(scripts_dir).with_path(scripts_dir)?;

    let wrote_script = deploy_script(scripts_dir, EXPORT_SCRIPT_NAME, EXPORT_SCRIPT)?;
    let wrote_requirements = deploy_script(scripts_dir, REQUIREMENTS_NAME, REQUIREMENTS)?;

    if wrote_script || wrote_requirements {
        info!("Export scripts deployed to {}", scripts_dir.display());
    }
    Ok(())
}

/// Returns whether the file was (re)written.
fn deploy_script(dir: &Path, filename: &str, content: &str) -> Result<bool> {
    let script_path = dir.join(filename);
    let hash_path = dir.join(format!("{}.hash", filename));
    let current_hash = content_hash(content);

    if script_path.exists() {
        if let Ok(stored_hash) = std::fs::read_to_string(&hash_path) {
            if stored_hash.trim() == current_hash {
                return Ok(false);
            }
        }
    }

    std::fs::write(&script_path, content).with_path(&script_path)?;
    std::fs::write(&hash_path, &current_hash).with_path(&hash_path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_deploy_writes_once_and_refreshes_on_change() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("scripts");

        ensure_scripts_deployed(&dir).unwrap();
        let script = export_script(&dir);
        assert_eq!(std::fs::read_to_string(&script).unwrap(), EXPORT_SCRIPT);
        assert!(dir.join("requirements.txt").exists());

        assert!(!deploy_script(&dir, EXPORT_SCRIPT_NAME, EXPORT_SCRIPT).unwrap());

        std::fs::write(&script, "tampered").unwrap();
        std::fs::write(dir.join("export_model.py.hash"), "stale").unwrap();
        assert!(deploy_script(&dir, EXPORT_SCRIPT_NAME, EXPORT_SCRIPT).unwrap());
        assert_eq!(std::fs::read_to_string(&script).unwrap(), EXPORT_SCRIPT);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 16);
    }
}
