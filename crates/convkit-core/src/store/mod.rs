//! Directory-backed artifact store.
//!
//! Answers whether an artifact exists in a usable form, and replaces a
//! canonical export directory with a freshly produced one. The swap goes
//! through two siblings of the destination:
//!
//! 1. the new content is moved (or copied) to `<dst>.incoming`
//! 2. a previous `<dst>` is renamed to `<dst>.retired`
//! 3. `<dst>.incoming` is renamed to `<dst>`
//! 4. `<dst>.retired` is deleted
//!
//! Readers of `<dst>` see either the old directory, no directory, or the new
//! one, never a mix. A crash between steps can leave the siblings behind;
//! they are cleared at the start of the next swap.

mod copy;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub use copy::copy_dir_all;

use crate::catalog::ArtifactDescriptor;
use crate::config::PathsConfig;
use crate::error::IoResultExt;
use crate::{ConvkitError, Result};

/// Result of [`ArtifactStore::atomic_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Source and destination were the same directory.
    AlreadyInPlace,
    /// Destination now holds the source's content.
    Replaced,
}

/// Artifact store rooted at the models directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory. Nothing else can work without it.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| ConvkitError::io("creating models directory", &self.root, e))
    }

    /// True iff `path` is a file with size > 0 or a directory with at least one entry.
    pub fn exists_nonempty(path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len() > 0,
            Ok(meta) if meta.is_dir() => fs::read_dir(path)
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// True iff `dir` holds `manifest_name` and at least one entry ending in `sibling_suffix`.
    pub fn exists_export(dir: &Path, manifest_name: &str, sibling_suffix: &str) -> bool {
        if !dir.is_dir() || !dir.join(manifest_name).exists() {
            return false;
        }
        match fs::read_dir(dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).any(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .ends_with(sibling_suffix)
            }),
            Err(e) => {
                debug!("Could not list {}: {}", dir.display(), e);
                false
            }
        }
    }

    /// Evaluate a descriptor against the filesystem.
    pub fn check(descriptor: &ArtifactDescriptor) -> bool {
        match descriptor {
            ArtifactDescriptor::File { path } => path.is_file() && Self::exists_nonempty(path),
            ArtifactDescriptor::ExportDir {
                path,
                manifest_name,
                binary_suffix,
            } => Self::exists_export(path, manifest_name, binary_suffix),
        }
    }

    /// Replace `dst_dir` with `src_dir`.
    ///
    /// No-op when both resolve to the same absolute path. Otherwise `src_dir`
    /// is gone afterwards and `dst_dir` holds exactly what `src_dir` held.
    pub fn atomic_replace(&self, src_dir: &Path, dst_dir: &Path) -> Result<ReplaceOutcome> {
        let src = resolve(src_dir)?;
        let dst = resolve(dst_dir)?;

        if src == dst {
            debug!("{} already at canonical location", dst.display());
            return Ok(ReplaceOutcome::AlreadyInPlace);
        }
        if !src.is_dir() {
            return Err(ConvkitError::NotADirectory(src));
        }
        // Staging would land inside the source and the copy would never end.
        if dst.starts_with(&src) {
            return Err(ConvkitError::Other(format!(
                "cannot install {} into its own subdirectory {}",
                src.display(),
                dst.display()
            )));
        }

        let staging = sibling(&dst, PathsConfig::STAGING_SUFFIX)?;
        let retired = sibling(&dst, PathsConfig::RETIRED_SUFFIX)?;
        remove_if_exists(&staging)?;
        remove_if_exists(&retired)?;

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }

        // A source nested inside the destination would be carried away by
        // step 2, so it is always copied out first.
        let nested = src.starts_with(&dst);
        let copied = if nested {
            copy_dir_all(&src, &staging)?;
            true
        } else {
            match fs::rename(&src, &staging) {
                Ok(()) => false,
                Err(e) => {
                    debug!(
                        "rename {} -> {} failed ({}), copying instead",
                        src.display(),
                        staging.display(),
                        e
                    );
                    copy_dir_all(&src, &staging)?;
                    true
                }
            }
        };

        let had_previous = dst.exists();
        if had_previous {
            fs::rename(&dst, &retired)
                .map_err(|e| ConvkitError::io("retiring previous export", &dst, e))?;
        }

        if let Err(e) = fs::rename(&staging, &dst) {
            // Put the previous export back so the canonical path stays valid.
            if had_previous {
                if let Err(restore) = fs::rename(&retired, &dst) {
                    warn!("Failed to restore {}: {}", dst.display(), restore);
                }
            }
            return Err(ConvkitError::io("installing export", &dst, e));
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&retired) {
                warn!("Could not remove {}: {}", retired.display(), e);
            }
        }
        if copied && !nested {
            if let Err(e) = fs::remove_dir_all(&src) {
                warn!("Could not remove {}: {}", src.display(), e);
            }
        }

        debug!("Installed {} at {}", src.display(), dst.display());
        Ok(ReplaceOutcome::Replaced)
    }
}

/// Absolute form of `path` with symlinks and `..` resolved where the path exists.
fn resolve(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    let absolute = std::path::absolute(path).with_path(path)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

fn sibling(path: &Path, suffix: &str) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| ConvkitError::Other(format!("{} has no file name", path.display())))?;
    Ok(path.with_file_name(format!("{}{}", name.to_string_lossy(), suffix)))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).with_path(path),
        Ok(_) => fs::remove_file(path).with_path(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConvkitError::io("inspecting stale path", path, e)),
    }
}
