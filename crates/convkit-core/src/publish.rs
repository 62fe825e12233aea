//! Copying installed exports into a serving directory.
//!
//! Each valid `<models>/<id>_<suffix>/` is copied to `<publish_dir>/<id>/`.
//! The copy is built next to its destination and swapped in with
//! [`ArtifactStore::atomic_replace`], so a web server reading `publish_dir`
//! never sees a half-copied model.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::store::{copy_dir_all, ArtifactStore};
use crate::{ConvkitError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedModel {
    pub model_id: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishFailure {
    pub model_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub published: Vec<PublishedModel>,
    pub failed: Vec<PublishFailure>,
}

/// Copy every complete export directory of `catalog` into `publish_dir`.
///
/// Models without a valid export are skipped silently. Only failure to
/// create `publish_dir` itself is an error.
pub fn publish_exports(
    store: &ArtifactStore,
    catalog: &Catalog,
    publish_dir: &Path,
) -> Result<PublishReport> {
    fs::create_dir_all(publish_dir)
        .map_err(|e| ConvkitError::io("creating publish directory", publish_dir, e))?;

    let mut report = PublishReport::default();
    for entry in catalog.iter() {
        let src = entry.export_dir(store.root());
        if !ArtifactStore::exists_export(
            &src,
            &entry.export.manifest_name,
            &entry.export.binary_suffix,
        ) {
            continue;
        }

        let dst = publish_dir.join(&entry.id);
        match publish_one(store, &src, &dst, publish_dir, &entry.id) {
            Ok(()) => {
                info!("Copied {} to {}", src.display(), dst.display());
                report.published.push(PublishedModel {
                    model_id: entry.id.clone(),
                    from: src,
                    to: dst,
                });
            }
            Err(e) => {
                warn!("Could not publish {}: {}", entry.id, e);
                report.failed.push(PublishFailure {
                    model_id: entry.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    if report.published.is_empty() {
        warn!("No web models were found in {}", store.root().display());
    }
    Ok(report)
}

fn publish_one(
    store: &ArtifactStore,
    src: &Path,
    dst: &Path,
    publish_dir: &Path,
    model_id: &str,
) -> Result<()> {
    let copy = publish_dir.join(format!(".{model_id}.copying"));
    if copy.exists() {
        fs::remove_dir_all(&copy)
            .map_err(|e| ConvkitError::io("removing stale copy", &copy, e))?;
    }
    if let Err(e) = copy_dir_all(src, &copy) {
        let _ = fs::remove_dir_all(&copy);
        return Err(e);
    }
    store.atomic_replace(&copy, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFile, EntryDefaults, ModelSpec};
    use tempfile::TempDir;

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog::resolve(CatalogFile {
            defaults: EntryDefaults::default(),
            models: ids
                .iter()
                .map(|id| ModelSpec {
                    id: id.to_string(),
                    source_url: None,
                    weights_ext: None,
                    sibling_exts: None,
                    export_suffix: None,
                })
                .collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_publish_copies_complete_exports_only() {
        let temp = TempDir::new().unwrap();
        let models = temp.path().join("models");
        let public = temp.path().join("public/models");
        let store = ArtifactStore::new(&models);

        let done = models.join("a_web_model");
        fs::create_dir_all(&done).unwrap();
        fs::write(done.join("model.json"), b"{}").unwrap();
        fs::write(done.join("group1-shard1of1.bin"), b"1").unwrap();
        // Manifest without binaries does not qualify.
        let partial = models.join("b_web_model");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join("model.json"), b"{}").unwrap();

        let old = public.join("a");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("outdated.bin"), b"0").unwrap();

        let report = publish_exports(&store, &catalog(&["a", "b"]), &public).unwrap();

        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].model_id, "a");
        assert!(public.join("a/model.json").exists());
        assert!(!public.join("a/outdated.bin").exists());
        assert!(!public.join("b").exists());
        assert!(done.join("model.json").exists(), "source must be kept");
        assert!(!public.join(".a.copying").exists());
    }

    #[test]
    fn test_publish_with_nothing_to_copy() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::new(temp.path().join("models"));
        let report =
            publish_exports(&store, &catalog(&["a"]), &temp.path().join("public")).unwrap();
        assert!(report.published.is_empty());
        assert!(report.failed.is_empty());
    }
}
