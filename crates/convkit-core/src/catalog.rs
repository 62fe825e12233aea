//! Model catalog and the artifact naming rules derived from it.
//!
//! A catalog is an ordered list of fully resolved [`ModelEntry`] values. Every
//! on-disk path a model owns is computed from its entry and the models
//! directory; nothing about a model's artifacts is stored.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DefaultCatalog;
use crate::error::IoResultExt;
use crate::{ConvkitError, Result};

/// Layout of a model's export directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLayout {
    /// Format requested from the export engine (e.g. "tfjs").
    pub format: String,
    /// Directory suffix, giving `<id>_<dir_suffix>`.
    pub dir_suffix: String,
    pub manifest_name: String,
    /// Suffix of the binary shard files that accompany the manifest.
    pub binary_suffix: String,
}

/// One catalog entry with every naming rule resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    /// Remote URL of the weights file. `None` means the model must be placed manually.
    pub source_url: Option<String>,
    pub weights_ext: String,
    pub sibling_exts: Vec<String>,
    pub export: ExportLayout,
}

impl ModelEntry {
    pub fn weights_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("{}.{}", self.id, self.weights_ext))
    }

    pub fn sibling_paths(&self, models_dir: &Path) -> Vec<PathBuf> {
        self.sibling_exts
            .iter()
            .map(|ext| models_dir.join(format!("{}.{}", self.id, ext)))
            .collect()
    }

    /// Name hint passed to the export engine, also the canonical directory name.
    pub fn export_name(&self) -> String {
        format!("{}_{}", self.id, self.export.dir_suffix)
    }

    pub fn export_dir(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(self.export_name())
    }

    /// Every stage of this model in evaluation order: weights, siblings, export directory.
    pub fn stages(&self, models_dir: &Path) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(self.sibling_exts.len() + 2);
        stages.push(Stage {
            kind: StageKind::Weights,
            descriptor: ArtifactDescriptor::File {
                path: self.weights_path(models_dir),
            },
        });
        for (ext, path) in self
            .sibling_exts
            .iter()
            .zip(self.sibling_paths(models_dir))
        {
            stages.push(Stage {
                kind: StageKind::Sibling { ext: ext.clone() },
                descriptor: ArtifactDescriptor::File { path },
            });
        }
        stages.push(Stage {
            kind: StageKind::ExportDir,
            descriptor: ArtifactDescriptor::ExportDir {
                path: self.export_dir(models_dir),
                manifest_name: self.export.manifest_name.clone(),
                binary_suffix: self.export.binary_suffix.clone(),
            },
        });
        stages
    }
}

/// Kind of artifact a stage refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    Weights,
    Sibling { ext: String },
    ExportDir,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Weights => write!(f, "weights"),
            StageKind::Sibling { ext } => write!(f, "{ext}"),
            StageKind::ExportDir => write!(f, "export"),
        }
    }
}

/// What a usable artifact looks like on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactDescriptor {
    /// Regular file with non-zero size.
    File { path: PathBuf },
    /// Directory holding the manifest and at least one binary file.
    ExportDir {
        path: PathBuf,
        manifest_name: String,
        binary_suffix: String,
    },
}

impl ArtifactDescriptor {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactDescriptor::File { path } | ArtifactDescriptor::ExportDir { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(flatten)]
    pub kind: StageKind,
    pub descriptor: ArtifactDescriptor,
}

// ---------------------------------------------------------------------------
// Catalog file format
// ---------------------------------------------------------------------------

/// Values applied to every model that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntryDefaults {
    /// Weights are fetched from `<source_base_url>/<id>.<weights_ext>`.
    pub source_base_url: Option<String>,
    pub weights_ext: String,
    pub sibling_exts: Vec<String>,
    pub export_format: String,
    pub export_suffix: String,
    pub manifest_name: String,
    pub binary_suffix: String,
}

impl Default for EntryDefaults {
    fn default() -> Self {
        Self {
            source_base_url: Some(DefaultCatalog::SOURCE_BASE_URL.to_string()),
            weights_ext: DefaultCatalog::WEIGHTS_EXT.to_string(),
            sibling_exts: DefaultCatalog::SIBLING_EXTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            export_format: DefaultCatalog::EXPORT_FORMAT.to_string(),
            export_suffix: DefaultCatalog::EXPORT_SUFFIX.to_string(),
            manifest_name: DefaultCatalog::MANIFEST_NAME.to_string(),
            binary_suffix: DefaultCatalog::BINARY_SUFFIX.to_string(),
        }
    }
}

/// A model as written in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSpec {
    pub id: String,
    /// Explicit URL, takes precedence over the templated one.
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub weights_ext: Option<String>,
    #[serde(default)]
    pub sibling_exts: Option<Vec<String>>,
    #[serde(default)]
    pub export_suffix: Option<String>,
}

/// On-disk shape of a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogFile {
    #[serde(default)]
    pub defaults: EntryDefaults,
    pub models: Vec<ModelSpec>,
}

// ---------------------------------------------------------------------------
// Resolved catalog
// ---------------------------------------------------------------------------

/// Ordered, immutable list of models to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<ModelEntry>,
}

impl Catalog {
    /// Resolve a catalog file into fully specified entries.
    pub fn resolve(file: CatalogFile) -> Result<Self> {
        if file.models.is_empty() {
            return Err(ConvkitError::config("catalog contains no models"));
        }

        let defaults = file.defaults;
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(file.models.len());

        for spec in file.models {
            let id = spec.id.trim().to_string();
            if id.is_empty() {
                return Err(ConvkitError::config("model id must not be empty"));
            }
            if id.contains(['/', '\\']) || !is_single_name(&id) {
                return Err(ConvkitError::config(format!(
                    "model id '{id}' must be a plain file name"
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(ConvkitError::config(format!("duplicate model id '{id}'")));
            }

            let weights_ext = spec
                .weights_ext
                .unwrap_or_else(|| defaults.weights_ext.clone());
            let source_url = match spec.source_url {
                Some(url) => Some(validate_url(&id, url)?),
                None => match &defaults.source_base_url {
                    Some(base) => Some(validate_url(&id, source_url_for(base, &id, &weights_ext))?),
                    None => None,
                },
            };

            entries.push(ModelEntry {
                id,
                source_url,
                weights_ext,
                sibling_exts: spec
                    .sibling_exts
                    .unwrap_or_else(|| defaults.sibling_exts.clone()),
                export: ExportLayout {
                    format: defaults.export_format.clone(),
                    dir_suffix: spec
                        .export_suffix
                        .unwrap_or_else(|| defaults.export_suffix.clone()),
                    manifest_name: defaults.manifest_name.clone(),
                    binary_suffix: defaults.binary_suffix.clone(),
                },
            });
        }

        Ok(Self { entries })
    }

    /// Load and resolve a JSON catalog file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).with_path(path)?;
        let file: CatalogFile = serde_json::from_str(&contents).map_err(|e| ConvkitError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })?;
        Self::resolve(file)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let defaults = EntryDefaults::default();
        let entries = DefaultCatalog::MODEL_IDS
            .iter()
            .map(|id| ModelEntry {
                id: id.to_string(),
                source_url: defaults
                    .source_base_url
                    .as_deref()
                    .map(|base| source_url_for(base, id, &defaults.weights_ext)),
                weights_ext: defaults.weights_ext.clone(),
                sibling_exts: defaults.sibling_exts.clone(),
                export: ExportLayout {
                    format: defaults.export_format.clone(),
                    dir_suffix: defaults.export_suffix.clone(),
                    manifest_name: defaults.manifest_name.clone(),
                    binary_suffix: defaults.binary_suffix.clone(),
                },
            })
            .collect();
        Self { entries }
    }
}

/// `<base>/<id>.<ext>`, tolerant of a trailing slash on `base`.
pub fn source_url_for(base: &str, id: &str, ext: &str) -> String {
    format!("{}/{}.{}", base.trim_end_matches('/'), id, ext)
}

fn validate_url(id: &str, raw: String) -> Result<String> {
    let parsed = url::Url::parse(&raw)
        .map_err(|e| ConvkitError::config(format!("invalid source URL for '{id}': {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw),
        other => Err(ConvkitError::config(format!(
            "unsupported URL scheme '{other}' for '{id}'"
        ))),
    }
}

/// Ids are joined onto directories, so `.` and `..` must never get through.
fn is_single_name(id: &str) -> bool {
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
