//! The installed-modules manifest.
//!
//! The manifest is a flat table with one record per distinct module-tree
//! position, keyed by the dot-joined path of call names from the root (the
//! root itself has the empty key). It is persisted as a single JSON
//! snapshot file next to the installed packages:
//!
//! ```json
//! {
//!   "Modules": [
//!     { "Key": "", "Source": "", "Version": null, "Dir": "." },
//!     { "Key": "x.y", "Source": "ns/y/p", "Version": "1.2.0", "Dir": ".modplan/modules/x.y" }
//!   ]
//! }
//! ```
//!
//! A missing file is an empty manifest, not an error. The installer is the
//! only writer; the loader treats the table as read-only input.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Manifest file name inside the modules directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// One installed-module record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
  /// Dot-joined call path from the root; `""` for the root module.
  #[serde(rename = "Key")]
  pub key: String,

  /// String form of the call's source address, used for change detection.
  #[serde(rename = "Source")]
  pub source_addr: String,

  /// Concrete resolved version; absent for local and root modules.
  #[serde(rename = "Version")]
  pub version: Option<Version>,

  /// Directory holding the module's source files.
  #[serde(rename = "Dir")]
  pub dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
  #[serde(rename = "Modules")]
  modules: Vec<ManifestRecord>,
}

/// The full table of installed modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
  records: std::collections::BTreeMap<String, ManifestRecord>,
}

/// Errors reading or writing the manifest snapshot file.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write manifest file: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse manifest file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("manifest contains duplicate records for module key '{0}'")]
  DuplicateKey(String),
}

impl Manifest {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load a manifest snapshot from `path`. A missing file yields an empty
  /// manifest; malformed JSON or duplicate keys are errors.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = match fs::read(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no manifest file, starting empty");
        return Ok(Self::new());
      }
      Err(e) => return Err(ManifestError::Read(e)),
    };
    Self::from_json(&content)
  }

  /// Save the manifest snapshot to `path`, atomically from the caller's
  /// perspective (temp file in the same directory, then rename).
  pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
    let content = self.to_json()?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).map_err(ManifestError::Write)?;
    fs::rename(&temp_path, path).map_err(ManifestError::Write)?;
    debug!(path = %path.display(), records = self.records.len(), "wrote manifest");
    Ok(())
  }

  /// Parse the JSON snapshot form. Shared with the config snapshot index,
  /// which uses the same record layout.
  pub fn from_json(content: &[u8]) -> Result<Self, ManifestError> {
    let file: ManifestFile = serde_json::from_slice(content).map_err(ManifestError::Parse)?;
    let mut manifest = Self::new();
    for record in file.modules {
      if manifest.records.contains_key(&record.key) {
        return Err(ManifestError::DuplicateKey(record.key));
      }
      manifest.records.insert(record.key.clone(), record);
    }
    Ok(manifest)
  }

  /// Serialize to the JSON snapshot form.
  pub fn to_json(&self) -> Result<String, ManifestError> {
    let file = ManifestFile {
      modules: self.records.values().cloned().collect(),
    };
    serde_json::to_string_pretty(&file).map_err(ManifestError::Serialize)
  }

  pub fn get(&self, key: &str) -> Option<&ManifestRecord> {
    self.records.get(key)
  }

  pub fn insert(&mut self, record: ManifestRecord) {
    self.records.insert(record.key.clone(), record);
  }

  /// Remove the record at `key_prefix` and every record whose key has
  /// `key_prefix + "."` as a prefix. Replacing a module invalidates all of
  /// its descendants: their recorded directories belong to the old package.
  pub fn prune(&mut self, key_prefix: &str) -> usize {
    let child_prefix = format!("{}.", key_prefix);
    let before = self.records.len();
    self
      .records
      .retain(|key, _| key != key_prefix && !key.starts_with(&child_prefix));
    let removed = before - self.records.len();
    if removed > 0 {
      debug!(key = key_prefix, removed, "pruned manifest records");
    }
    removed
  }

  pub fn records(&self) -> impl Iterator<Item = &ManifestRecord> {
    self.records.values()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

/// Join call names into a manifest key. The root (empty path) is `""`.
pub fn module_key(path: &[String]) -> String {
  path.join(".")
}
