//! Config snapshots: the exact source files of a load.
//!
//! A [`Snapshot`] captures, per manifest key, the verbatim bytes of every
//! configuration file the parser opened while loading that module. It is
//! immutable after construction and serializable, so a build artifact can
//! later be reopened and reproduce byte-identical configuration with no
//! filesystem, network, or module cache involved.
//!
//! # Modules
//!
//! - [`fs`] - The read-only virtual filesystem over a snapshot
//! - [`archive`] - Serialization to and from archive entries

pub mod archive;
pub mod fs;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::diags::{Diagnostic, Diagnostics};
use crate::fsys::{ConfigFs, normalize};
use crate::loader::load_config;
use crate::manifest::{Manifest, ManifestError, ManifestRecord};

/// The captured file set of one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotModule {
  /// Directory the module was loaded from, as recorded in the manifest.
  pub dir: PathBuf,
  /// Verbatim bytes of every file the parser opened, keyed by file name.
  pub files: BTreeMap<String, Vec<u8>>,
  /// String form of the source address (empty for the root).
  pub source_addr: String,
  pub version: Option<Version>,
}

/// An immutable capture of every module used by a configuration load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
  modules: BTreeMap<String, SnapshotModule>,
}

/// Errors constructing or (de)serializing a snapshot. Corruption errors are
/// fatal for the whole operation; reproducibility leaves no room for
/// partial recovery.
#[derive(Debug, Error)]
pub enum SnapshotError {
  #[error("failed to read source file '{path}': {source}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("snapshot archive has no module index entry")]
  MissingIndex,

  #[error("invalid snapshot module index: {0}")]
  Index(#[source] ManifestError),

  #[error("snapshot archive contains file '{0}' with no matching index record")]
  UnexpectedFile(String),

  #[error("snapshot index records module '{0}' but the archive holds no files for it")]
  MissingFiles(String),

  #[error("archive error: {0}")]
  Archive(#[from] zip::result::ZipError),

  #[error("{0}")]
  Io(#[from] io::Error),
}

impl Snapshot {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, key: String, module: SnapshotModule) {
    self.modules.insert(key, module);
  }

  pub fn get(&self, key: &str) -> Option<&SnapshotModule> {
    self.modules.get(key)
  }

  pub fn modules(&self) -> impl Iterator<Item = (&String, &SnapshotModule)> {
    self.modules.iter()
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Find the module whose recorded directory matches `dir` (compared
  /// lexically normalized). Backs the virtual filesystem lookups.
  pub fn module_by_dir(&self, dir: &Path) -> Option<(&String, &SnapshotModule)> {
    let wanted = normalize(dir);
    self.modules.iter().find(|(_, module)| normalize(&module.dir) == wanted)
  }

  /// The root module's directory, when the snapshot has a root.
  pub fn root_dir(&self) -> Option<&Path> {
    self.modules.get("").map(|module| module.dir.as_path())
  }

  /// Rebuild the manifest the loader needs to walk this snapshot.
  pub fn to_manifest(&self) -> Manifest {
    let mut manifest = Manifest::new();
    for (key, module) in &self.modules {
      manifest.insert(ManifestRecord {
        key: key.clone(),
        source_addr: module.source_addr.clone(),
        version: module.version.clone(),
        dir: module.dir.clone(),
      });
    }
    manifest
  }

  /// Content address of the snapshot: SHA-256 over the sorted sequence of
  /// module keys, file names, and file bytes.
  pub fn checksum(&self) -> String {
    let mut hasher = Sha256::new();
    for (key, module) in &self.modules {
      hasher.update(key.as_bytes());
      hasher.update([0u8]);
      for (name, bytes) in &module.files {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
      }
    }
    hex::encode(hasher.finalize())
  }
}

/// Capture the file set of every module in a loaded config tree.
///
/// This is the only producer of snapshot content: for each module the
/// verbatim bytes of every file the parser opened are read back through the
/// same filesystem capability the load used. Any unreadable file fails the
/// whole capture; a snapshot missing even one source file would reload
/// incompletely later.
pub fn capture(config: &Config, fs: &dyn ConfigFs) -> Result<Snapshot, SnapshotError> {
  let mut snapshot = Snapshot::new();
  let mut failure = None;

  config.walk(&mut |node| {
    if failure.is_some() {
      return;
    }
    let mut files = BTreeMap::new();
    for name in &node.module.files {
      let path = node.module.dir.join(name);
      match fs.read_file(&path) {
        Ok(bytes) => {
          files.insert(name.clone(), bytes);
        }
        Err(source) => {
          failure = Some(SnapshotError::ReadFile { path, source });
          return;
        }
      }
    }
    snapshot.insert(
      node.key(),
      SnapshotModule {
        dir: node.module.dir.clone(),
        files,
        source_addr: node.source_addr.as_ref().map(|a| a.to_string()).unwrap_or_default(),
        version: node.version.clone(),
      },
    );
  });

  if let Some(e) = failure {
    return Err(e);
  }
  debug!(modules = snapshot.len(), "captured config snapshot");
  Ok(snapshot)
}

/// Load an already-installed tree and capture it in one step.
pub fn capture_dir(
  root_dir: &Path,
  manifest: &Manifest,
  fs: &dyn ConfigFs,
) -> (Option<(Config, Snapshot)>, Diagnostics) {
  let (config, mut diags) = load_config(root_dir, manifest, fs);
  let Some(config) = config else {
    return (None, diags);
  };
  if diags.has_errors() {
    // A partial tree must not masquerade as a reproducible capture.
    return (None, diags);
  }
  match capture(&config, fs) {
    Ok(snapshot) => (Some((config, snapshot)), diags),
    Err(e) => {
      diags.push(Diagnostic::error("Failed to capture config snapshot", format!("{}.", e)));
      (None, diags)
    }
  }
}
