//! The plan container: one archive bundling a change-set, a state
//! snapshot, and a config snapshot.
//!
//! # Layout
//!
//! ```text
//! changes                 # binary change-set blob, format- and tool-versioned
//! state                   # opaque state snapshot (optional)
//! config/modules.json     # config snapshot index
//! config/modules/...      # config snapshot files
//! ```
//!
//! Creation is all-or-nothing: everything is written into a temporary file
//! that only becomes the destination by rename, so an interrupted write
//! never leaves a valid-looking archive behind. Opening eagerly checks only
//! that the change-set entry exists; version validation is deferred to
//! [`PlanReader::read_change_set`], so e.g. the config snapshot of a plan
//! written by an incompatible tool version can still be read when only the
//! change-set encoding differs.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::config::Config;
use crate::diags::Diagnostics;
use crate::loader::load_config;
use crate::snapshot::archive::{read_snapshot, write_snapshot};
use crate::snapshot::fs::SnapshotFs;
use crate::snapshot::{Snapshot, SnapshotError};

/// Well-known entry names.
pub const CHANGES_ENTRY: &str = "changes";
pub const STATE_ENTRY: &str = "state";
pub const CONFIG_PREFIX: &str = "config/";

const CHANGES_MAGIC: [u8; 4] = *b"MPLN";

/// Change-set encoding version this build reads and writes.
pub const CHANGES_FORMAT_VERSION: u32 = 1;

/// Tool version stamped into every plan this build creates.
pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The versioned change-set blob. The payload itself is opaque here; only
/// the header is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
  pub format_version: u32,
  pub tool_version: String,
  pub data: Vec<u8>,
}

/// Errors reading or writing a plan container.
#[derive(Debug, Error)]
pub enum PlanError {
  #[error("{0}")]
  Io(#[from] io::Error),

  #[error("archive error: {0}")]
  Archive(#[from] zip::result::ZipError),

  #[error("file is not a plan: it has no change-set entry")]
  MissingChangeSet,

  #[error("corrupt plan: {0}")]
  Corrupt(String),

  #[error("plan uses change-set format version {found}, but this build supports version {supported}")]
  FormatVersionMismatch { found: u32, supported: u32 },

  #[error("plan was created by tool version {created_by}, which is incompatible with the current version {current}")]
  ToolVersionMismatch { created_by: String, current: String },

  #[error(transparent)]
  Snapshot(#[from] SnapshotError),
}

impl ChangeSet {
  /// Wrap opaque change-set bytes with the current format and tool version.
  pub fn new(data: Vec<u8>) -> Self {
    Self {
      format_version: CHANGES_FORMAT_VERSION,
      tool_version: TOOL_VERSION.to_string(),
      data,
    }
  }

  /// Header layout: magic, u32 LE format version, u16 LE tool-version
  /// length, tool version bytes, then the opaque payload.
  pub fn encode(&self) -> Vec<u8> {
    let tool = self.tool_version.as_bytes();
    let mut out = Vec::with_capacity(4 + 4 + 2 + tool.len() + self.data.len());
    out.extend_from_slice(&CHANGES_MAGIC);
    out.extend_from_slice(&self.format_version.to_le_bytes());
    out.extend_from_slice(&(tool.len() as u16).to_le_bytes());
    out.extend_from_slice(tool);
    out.extend_from_slice(&self.data);
    out
  }

  /// Structural decode. Version compatibility is checked separately by
  /// [`PlanReader::read_change_set`].
  pub fn decode(bytes: &[u8]) -> Result<Self, PlanError> {
    if bytes.len() < 10 {
      return Err(PlanError::Corrupt("change-set entry is truncated".to_string()));
    }
    if bytes[..4] != CHANGES_MAGIC {
      return Err(PlanError::Corrupt("change-set entry has wrong magic bytes".to_string()));
    }
    let format_version = u32::from_le_bytes(bytes[4..8].try_into().expect("length checked"));
    let tool_len = u16::from_le_bytes(bytes[8..10].try_into().expect("length checked")) as usize;
    if bytes.len() < 10 + tool_len {
      return Err(PlanError::Corrupt("change-set tool version is truncated".to_string()));
    }
    let tool_version = std::str::from_utf8(&bytes[10..10 + tool_len])
      .map_err(|_| PlanError::Corrupt("change-set tool version is not UTF-8".to_string()))?
      .to_string();
    Ok(Self {
      format_version,
      tool_version,
      data: bytes[10 + tool_len..].to_vec(),
    })
  }
}

/// Write a complete plan into `writer`. Lower-level building block for
/// [`create`]; callers that need all-or-nothing semantics should prefer
/// `create`, which only publishes the destination on success.
pub fn write_plan<W: Write + Seek>(
  writer: W,
  snapshot: &Snapshot,
  state: Option<&[u8]>,
  changes: &ChangeSet,
) -> Result<W, PlanError> {
  let options = SimpleFileOptions::default();
  let mut zip = ZipWriter::new(writer);

  zip.start_file(CHANGES_ENTRY, options)?;
  zip.write_all(&changes.encode())?;

  if let Some(state) = state {
    zip.start_file(STATE_ENTRY, options)?;
    zip.write_all(state)?;
  }

  write_snapshot(&mut zip, CONFIG_PREFIX, snapshot)?;
  Ok(zip.finish()?)
}

/// Create a plan container at `dest` in a single pass. Any failure aborts
/// before `dest` exists; there is no partially-written plan to clean up.
pub fn create(dest: &Path, snapshot: &Snapshot, state: Option<&[u8]>, change_data: &[u8]) -> Result<(), PlanError> {
  let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
  let temp = NamedTempFile::new_in(dir)?;
  let temp = write_plan(temp, snapshot, state, &ChangeSet::new(change_data.to_vec()))?;
  temp.persist(dest).map_err(|e| PlanError::Io(e.error))?;
  info!(path = %dest.display(), modules = snapshot.len(), "wrote plan container");
  Ok(())
}

/// An open plan container.
pub struct PlanReader {
  archive: ZipArchive<File>,
}

impl PlanReader {
  /// Open a plan and verify it carries a change-set entry. Full parsing,
  /// including version checks, is deferred to the `read_*` methods.
  pub fn open(path: &Path) -> Result<Self, PlanError> {
    let file = File::open(path)?;
    let archive = ZipArchive::new(file)?;
    if !archive.file_names().any(|name| name == CHANGES_ENTRY) {
      return Err(PlanError::MissingChangeSet);
    }
    debug!(path = %path.display(), "opened plan container");
    Ok(Self { archive })
  }

  /// Decode the change-set and check it was written by a compatible build.
  pub fn read_change_set(&mut self) -> Result<ChangeSet, PlanError> {
    let mut bytes = Vec::new();
    self.archive.by_name(CHANGES_ENTRY)?.read_to_end(&mut bytes)?;
    let changes = ChangeSet::decode(&bytes)?;

    if changes.format_version != CHANGES_FORMAT_VERSION {
      return Err(PlanError::FormatVersionMismatch {
        found: changes.format_version,
        supported: CHANGES_FORMAT_VERSION,
      });
    }
    if changes.tool_version != TOOL_VERSION {
      return Err(PlanError::ToolVersionMismatch {
        created_by: changes.tool_version,
        current: TOOL_VERSION.to_string(),
      });
    }
    Ok(changes)
  }

  /// Read the opaque state snapshot. A plan computed against an empty
  /// prior state legitimately has none, so absence is `Ok(None)`.
  pub fn read_state(&mut self) -> Result<Option<Vec<u8>>, PlanError> {
    match self.archive.by_name(STATE_ENTRY) {
      Ok(mut entry) => {
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
      }
      Err(zip::result::ZipError::FileNotFound) => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  /// Read the embedded config snapshot.
  pub fn read_config_snapshot(&mut self) -> Result<Snapshot, PlanError> {
    Ok(read_snapshot(&mut self.archive, CONFIG_PREFIX)?)
  }

  /// Read the config snapshot and reload the full config tree from it
  /// through the virtual filesystem. Loader diagnostics are returned so
  /// the caller can distinguish consistency problems from corruption.
  pub fn read_config(&mut self) -> Result<(Config, Diagnostics), PlanError> {
    let snapshot = self.read_config_snapshot()?;
    let Some(root_dir) = snapshot.root_dir().map(Path::to_path_buf) else {
      return Err(PlanError::Corrupt("config snapshot has no root module".to_string()));
    };
    let manifest = snapshot.to_manifest();
    let fs = SnapshotFs::new(&snapshot);
    let (config, diags) = load_config(&root_dir, &manifest, &fs);
    let Some(config) = config else {
      return Err(PlanError::Corrupt(
        "config snapshot does not contain a loadable root module".to_string(),
      ));
    };

    // Every snapshotted module must be reached by the reload; an unreached
    // record means a captured source file went missing and the tree would
    // otherwise come back silently smaller.
    if !diags.has_errors() {
      let mut reached = std::collections::BTreeSet::new();
      config.walk(&mut |node| {
        reached.insert(node.key());
      });
      for (key, _) in snapshot.modules() {
        if !reached.contains(key) {
          return Err(PlanError::Corrupt(format!(
            "snapshot records module '{}' but the reloaded tree never reaches it; a source file is missing",
            key
          )));
        }
      }
    }
    Ok((config, diags))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  mod change_set {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
      let changes = ChangeSet::new(b"opaque payload".to_vec());
      let decoded = ChangeSet::decode(&changes.encode()).unwrap();
      assert_eq!(changes, decoded);
      assert_eq!(decoded.tool_version, TOOL_VERSION);
    }

    #[test]
    fn wrong_magic_is_corrupt() {
      let mut bytes = ChangeSet::new(Vec::new()).encode();
      bytes[0] = b'X';
      assert!(matches!(ChangeSet::decode(&bytes), Err(PlanError::Corrupt(_))));
    }

    #[test]
    fn truncated_header_is_corrupt() {
      assert!(matches!(ChangeSet::decode(b"MPLN\x01"), Err(PlanError::Corrupt(_))));
    }

    #[test]
    fn decode_preserves_foreign_versions() {
      let foreign = ChangeSet {
        format_version: 99,
        tool_version: "9.9.9".to_string(),
        data: vec![1, 2, 3],
      };
      let decoded = ChangeSet::decode(&foreign.encode()).unwrap();
      assert_eq!(decoded.format_version, 99);
      assert_eq!(decoded.tool_version, "9.9.9");
    }
  }
}
