//! Module directory parsing.
//!
//! A module is a directory of `*.mp.json` documents. Each document may
//! declare child module calls under a top-level `"module"` object; any
//! other top-level keys are retained opaquely as module attributes:
//!
//! ```json
//! {
//!   "module": {
//!     "x": { "source": "./x" },
//!     "y": { "source": "registry/ns/y/p", "version": ">=1.0.0" }
//!   },
//!   "description": "root of the environment"
//! }
//! ```
//!
//! The parser reads through the [`ConfigFs`] capability only, so the same
//! code parses real directories and snapshot-backed ones. It records every
//! file name it opened on the returned [`Module`]; the snapshot
//! completeness invariant is defined over that list.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde::de::{MapAccess, Visitor};
use tracing::debug;

use crate::addrs::{SourceAddr, VersionConstraint};
use crate::config::{Module, ModuleCall};
use crate::diags::{Diagnostic, Diagnostics};
use crate::fsys::ConfigFs;

/// File suffix of module configuration documents.
pub const CONFIG_SUFFIX: &str = ".mp.json";

#[derive(Debug, Deserialize)]
struct RawDocument {
  /// Call entries in declaration order. Collected into a list rather than
  /// a map so a duplicate name within one document stays visible and gets
  /// diagnosed like a duplicate across files.
  #[serde(default, deserialize_with = "call_entries")]
  module: Vec<(String, RawModuleCall)>,
  #[serde(flatten)]
  attrs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawModuleCall {
  source: String,
  version: Option<String>,
}

fn call_entries<'de, D>(deserializer: D) -> Result<Vec<(String, RawModuleCall)>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  struct CallEntries;

  impl<'de> Visitor<'de> for CallEntries {
    type Value = Vec<(String, RawModuleCall)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("a map of module calls")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
      let mut entries = Vec::new();
      while let Some(entry) = map.next_entry()? {
        entries.push(entry);
      }
      Ok(entries)
    }
  }

  deserializer.deserialize_map(CallEntries)
}

/// Parse every configuration document in `dir`.
///
/// Returns `None` specifically when the directory is missing or unreadable,
/// which callers report as a distinct error category from a syntax error.
/// Syntax and declaration errors return a partial module plus diagnostics,
/// so sibling declarations in other files still get processed.
pub fn parse_module_dir(fs: &dyn ConfigFs, dir: &Path) -> (Option<Module>, Diagnostics) {
  let mut diags = Diagnostics::new();

  if !fs.is_dir(dir) {
    return (None, diags);
  }
  let names = match fs.list_dir(dir) {
    Ok(names) => names,
    Err(_) => return (None, diags),
  };

  let mut module = Module {
    dir: dir.to_path_buf(),
    calls: BTreeMap::new(),
    attrs: BTreeMap::new(),
    files: Vec::new(),
  };

  for name in names {
    if !name.ends_with(CONFIG_SUFFIX) {
      continue;
    }
    let path = dir.join(&name);
    let bytes = match fs.read_file(&path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        // Listed but not openable: the backing store lost a file between
        // listing and reading. For a snapshot this is the missing-source
        // condition; it must fail loudly rather than yield a default.
        diags.push(
          Diagnostic::error(
            "Missing source file",
            format!("Configuration file {} is listed but could not be opened.", path.display()),
          )
          .with_subject(name.clone()),
        );
        continue;
      }
      Err(e) => {
        diags.push(
          Diagnostic::error(
            "Failed to read configuration file",
            format!("Error reading {}: {}.", path.display(), e),
          )
          .with_subject(name.clone()),
        );
        continue;
      }
    };
    module.files.push(name.clone());

    let doc: RawDocument = match serde_json::from_slice(&bytes) {
      Ok(doc) => doc,
      Err(e) => {
        diags.push(
          Diagnostic::error(
            "Invalid configuration syntax",
            format!("Failed to parse {}: {}.", path.display(), e),
          )
          .with_subject(name.clone()),
        );
        continue;
      }
    };

    for (call_name, raw) in doc.module {
      if module.calls.contains_key(&call_name) {
        diags.push(
          Diagnostic::error(
            "Duplicate module call",
            format!("Module \"{}\" is declared more than once in this directory.", call_name),
          )
          .with_subject(format!("{}: module \"{}\"", name, call_name)),
        );
        continue;
      }

      let version = match raw.version.as_deref() {
        Some(raw_constraint) => match VersionConstraint::parse(raw_constraint) {
          Ok(constraint) => Some(constraint),
          Err(e) => {
            diags.push(
              Diagnostic::error("Invalid version constraint", format!("{}.", e))
                .with_subject(format!("{}: module \"{}\"", name, call_name)),
            );
            continue;
          }
        },
        None => None,
      };

      module.calls.insert(
        call_name.clone(),
        ModuleCall {
          name: call_name,
          source_addr: SourceAddr::parse(&raw.source),
          source: raw.source,
          version,
          decl_file: name.clone(),
        },
      );
    }

    for (key, value) in doc.attrs {
      module.attrs.entry(key).or_insert(value);
    }
  }

  debug!(dir = %dir.display(), calls = module.calls.len(), files = module.files.len(), "parsed module directory");
  (Some(module), diags)
}
