//! Registry indirection for module sources.
//!
//! A registry address does not name a package directly; it is resolved
//! through a lookup service to a concrete remote package address plus a
//! concrete version. The service itself is a capability: the installer only
//! needs [`ModuleRegistry::resolve`]. [`JsonRegistry`] is the in-tree
//! implementation backed by a local JSON index, which is also what the
//! tests use; network-backed registries live outside this crate.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::addrs::{RegistrySource, VersionConstraint};

/// Resolves a registry address (plus optional constraint) to a concrete
/// package address and version.
pub trait ModuleRegistry {
  fn resolve(
    &self,
    source: &RegistrySource,
    constraint: Option<&VersionConstraint>,
  ) -> Result<(String, Version), RegistryError>;
}

/// Errors from registry resolution.
#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("module '{addr}' not found in registry")]
  ModuleNotFound { addr: String },

  #[error("no version of '{addr}' satisfies constraint '{constraint}' (available: {available})")]
  NoSatisfyingVersion {
    addr: String,
    constraint: String,
    available: String,
  },

  #[error("failed to read registry index: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse registry index: {0}")]
  Parse(#[source] serde_json::Error),
}

/// A registry backed by a JSON index file:
///
/// ```json
/// {
///   "modules": {
///     "ns/y/p": {
///       "1.0.0": "file:packages/y-1.0.0",
///       "2.1.0": "file:packages/y-2.1.0"
///     }
///   }
/// }
/// ```
///
/// Keys are `namespace/name/provider` triples; the host segment of a
/// four-part address does not participate in the lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonRegistry {
  modules: BTreeMap<String, BTreeMap<Version, String>>,
}

impl JsonRegistry {
  pub fn load(path: &Path) -> Result<Self, RegistryError> {
    let content = std::fs::read(path).map_err(RegistryError::Read)?;
    serde_json::from_slice(&content).map_err(RegistryError::Parse)
  }

  /// Build an index in memory. Test and tooling convenience.
  pub fn from_entries<I>(entries: I) -> Self
  where
    I: IntoIterator<Item = (String, Version, String)>,
  {
    let mut modules: BTreeMap<String, BTreeMap<Version, String>> = BTreeMap::new();
    for (id, version, package_addr) in entries {
      modules.entry(id).or_default().insert(version, package_addr);
    }
    Self { modules }
  }
}

impl ModuleRegistry for JsonRegistry {
  fn resolve(
    &self,
    source: &RegistrySource,
    constraint: Option<&VersionConstraint>,
  ) -> Result<(String, Version), RegistryError> {
    let id = source.registry_id();
    let versions = self.modules.get(&id).ok_or_else(|| RegistryError::ModuleNotFound {
      addr: source.to_string(),
    })?;

    // Newest satisfying version wins; "still satisfies" is checked by the
    // installer before it ever asks the registry, so there is no proactive
    // upgrade of an already-satisfying install.
    let chosen = versions
      .iter()
      .rev()
      .find(|(version, _)| constraint.is_none_or(|c| c.allows(version)));

    match chosen {
      Some((version, package_addr)) => {
        debug!(addr = %source, version = %version, "resolved registry module");
        Ok((package_addr.clone(), version.clone()))
      }
      None => Err(RegistryError::NoSatisfyingVersion {
        addr: source.to_string(),
        constraint: constraint.map(|c| c.raw().to_string()).unwrap_or_default(),
        available: versions
          .keys()
          .map(Version::to_string)
          .collect::<Vec<_>>()
          .join(", "),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::addrs::SourceAddr;

  fn registry() -> JsonRegistry {
    JsonRegistry::from_entries([
      ("ns/y/p".to_string(), Version::new(1, 0, 0), "file:y-1.0.0".to_string()),
      ("ns/y/p".to_string(), Version::new(1, 5, 0), "file:y-1.5.0".to_string()),
      ("ns/y/p".to_string(), Version::new(2, 1, 0), "file:y-2.1.0".to_string()),
    ])
  }

  fn source(raw: &str) -> RegistrySource {
    match SourceAddr::parse(raw) {
      SourceAddr::Registry(reg) => reg,
      other => panic!("not a registry address: {:?}", other),
    }
  }

  #[test]
  fn picks_newest_satisfying_version() {
    let constraint = VersionConstraint::parse(">=1.0.0, <2.0.0").unwrap();
    let (addr, version) = registry().resolve(&source("ns/y/p"), Some(&constraint)).unwrap();
    assert_eq!(version, Version::new(1, 5, 0));
    assert_eq!(addr, "file:y-1.5.0");
  }

  #[test]
  fn no_constraint_picks_newest() {
    let (_, version) = registry().resolve(&source("ns/y/p"), None).unwrap();
    assert_eq!(version, Version::new(2, 1, 0));
  }

  #[test]
  fn host_segment_does_not_affect_lookup() {
    let (_, version) = registry().resolve(&source("registry/ns/y/p"), None).unwrap();
    assert_eq!(version, Version::new(2, 1, 0));
  }

  #[test]
  fn unknown_module_is_not_found() {
    let err = registry().resolve(&source("ns/absent/p"), None).unwrap_err();
    assert!(matches!(err, RegistryError::ModuleNotFound { .. }));
  }

  #[test]
  fn unsatisfiable_constraint_lists_available() {
    let constraint = VersionConstraint::parse(">=9.0.0").unwrap();
    let err = registry().resolve(&source("ns/y/p"), Some(&constraint)).unwrap_err();
    match err {
      RegistryError::NoSatisfyingVersion { available, .. } => {
        assert!(available.contains("2.1.0"));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }
}
