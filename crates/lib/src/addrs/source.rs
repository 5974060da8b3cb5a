//! Source address classification.
//!
//! A module call names its source with a single string. Classification is a
//! pure function of that string: local addresses are recognized by their
//! `./` / `../` prefix, registry addresses by a `namespace/name/provider`
//! grammar (optionally preceded by a registry host), and everything else is
//! treated as a remote package address. No filesystem or network probing
//! happens here; an address of no recognizable shape classifies as Remote
//! and fails later, at fetch time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A classified module source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceAddr {
  /// A path relative to the calling module's directory. Never fetched.
  Local {
    relative_path: String,
  },
  /// An indirection resolved to a remote package via a registry lookup.
  Registry(RegistrySource),
  /// A direct package address, handed verbatim to the fetch capability.
  Remote(RemoteSource),
}

/// A registry-style address: `[host/]namespace/name/provider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySource {
  /// Registry host, when the address has four segments.
  pub host: Option<String>,
  pub namespace: String,
  pub name: String,
  pub provider: String,
}

/// A remote package address, with an optional `//subdir` suffix selecting a
/// directory inside the fetched package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSource {
  pub package_addr: String,
  pub subdir: Option<String>,
}

impl SourceAddr {
  /// Classify a raw source string. Pure and infallible.
  pub fn parse(raw: &str) -> SourceAddr {
    if is_local_prefix(raw) {
      return SourceAddr::Local {
        relative_path: raw.to_string(),
      };
    }

    if let Some(registry) = try_parse_registry(raw) {
      return SourceAddr::Registry(registry);
    }

    let (package_addr, subdir) = split_package_subdir(raw);
    SourceAddr::Remote(RemoteSource {
      package_addr: package_addr.to_string(),
      subdir: subdir.map(str::to_string),
    })
  }

  pub fn is_local(&self) -> bool {
    matches!(self, SourceAddr::Local { .. })
  }

  pub fn is_registry(&self) -> bool {
    matches!(self, SourceAddr::Registry(_))
  }
}

impl fmt::Display for SourceAddr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceAddr::Local { relative_path } => write!(f, "{}", relative_path),
      SourceAddr::Registry(reg) => write!(f, "{}", reg),
      SourceAddr::Remote(rem) => write!(f, "{}", rem),
    }
  }
}

impl RegistrySource {
  /// The `namespace/name/provider` triple without the host, used as the
  /// lookup key in registry indexes.
  pub fn registry_id(&self) -> String {
    format!("{}/{}/{}", self.namespace, self.name, self.provider)
  }
}

impl fmt::Display for RegistrySource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.host {
      Some(host) => write!(f, "{}/{}/{}/{}", host, self.namespace, self.name, self.provider),
      None => write!(f, "{}/{}/{}", self.namespace, self.name, self.provider),
    }
  }
}

impl fmt::Display for RemoteSource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.subdir {
      Some(subdir) => write!(f, "{}//{}", self.package_addr, subdir),
      None => write!(f, "{}", self.package_addr),
    }
  }
}

fn is_local_prefix(raw: &str) -> bool {
  raw.starts_with("./")
    || raw.starts_with("../")
    || raw.starts_with(".\\")
    || raw.starts_with("..\\")
    || raw == "."
    || raw == ".."
}

/// Try the registry grammar: three slash-separated segments, or four with a
/// leading host. The three trailing segments must be plain identifiers (no
/// dots, no colons) so that e.g. `github.com/org/repo` stays Remote.
fn try_parse_registry(raw: &str) -> Option<RegistrySource> {
  let parts: Vec<&str> = raw.split('/').collect();
  let (host, rest) = match parts.len() {
    3 => (None, &parts[..]),
    4 => (Some(parts[0]), &parts[1..]),
    _ => return None,
  };

  if let Some(host) = host
    && (host.is_empty() || host.contains(':'))
  {
    return None;
  }
  if !rest.iter().all(|part| is_registry_segment(part)) {
    return None;
  }

  Some(RegistrySource {
    host: host.map(str::to_string),
    namespace: rest[0].to_string(),
    name: rest[1].to_string(),
    provider: rest[2].to_string(),
  })
}

fn is_registry_segment(part: &str) -> bool {
  !part.is_empty()
    && part
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Split a remote address into its package address and optional subdirectory.
///
/// The separator is a `//` that is not part of a URL scheme, so
/// `https://host/pkg//sub` splits into `https://host/pkg` and `sub`.
pub fn split_package_subdir(raw: &str) -> (&str, Option<&str>) {
  let search_from = match raw.find("://") {
    Some(idx) => idx + 3,
    None => 0,
  };
  match raw[search_from..].find("//") {
    Some(idx) => {
      let split_at = search_from + idx;
      let subdir = &raw[split_at + 2..];
      if subdir.is_empty() {
        (&raw[..split_at], None)
      } else {
        (&raw[..split_at], Some(subdir))
      }
    }
    None => (raw, None),
  }
}
