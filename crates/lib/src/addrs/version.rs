//! Version constraints on module calls.
//!
//! A constraint keeps both the raw string from the configuration (for
//! display and change detection) and the parsed requirement. Resolved
//! versions are plain [`semver::Version`] values; local modules have none.

use std::fmt;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parsed version constraint such as `>=1.0.0, <2.0.0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
  raw: String,
  req: VersionReq,
}

/// Error parsing a constraint string.
#[derive(Debug, Error)]
#[error("invalid version constraint '{raw}': {source}")]
pub struct ConstraintError {
  pub raw: String,
  #[source]
  source: semver::Error,
}

impl VersionConstraint {
  pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
    let req = VersionReq::parse(raw).map_err(|source| ConstraintError {
      raw: raw.to_string(),
      source,
    })?;
    Ok(Self {
      raw: raw.to_string(),
      req,
    })
  }

  /// Whether `version` satisfies this constraint.
  pub fn allows(&self, version: &Version) -> bool {
    self.req.matches(version)
  }

  pub fn raw(&self) -> &str {
    &self.raw
  }
}

impl fmt::Display for VersionConstraint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.raw)
  }
}
