//! Accumulated diagnostics for module walks.
//!
//! Resolution and loading visit many modules in one pass; problems are
//! collected into a [`Diagnostics`] value and returned together so the
//! caller sees every independent failure at once, rather than the first
//! one. Hard failures inside a single subsystem (manifest I/O, archive
//! corruption) stay typed `thiserror` enums in their own modules.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
  Error,
  Warning,
}

/// A single problem found during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
  pub severity: Severity,
  /// Short, stable summary ("Module not installed").
  pub summary: String,
  /// Longer explanation including the offending path or address.
  pub detail: String,
  /// Where the problem was declared, when known (file and call name).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject: Option<String>,
}

impl Diagnostic {
  pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
    Self {
      severity: Severity::Error,
      summary: summary.into(),
      detail: detail.into(),
      subject: None,
    }
  }

  pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
    Self {
      severity: Severity::Warning,
      summary: summary.into(),
      detail: detail.into(),
      subject: None,
    }
  }

  pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
    self.subject = Some(subject.into());
    self
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self.severity {
      Severity::Error => "error",
      Severity::Warning => "warning",
    };
    match &self.subject {
      Some(subject) => write!(f, "{}: {} ({}): {}", kind, self.summary, subject, self.detail),
      None => write!(f, "{}: {}: {}", kind, self.summary, self.detail),
    }
  }
}

/// An ordered collection of diagnostics from a single walk or read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
  diags: Vec<Diagnostic>,
}

impl Diagnostics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, diag: Diagnostic) {
    self.diags.push(diag);
  }

  pub fn extend(&mut self, other: Diagnostics) {
    self.diags.extend(other.diags);
  }

  pub fn has_errors(&self) -> bool {
    self.diags.iter().any(|d| d.severity == Severity::Error)
  }

  pub fn is_empty(&self) -> bool {
    self.diags.is_empty()
  }

  pub fn len(&self) -> usize {
    self.diags.len()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.diags.iter()
  }
}

impl IntoIterator for Diagnostics {
  type Item = Diagnostic;
  type IntoIter = std::vec::IntoIter<Diagnostic>;

  fn into_iter(self) -> Self::IntoIter {
    self.diags.into_iter()
  }
}

impl FromIterator<Diagnostic> for Diagnostics {
  fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
    Self {
      diags: iter.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn has_errors_ignores_warnings() {
    let mut diags = Diagnostics::new();
    diags.push(Diagnostic::warning("Deprecated source form", "use ./ instead"));
    assert!(!diags.has_errors());

    diags.push(Diagnostic::error("Module not installed", "run install"));
    assert!(diags.has_errors());
    assert_eq!(diags.len(), 2);
  }

  #[test]
  fn display_includes_subject() {
    let diag = Diagnostic::error("Module not installed", "run install").with_subject("main.mp.json: module \"x\"");
    let rendered = diag.to_string();
    assert!(rendered.contains("main.mp.json"));
    assert!(rendered.starts_with("error:"));
  }
}
