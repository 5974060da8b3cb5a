//! Terminal output formatting.
//!
//! Diagnostics go to stderr so stdout stays parseable; color is applied
//! only when the stream supports it.

use modplan_lib::diags::{Diagnostics, Severity};
use owo_colors::{OwoColorize, Stream};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
}

/// Print every diagnostic to stderr, errors in red and warnings in yellow.
pub fn print_diagnostics(diags: &Diagnostics) {
  for diag in diags.iter() {
    match diag.severity {
      Severity::Error => {
        eprintln!("{} {}", "error:".if_supports_color(Stream::Stderr, |s| s.red()), diag.summary);
      }
      Severity::Warning => {
        eprintln!(
          "{} {}",
          "warning:".if_supports_color(Stream::Stderr, |s| s.yellow()),
          diag.summary
        );
      }
    }
    if let Some(subject) = &diag.subject {
      eprintln!("  on {}", subject);
    }
    if !diag.detail.is_empty() {
      eprintln!("  {}", diag.detail);
    }
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}
