//! Progress hooks for module installation.
//!
//! Hooks are invoked synchronously on the installer's thread and carry no
//! control authority: they cannot cancel or alter the walk. They exist for
//! UI feedback only, so implementations must not block.

use std::path::Path;

use semver::Version;

/// Observability callbacks for the installer walk. All methods default to
/// no-ops, so implementors override only what they care about.
pub trait InstallHooks {
  /// A remote or registry package download is about to begin.
  fn download_start(&self, _key: &str, _package_addr: &str, _version: Option<&Version>) {}

  /// A module finished installing (or was resolved locally).
  fn module_installed(&self, _key: &str, _version: Option<&Version>, _dir: &Path) {}
}

/// The default hook implementation: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl InstallHooks for NoopHooks {}
