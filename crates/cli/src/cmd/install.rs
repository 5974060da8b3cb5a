//! Implementation of the `modplan install` command.
//!
//! Resolves the module tree under the given configuration directory,
//! fetching whatever is missing or outdated into `.modplan/modules`.

use std::path::Path;

use anyhow::{Context, Result, bail};
use semver::Version;

use modplan_lib::install::ModuleInstaller;
use modplan_lib::install::fetch::DirFetcher;
use modplan_lib::install::hooks::InstallHooks;
use modplan_lib::registry::JsonRegistry;

use crate::cmd::modules_dir;
use crate::output;

/// Hooks that narrate fetch progress on stdout.
struct ProgressHooks;

impl InstallHooks for ProgressHooks {
  fn download_start(&self, key: &str, package_addr: &str, version: Option<&Version>) {
    match version {
      Some(version) => println!("Downloading {} {} from {}...", key, version, package_addr),
      None => println!("Downloading {} from {}...", key, package_addr),
    }
  }

  fn module_installed(&self, key: &str, version: Option<&Version>, dir: &Path) {
    match version {
      Some(version) => println!("- {} {} in {}", key, version, dir.display()),
      None => println!("- {} in {}", key, dir.display()),
    }
  }
}

pub fn cmd_install(dir: &Path, upgrade: bool, registry_path: Option<&Path>) -> Result<()> {
  let fetcher = DirFetcher::new(dir);
  let registry = match registry_path {
    Some(path) => Some(
      JsonRegistry::load(path).with_context(|| format!("Failed to read registry index: {}", path.display()))?,
    ),
    None => None,
  };

  let mut installer = ModuleInstaller::new(modules_dir(dir), &fetcher);
  if let Some(registry) = &registry {
    installer = installer.with_registry(registry);
  }

  let (config, diags) = installer.install(dir, upgrade, &ProgressHooks);
  output::print_diagnostics(&diags);
  let Some(config) = config else {
    bail!("installation failed");
  };
  if diags.has_errors() {
    bail!("installation finished with errors");
  }

  let mut count = 0usize;
  config.walk(&mut |_| count += 1);
  output::print_success(&format!("Installed {} module(s)", count - 1));
  Ok(())
}
