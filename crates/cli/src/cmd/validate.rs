//! Implementation of the `modplan validate` command.
//!
//! Loads the configuration against the installed-modules manifest with no
//! fetching; any disagreement between the two is reported as an error.

use std::path::Path;

use anyhow::{Context, Result, bail};

use modplan_lib::fsys::OsFs;
use modplan_lib::loader::load_config;
use modplan_lib::manifest::{MANIFEST_FILENAME, Manifest};

use crate::cmd::modules_dir;
use crate::output;

pub fn cmd_validate(dir: &Path) -> Result<()> {
  let manifest_path = modules_dir(dir).join(MANIFEST_FILENAME);
  let manifest =
    Manifest::load(&manifest_path).with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;

  let (config, diags) = load_config(dir, &manifest, &OsFs);
  output::print_diagnostics(&diags);
  let Some(config) = config else {
    bail!("configuration is not loadable");
  };
  if diags.has_errors() {
    bail!("configuration is not consistent with installed modules");
  }

  let mut count = 0usize;
  config.walk(&mut |_| count += 1);
  output::print_success(&format!("Configuration is valid ({} module(s))", count));
  Ok(())
}
