//! The no-network config loader.
//!
//! [`load_config`] performs the same depth-first walk as the installer but
//! never fetches and never mutates the manifest: every module call must
//! already have a matching record, and the record must still agree with
//! what the configuration declares. Disagreement is a consistency error
//! with one remedy (re-run installation), not something the loader repairs.
//!
//! The loader reads only through the filesystem capability, so the same
//! code serves "load from disk" and "reopen from snapshot".

use std::path::Path;

use semver::Version;
use tracing::debug;

use crate::config::parser::parse_module_dir;
use crate::config::{Config, Module, ModuleRequest, ModuleWalker, build_config};
use crate::diags::{Diagnostic, Diagnostics};
use crate::fsys::ConfigFs;
use crate::manifest::Manifest;

/// Load the resolved config tree rooted at `root_dir` against an
/// already-populated manifest. Returns the tree (possibly partial) and all
/// problems found in one pass.
pub fn load_config(root_dir: &Path, manifest: &Manifest, fs: &dyn ConfigFs) -> (Option<Config>, Diagnostics) {
  let mut diags = Diagnostics::new();

  let (root, d) = parse_module_dir(fs, root_dir);
  diags.extend(d);
  let Some(root) = root else {
    diags.push(Diagnostic::error(
      "Unreadable root module directory",
      format!("The configuration directory {} does not exist or cannot be read.", root_dir.display()),
    ));
    return (None, diags);
  };

  let mut walker = LoadWalker { manifest, fs };
  let (config, walk_diags) = build_config(root, &mut walker);
  diags.extend(walk_diags);
  (Some(config), diags)
}

struct LoadWalker<'w> {
  manifest: &'w Manifest,
  fs: &'w dyn ConfigFs,
}

impl ModuleWalker for LoadWalker<'_> {
  fn load_module(&mut self, req: &ModuleRequest) -> (Option<Module>, Option<Version>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let key = req.key();

    let Some(record) = self.manifest.get(&key) else {
      diags.push(
        Diagnostic::error(
          "Module not installed",
          format!("Module \"{}\" is not yet installed. Run installation to install all modules.", key),
        )
        .with_subject(req.call.subject()),
      );
      return (None, None, diags);
    };

    // Consistency checks, not repairs: the installer is the only component
    // allowed to change the manifest.
    let current_addr = req.call.source_addr.to_string();
    if record.source_addr != current_addr {
      diags.push(
        Diagnostic::error(
          "Module source has changed",
          format!(
            "The source address of module \"{}\" changed from \"{}\" to \"{}\". Run installation to install the new source.",
            key, record.source_addr, current_addr
          ),
        )
        .with_subject(req.call.subject()),
      );
      return (None, None, diags);
    }
    if let Some(constraint) = &req.call.version {
      let satisfied = record.version.as_ref().is_some_and(|v| constraint.allows(v));
      if !satisfied {
        let installed = record
          .version
          .as_ref()
          .map(Version::to_string)
          .unwrap_or_else(|| "none".to_string());
        diags.push(
          Diagnostic::error(
            "Module version requirements have changed",
            format!(
              "Installed version {} of module \"{}\" does not satisfy the constraint \"{}\". Run installation to install a matching version.",
              installed, key, constraint
            ),
          )
          .with_subject(req.call.subject()),
        );
        return (None, None, diags);
      }
    }

    let (module, d) = parse_module_dir(self.fs, &record.dir);
    diags.extend(d);
    let Some(module) = module else {
      diags.push(
        Diagnostic::error(
          "Unreadable module directory",
          format!(
            "The installed directory {} for module \"{}\" does not exist or cannot be read. Run installation to reinstall it.",
            record.dir.display(),
            key
          ),
        )
        .with_subject(req.call.subject()),
      );
      return (None, None, diags);
    };

    debug!(key, dir = %record.dir.display(), "loaded module");
    (Some(module), record.version.clone(), diags)
  }
}
