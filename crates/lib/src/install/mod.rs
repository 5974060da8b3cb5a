//! The module resolver/installer.
//!
//! [`ModuleInstaller::install`] walks the module-call tree depth-first from
//! a root configuration directory, deciding per module whether to reuse an
//! installed copy, resolve a local path, or fetch a package, and records
//! the outcome in the manifest. The walk is deliberately single-threaded
//! and strictly sequential: a child's source address is only known once its
//! parent package has been materialized and parsed, so fetches happen
//! synchronously before recursion.
//!
//! A module is replaced (its manifest record pruned, cascading to every
//! descendant) when any of these hold:
//! - the `upgrade` flag is set,
//! - no record exists for its key,
//! - the recorded source address differs from the current declaration,
//! - the recorded version no longer satisfies the current constraint.
//!
//! Otherwise the recorded directory is parsed directly and no network
//! access occurs. A version that still satisfies its constraint is reused
//! even when a newer satisfying version exists; there is no proactive
//! upgrade without the flag.
//!
//! # Modules
//!
//! - [`fetch`] - The package-fetch capability and the local-directory
//!   fetcher
//! - [`hooks`] - Synchronous progress hooks

pub mod fetch;
pub mod hooks;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::addrs::{SourceAddr, split_package_subdir};
use crate::config::parser::parse_module_dir;
use crate::config::{Config, Module, ModuleRequest, ModuleWalker, build_config};
use crate::diags::{Diagnostic, Diagnostics};
use crate::fsys::{ConfigFs, OsFs, join_module_dir};
use crate::manifest::{MANIFEST_FILENAME, Manifest, ManifestRecord};
use crate::registry::ModuleRegistry;

use fetch::PackageFetcher;
use hooks::InstallHooks;
use semver::Version;

/// Installs a configuration's module tree into a modules directory.
pub struct ModuleInstaller<'a> {
  mods_dir: PathBuf,
  fetcher: &'a dyn PackageFetcher,
  registry: Option<&'a dyn ModuleRegistry>,
}

impl<'a> ModuleInstaller<'a> {
  pub fn new(mods_dir: impl Into<PathBuf>, fetcher: &'a dyn PackageFetcher) -> Self {
    Self {
      mods_dir: mods_dir.into(),
      fetcher,
      registry: None,
    }
  }

  /// Attach a registry capability. Without one, registry-sourced modules
  /// fail with a configuration diagnostic at install time.
  pub fn with_registry(mut self, registry: &'a dyn ModuleRegistry) -> Self {
    self.registry = Some(registry);
    self
  }

  /// Path of the manifest snapshot file this installer reads and writes.
  pub fn manifest_path(&self) -> PathBuf {
    self.mods_dir.join(MANIFEST_FILENAME)
  }

  /// Resolve and install the module tree rooted at `root_dir`.
  ///
  /// Returns the resolved config tree (possibly partial when diagnostics
  /// carry errors) and every problem found in one pass. The manifest is
  /// persisted exactly once on the way out, even after a partial pass:
  /// records are only ever written for modules that finished resolving, so
  /// a partial manifest is safe to reuse.
  pub fn install(&self, root_dir: &Path, upgrade: bool, hooks: &dyn InstallHooks) -> (Option<Config>, Diagnostics) {
    let mut diags = Diagnostics::new();
    info!(root = %root_dir.display(), upgrade, "installing modules");

    let (root, d) = parse_module_dir(&OsFs, root_dir);
    diags.extend(d);
    let Some(root) = root else {
      diags.push(Diagnostic::error(
        "Unreadable root module directory",
        format!("The configuration directory {} does not exist or cannot be read.", root_dir.display()),
      ));
      return (None, diags);
    };

    let mut manifest = match Manifest::load(&self.manifest_path()) {
      Ok(manifest) => manifest,
      Err(e) => {
        diags.push(Diagnostic::error(
          "Failed to read modules manifest",
          format!("Error reading {}: {}.", self.manifest_path().display(), e),
        ));
        return (None, diags);
      }
    };

    // The root is recorded unconditionally before the walk so local child
    // modules have a parent directory to resolve against.
    manifest.insert(ManifestRecord {
      key: String::new(),
      source_addr: String::new(),
      version: None,
      dir: root_dir.to_path_buf(),
    });

    let mut walker = InstallWalker {
      mods_dir: &self.mods_dir,
      fetcher: self.fetcher,
      registry: self.registry,
      manifest: &mut manifest,
      upgrade,
      hooks,
    };
    let (config, walk_diags) = build_config(root, &mut walker);
    diags.extend(walk_diags);

    if let Err(e) = fs::create_dir_all(&self.mods_dir) {
      diags.push(Diagnostic::error(
        "Failed to create modules directory",
        format!("Error creating {}: {}.", self.mods_dir.display(), e),
      ));
      return (Some(config), diags);
    }
    if let Err(e) = manifest.save(&self.manifest_path()) {
      diags.push(Diagnostic::error(
        "Failed to write modules manifest",
        format!("Error writing {}: {}.", self.manifest_path().display(), e),
      ));
    }

    (Some(config), diags)
  }
}

struct InstallWalker<'w> {
  mods_dir: &'w Path,
  fetcher: &'w dyn PackageFetcher,
  registry: Option<&'w dyn ModuleRegistry>,
  manifest: &'w mut Manifest,
  upgrade: bool,
  hooks: &'w dyn InstallHooks,
}

impl InstallWalker<'_> {
  fn needs_replace(&self, key: &str, req: &ModuleRequest) -> bool {
    if self.upgrade {
      return true;
    }
    let Some(record) = self.manifest.get(key) else {
      debug!(key, "not yet installed");
      return true;
    };
    let current_addr = req.call.source_addr.to_string();
    if record.source_addr != current_addr {
      debug!(key, old = %record.source_addr, new = %current_addr, "source address changed");
      return true;
    }
    if let (Some(version), Some(constraint)) = (&record.version, &req.call.version)
      && !constraint.allows(version)
    {
      debug!(key, version = %version, constraint = %constraint, "version no longer satisfies constraint");
      return true;
    }
    false
  }

  fn install_package(
    &mut self,
    key: &str,
    req: &ModuleRequest,
    package_addr: &str,
    version: Option<Version>,
    diags: &mut Diagnostics,
  ) -> (Option<Module>, Option<Version>) {
    let (package_addr, subdir) = split_package_subdir(package_addr);
    let inst_path = self.mods_dir.join(key);

    // Clean any stale remnants of a previous install before extracting.
    if let Err(e) = remove_dir_if_present(&inst_path) {
      diags.push(
        Diagnostic::error(
          "Failed to remove stale module directory",
          format!("Error removing {} prior to reinstall: {}.", inst_path.display(), e),
        )
        .with_subject(req.call.subject()),
      );
      return (None, None);
    }

    self.hooks.download_start(key, package_addr, version.as_ref());
    if let Err(e) = self.fetcher.fetch(package_addr, &inst_path) {
      diags.push(
        Diagnostic::error("Failed to fetch module package", format!("{}.", e)).with_subject(req.call.subject()),
      );
      return (None, None);
    }

    let module_dir = match subdir {
      Some(subdir) => inst_path.join(subdir),
      None => inst_path,
    };
    let (module, d) = parse_module_dir(&OsFs, &module_dir);
    diags.extend(d);
    let Some(module) = module else {
      diags.push(
        Diagnostic::error(
          "Unreadable module directory",
          format!("The fetched package does not contain a module at {}.", module_dir.display()),
        )
        .with_subject(req.call.subject()),
      );
      return (None, None);
    };

    self.manifest.insert(ManifestRecord {
      key: key.to_string(),
      source_addr: req.call.source_addr.to_string(),
      version: version.clone(),
      dir: module_dir.clone(),
    });
    self.hooks.module_installed(key, version.as_ref(), &module_dir);
    info!(key, dir = %module_dir.display(), "installed module package");
    (Some(module), version)
  }
}

impl ModuleWalker for InstallWalker<'_> {
  fn load_module(&mut self, req: &ModuleRequest) -> (Option<Module>, Option<Version>, Diagnostics) {
    let mut diags = Diagnostics::new();
    let key = req.key();
    debug!(key, source = %req.call.source, "resolving module call");

    if self.needs_replace(&key, req) {
      // Stale descendant records must never be reused against a different
      // parent package.
      self.manifest.prune(&key);
    }

    if let Some(record) = self.manifest.get(&key)
      && OsFs.is_dir(&record.dir)
    {
      let version = record.version.clone();
      let dir = record.dir.clone();
      let (module, d) = parse_module_dir(&OsFs, &dir);
      diags.extend(d);
      match module {
        Some(module) => {
          debug!(key, dir = %dir.display(), "reusing installed module");
          return (Some(module), version, diags);
        }
        None => {
          diags.push(
            Diagnostic::error(
              "Unreadable module directory",
              format!("The installed module directory {} cannot be read.", dir.display()),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        }
      }
    }

    match &req.call.source_addr {
      SourceAddr::Local { relative_path } => {
        if req.call.version.is_some() {
          diags.push(
            Diagnostic::error(
              "Invalid version constraint",
              format!(
                "Module \"{}\" has the local source address \"{}\"; local modules are not versioned.",
                req.call.name, req.call.source
              ),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        }

        let Some(parent) = self.manifest.get(&req.parent_key()) else {
          // The walk records every parent before descending, so this only
          // happens if the manifest was mutated underneath us.
          diags.push(
            Diagnostic::error(
              "Missing parent module record",
              format!("No manifest record for the parent of \"{}\".", key),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        };

        let dir = join_module_dir(&parent.dir, relative_path);
        let (module, d) = parse_module_dir(&OsFs, &dir);
        diags.extend(d);
        let Some(module) = module else {
          diags.push(
            Diagnostic::error(
              "Unreadable module directory",
              format!("The module directory {} does not exist or cannot be read.", dir.display()),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        };

        self.manifest.insert(ManifestRecord {
          key: key.clone(),
          source_addr: req.call.source_addr.to_string(),
          version: None,
          dir: dir.clone(),
        });
        self.hooks.module_installed(&key, None, &dir);
        debug!(key, dir = %dir.display(), "resolved local module");
        (Some(module), None, diags)
      }

      SourceAddr::Registry(reg) => {
        let Some(registry) = self.registry else {
          diags.push(
            Diagnostic::error(
              "Registry not configured",
              format!("Module \"{}\" uses registry address \"{}\" but no registry is available.", req.call.name, reg),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        };

        let (package_addr, version) = match registry.resolve(reg, req.call.version.as_ref()) {
          Ok(resolved) => resolved,
          Err(e) => {
            diags.push(
              Diagnostic::error("Failed to resolve module from registry", format!("{}.", e))
                .with_subject(req.call.subject()),
            );
            return (None, None, diags);
          }
        };

        let (module, version) = self.install_package(&key, req, &package_addr, Some(version), &mut diags);
        (module, version, diags)
      }

      SourceAddr::Remote(rem) => {
        if req.call.version.is_some() {
          diags.push(
            Diagnostic::error(
              "Invalid version constraint",
              format!(
                "Module \"{}\" has the direct package address \"{}\"; version constraints require a registry source.",
                req.call.name, req.call.source
              ),
            )
            .with_subject(req.call.subject()),
          );
          return (None, None, diags);
        }

        let addr = rem.to_string();
        let (module, version) = self.install_package(&key, req, &addr, None, &mut diags);
        (module, version, diags)
      }
    }
  }
}

fn remove_dir_if_present(path: &Path) -> io::Result<()> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e),
  }
}
