//! End-to-end installer behavior: the reuse/replace decision table,
//! cascading invalidation, and idempotence.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use modplan_lib::install::ModuleInstaller;
use modplan_lib::install::hooks::{InstallHooks, NoopHooks};
use modplan_lib::manifest::Manifest;
use semver::Version;
use tempfile::TempDir;

use common::{CountingFetcher, registry_with, write_config, write_package};

struct Env {
  temp: TempDir,
  root: PathBuf,
  mods_dir: PathBuf,
}

impl Env {
  fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("root");
    let mods_dir = temp.path().join("mods");
    Self { temp, root, mods_dir }
  }

  fn manifest(&self) -> Manifest {
    Manifest::load(&self.mods_dir.join("manifest.json")).unwrap()
  }
}

/// The two-level scenario: a local module `x` that calls a registry
/// module `y`.
fn scenario_env() -> Env {
  let env = Env::new();
  write_config(&env.root, r#"{"module": {"x": {"source": "./x"}}}"#);
  write_config(
    &env.root.join("x"),
    r#"{"module": {"y": {"source": "registry/ns/y/p", "version": ">=1.0.0"}}}"#,
  );
  write_package(&env.temp.path().join("pkgs"), "y-1.5.0", r#"{"kind": "y"}"#);
  write_package(&env.temp.path().join("pkgs"), "y-2.1.0", r#"{"kind": "y"}"#);
  env
}

#[test]
fn first_install_records_every_key() {
  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());
  let registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0")]);

  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&registry);
  let (config, diags) = installer.install(&env.root, false, &NoopHooks);

  assert!(!diags.has_errors(), "{:?}", diags);
  let config = config.unwrap();
  assert!(config.descendant("x.y").is_some());

  let manifest = env.manifest();
  assert_eq!(manifest.len(), 3);
  assert!(manifest.get("").is_some());
  assert_eq!(manifest.get("x").unwrap().version, None);

  let y = manifest.get("x.y").unwrap();
  assert_eq!(y.version, Some(Version::new(1, 5, 0)));
  assert_ne!(y.dir, manifest.get("x").unwrap().dir);
  assert!(y.dir.join("main.mp.json").is_file());
  assert_eq!(fetcher.calls(), 1);
}

#[test]
fn second_install_is_idempotent_with_zero_fetches() {
  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());
  let registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0")]);
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&registry);

  let (_, diags) = installer.install(&env.root, false, &NoopHooks);
  assert!(!diags.has_errors(), "{:?}", diags);
  let first_manifest = fs::read_to_string(env.mods_dir.join("manifest.json")).unwrap();
  assert_eq!(fetcher.calls(), 1);

  let (_, diags) = installer.install(&env.root, false, &NoopHooks);
  assert!(!diags.has_errors(), "{:?}", diags);
  let second_manifest = fs::read_to_string(env.mods_dir.join("manifest.json")).unwrap();

  assert_eq!(fetcher.calls(), 1, "second run must not fetch");
  assert_eq!(first_manifest, second_manifest);
}

#[test]
fn satisfied_constraint_is_not_proactively_upgraded() {
  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());

  let old_registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0")]);
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&old_registry);
  installer.install(&env.root, false, &NoopHooks);
  assert_eq!(fetcher.calls(), 1);

  // 2.1.0 has since become available, but 1.5.0 still satisfies >=1.0.0.
  let new_registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0"), ("2.1.0", "file:pkgs/y-2.1.0")]);
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&new_registry);
  let (_, diags) = installer.install(&env.root, false, &NoopHooks);

  assert!(!diags.has_errors(), "{:?}", diags);
  assert_eq!(fetcher.calls(), 1, "satisfied constraint must be reused");
  assert_eq!(env.manifest().get("x.y").unwrap().version, Some(Version::new(1, 5, 0)));
}

#[test]
fn tightened_constraint_triggers_exactly_one_fetch() {
  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());
  let registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0"), ("2.1.0", "file:pkgs/y-2.1.0")]);

  // Pin to 1.x first so 1.5.0 is what gets installed.
  write_config(
    &env.root.join("x"),
    r#"{"module": {"y": {"source": "registry/ns/y/p", "version": ">=1.0.0, <2.0.0"}}}"#,
  );
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&registry);
  installer.install(&env.root, false, &NoopHooks);
  assert_eq!(fetcher.calls(), 1);

  write_config(
    &env.root.join("x"),
    r#"{"module": {"y": {"source": "registry/ns/y/p", "version": ">=2.0.0"}}}"#,
  );
  let (_, diags) = installer.install(&env.root, false, &NoopHooks);

  assert!(!diags.has_errors(), "{:?}", diags);
  assert_eq!(fetcher.calls(), 2, "exactly one additional fetch, for x.y only");
  assert_eq!(env.manifest().get("x.y").unwrap().version, Some(Version::new(2, 1, 0)));
}

#[test]
fn upgrade_flag_forces_reinstall() {
  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());
  let registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0")]);
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&registry);

  installer.install(&env.root, false, &NoopHooks);
  let (_, diags) = installer.install(&env.root, true, &NoopHooks);

  assert!(!diags.has_errors(), "{:?}", diags);
  assert_eq!(fetcher.calls(), 2);
}

#[test]
fn changed_source_cascades_to_descendants() {
  let env = Env::new();
  write_config(&env.root, r#"{"module": {"a": {"source": "./a"}}}"#);
  write_config(&env.root.join("a"), r#"{"module": {"b": {"source": "./b"}}}"#);
  write_config(&env.root.join("a/b"), r#"{"module": {"c": {"source": "./c"}}}"#);
  write_config(&env.root.join("a/b/c"), "{}");

  let fetcher = CountingFetcher::new(env.temp.path());
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher);
  let (_, diags) = installer.install(&env.root, false, &NoopHooks);
  assert!(!diags.has_errors(), "{:?}", diags);

  let manifest = env.manifest();
  for key in ["a", "a.b", "a.b.c"] {
    assert!(manifest.get(key).is_some(), "missing record for {}", key);
  }
  let old_b_dir = manifest.get("a.b").unwrap().dir.clone();

  // Same tree under a different source address for `a`.
  let a2 = env.root.join("a2");
  write_config(&a2, r#"{"module": {"b": {"source": "./b"}}}"#);
  write_config(&a2.join("b"), r#"{"module": {"c": {"source": "./c"}}}"#);
  write_config(&a2.join("b/c"), "{}");
  write_config(&env.root, r#"{"module": {"a": {"source": "./a2"}}}"#);

  let (_, diags) = installer.install(&env.root, false, &NoopHooks);
  assert!(!diags.has_errors(), "{:?}", diags);

  let manifest = env.manifest();
  assert_eq!(manifest.get("a").unwrap().source_addr, "./a2");
  let new_b_dir = manifest.get("a.b").unwrap().dir.clone();
  assert_ne!(new_b_dir, old_b_dir, "descendant must not reuse its old directory");
  assert!(manifest.get("a.b.c").unwrap().dir.starts_with(&a2));
}

#[test]
fn version_constraint_on_local_module_is_a_config_error() {
  let env = Env::new();
  write_config(&env.root, r#"{"module": {"x": {"source": "./x", "version": ">=1.0.0"}}}"#);
  write_config(&env.root.join("x"), "{}");

  let fetcher = CountingFetcher::new(env.temp.path());
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher);
  let (config, diags) = installer.install(&env.root, false, &NoopHooks);

  assert!(diags.has_errors());
  assert!(diags.iter().any(|d| d.summary == "Invalid version constraint"));
  // The subtree is skipped, the walk itself completes.
  assert!(config.unwrap().children.is_empty());
}

#[test]
fn failed_sibling_does_not_block_others() {
  let env = Env::new();
  write_config(
    &env.root,
    r#"{"module": {"bad": {"source": "./absent"}, "good": {"source": "./good"}}}"#,
  );
  write_config(&env.root.join("good"), "{}");

  let fetcher = CountingFetcher::new(env.temp.path());
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher);
  let (config, diags) = installer.install(&env.root, false, &NoopHooks);

  assert!(diags.has_errors());
  let config = config.unwrap();
  assert!(config.children.contains_key("good"));
  assert!(!config.children.contains_key("bad"));
  // The good sibling's record was still persisted.
  assert!(env.manifest().get("good").is_some());
}

#[test]
fn hooks_observe_downloads_and_installs() {
  #[derive(Default)]
  struct RecordingHooks {
    events: Mutex<Vec<String>>,
  }

  impl InstallHooks for RecordingHooks {
    fn download_start(&self, key: &str, package_addr: &str, version: Option<&Version>) {
      self.events.lock().unwrap().push(format!(
        "download {} {} {}",
        key,
        package_addr,
        version.map(Version::to_string).unwrap_or_default()
      ));
    }

    fn module_installed(&self, key: &str, _version: Option<&Version>, _dir: &Path) {
      self.events.lock().unwrap().push(format!("installed {}", key));
    }
  }

  let env = scenario_env();
  let fetcher = CountingFetcher::new(env.temp.path());
  let registry = registry_with(&[("1.5.0", "file:pkgs/y-1.5.0")]);
  let installer = ModuleInstaller::new(&env.mods_dir, &fetcher).with_registry(&registry);

  let hooks = RecordingHooks::default();
  let (_, diags) = installer.install(&env.root, false, &hooks);
  assert!(!diags.has_errors(), "{:?}", diags);

  let events = hooks.events.lock().unwrap();
  assert!(events.contains(&"installed x".to_string()));
  assert!(events.contains(&"download x.y file:pkgs/y-1.5.0 1.5.0".to_string()));
  assert!(events.contains(&"installed x.y".to_string()));
}
