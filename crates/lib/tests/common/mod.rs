//! Shared helpers for installer and snapshot integration tests.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};

use modplan_lib::install::fetch::{DirFetcher, FetchError, PackageFetcher};
use modplan_lib::registry::JsonRegistry;
use semver::Version;

/// Write a module configuration document, creating the directory.
pub fn write_config(dir: &Path, content: &str) {
  fs::create_dir_all(dir).unwrap();
  fs::write(dir.join("main.mp.json"), content).unwrap();
}

/// Create a package directory holding a single config document, for the
/// local registry to hand out.
pub fn write_package(packages_dir: &Path, name: &str, content: &str) -> PathBuf {
  let pkg = packages_dir.join(name);
  write_config(&pkg, content);
  pkg
}

/// A fetcher that counts its calls, for idempotence assertions.
pub struct CountingFetcher {
  inner: DirFetcher,
  calls: Cell<usize>,
}

impl CountingFetcher {
  pub fn new(base_dir: &Path) -> Self {
    Self {
      inner: DirFetcher::new(base_dir),
      calls: Cell::new(0),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.get()
  }
}

impl PackageFetcher for CountingFetcher {
  fn fetch(&self, package_addr: &str, dest: &Path) -> Result<(), FetchError> {
    self.calls.set(self.calls.get() + 1);
    self.inner.fetch(package_addr, dest)
  }
}

/// A registry index mapping `ns/y/p` to local package addresses.
pub fn registry_with(versions: &[(&str, &str)]) -> JsonRegistry {
  JsonRegistry::from_entries(versions.iter().map(|(version, addr)| {
    (
      "ns/y/p".to_string(),
      Version::parse(version).unwrap(),
      addr.to_string(),
    )
  }))
}
