//! The read-only virtual filesystem over a snapshot.
//!
//! [`SnapshotFs`] implements the filesystem capability the loader and
//! parser need, backed entirely by captured bytes: a path that names a
//! module's directory lists that module's file names; any other path is
//! resolved by treating its parent as a module directory and its final
//! component as a file name within it. The capability trait carries no
//! mutating operations, so a snapshot cannot be altered through this
//! adapter by construction.

use std::io;
use std::path::Path;

use crate::fsys::ConfigFs;
use crate::snapshot::Snapshot;

/// A `ConfigFs` backed by a [`Snapshot`] instead of the real disk.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFs<'a> {
  snapshot: &'a Snapshot,
}

impl<'a> SnapshotFs<'a> {
  pub fn new(snapshot: &'a Snapshot) -> Self {
    Self { snapshot }
  }
}

impl ConfigFs for SnapshotFs<'_> {
  fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
    let parent = path
      .parent()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no module contains {}", path.display())))?;
    let Some((key, module)) = self.snapshot.module_by_dir(parent) else {
      return Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} is not within any snapshotted module directory", path.display()),
      ));
    };
    let name = path
      .file_name()
      .and_then(|name| name.to_str())
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid file name in {}", path.display())))?;
    match module.files.get(name) {
      Some(bytes) => Ok(bytes.clone()),
      None => Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("missing source file '{}' in snapshot of module '{}'", name, key),
      )),
    }
  }

  fn is_dir(&self, path: &Path) -> bool {
    self.snapshot.module_by_dir(path).is_some()
  }

  fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
    match self.snapshot.module_by_dir(path) {
      Some((_, module)) => Ok(module.files.keys().cloned().collect()),
      None => Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} is not a snapshotted module directory", path.display()),
      )),
    }
  }
}
