//! Read-only filesystem capability for config loading.
//!
//! The loader and parser are written once against [`ConfigFs`] and run
//! unchanged over the real disk ([`OsFs`]) or over a captured snapshot
//! (`snapshot::SnapshotFs`). The trait deliberately carries no mutating
//! operations: a snapshot is an immutable point-in-time artifact, and
//! read-only-ness is enforced by construction rather than by runtime
//! rejection.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// The read operations config loading needs: open a file by path, test for
/// a directory, and list a directory's plain files by name.
pub trait ConfigFs {
  fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
  fn is_dir(&self, path: &Path) -> bool;
  /// File names (not paths) of the regular files directly in `path`, sorted.
  fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// The real-disk implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl ConfigFs for OsFs {
  fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
    fs::read(path)
  }

  fn is_dir(&self, path: &Path) -> bool {
    path.is_dir()
  }

  fn list_dir(&self, path: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(path)? {
      let entry = entry?;
      if entry.file_type()?.is_file()
        && let Some(name) = entry.file_name().to_str()
      {
        names.push(name.to_string());
      }
    }
    names.sort();
    Ok(names)
  }
}

/// Lexically normalize a path: drop `.` components and resolve `..` against
/// earlier components without touching the filesystem. Used for joining a
/// local module's relative source onto its parent directory, and for
/// comparing recorded module directories against lookup paths.
pub fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        if !out.pop() {
          out.push("..");
        }
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

/// Join a relative module source onto its parent directory, normalized.
pub fn join_module_dir(parent_dir: &Path, relative: &str) -> PathBuf {
  normalize(&parent_dir.join(relative))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn normalize_resolves_dots() {
    assert_eq!(normalize(Path::new("a/./b/../c")), PathBuf::from("a/c"));
    assert_eq!(normalize(Path::new("./x")), PathBuf::from("x"));
    assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
  }

  #[test]
  fn join_module_dir_applies_relative_source() {
    let dir = join_module_dir(Path::new("/cfg/root"), "../shared/net");
    assert_eq!(dir, PathBuf::from("/cfg/shared/net"));
  }

  #[test]
  fn os_fs_lists_only_files() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("b.mp.json"), "{}").unwrap();
    fs::write(temp.path().join("a.mp.json"), "{}").unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();

    let names = OsFs.list_dir(temp.path()).unwrap();
    assert_eq!(names, vec!["a.mp.json".to_string(), "b.mp.json".to_string()]);
  }
}
