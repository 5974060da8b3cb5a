//! Package fetching for module installation.
//!
//! The installer only needs one capability: materialize the package at a
//! given address into a destination directory. Transports (HTTP, VCS,
//! object stores) live behind [`PackageFetcher`] outside this crate.
//! [`DirFetcher`] is the in-tree implementation for `file:` and plain-path
//! package addresses, copying a local directory tree; it is what local
//! package mirrors and the test suite use.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Materializes the package at `package_addr` into `dest`.
pub trait PackageFetcher {
  fn fetch(&self, package_addr: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Errors from fetching a package.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("unsupported package address '{0}'")]
  UnsupportedAddress(String),

  #[error("package source directory does not exist: {0}")]
  SourceNotFound(PathBuf),

  #[error("failed to create directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to copy '{path}': {source}")]
  Copy {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to walk package directory: {0}")]
  Walk(#[source] walkdir::Error),
}

/// Copies local directory packages. Addresses may be `file:<path>` or a
/// bare path; relative paths resolve against the fetcher's base directory.
#[derive(Debug, Clone)]
pub struct DirFetcher {
  base_dir: PathBuf,
}

impl DirFetcher {
  pub fn new(base_dir: impl Into<PathBuf>) -> Self {
    Self {
      base_dir: base_dir.into(),
    }
  }

  fn resolve(&self, package_addr: &str) -> Result<PathBuf, FetchError> {
    if package_addr.contains("://") {
      // A scheme'd URL needs a real transport; this fetcher has none.
      return Err(FetchError::UnsupportedAddress(package_addr.to_string()));
    }
    let raw = package_addr.strip_prefix("file:").unwrap_or(package_addr);
    let path = Path::new(raw);
    if path.is_absolute() {
      // Strip verbatim prefixes so recorded directories stay comparable.
      Ok(dunce::simplified(path).to_path_buf())
    } else {
      Ok(self.base_dir.join(path))
    }
  }
}

impl PackageFetcher for DirFetcher {
  fn fetch(&self, package_addr: &str, dest: &Path) -> Result<(), FetchError> {
    let src = self.resolve(package_addr)?;
    if !src.is_dir() {
      return Err(FetchError::SourceNotFound(src));
    }

    debug!(src = %src.display(), dest = %dest.display(), "copying package");
    fs::create_dir_all(dest).map_err(|source| FetchError::CreateDir {
      path: dest.to_path_buf(),
      source,
    })?;

    for entry in WalkDir::new(&src).sort_by_file_name() {
      let entry = entry.map_err(FetchError::Walk)?;
      let rel = entry.path().strip_prefix(&src).expect("walked path under src");
      if rel.as_os_str().is_empty() {
        continue;
      }
      let target = dest.join(rel);
      if entry.file_type().is_dir() {
        fs::create_dir_all(&target).map_err(|source| FetchError::CreateDir {
          path: target.clone(),
          source,
        })?;
      } else if entry.file_type().is_file() {
        fs::copy(entry.path(), &target).map_err(|source| FetchError::Copy {
          path: entry.path().to_path_buf(),
          source,
        })?;
      }
      // Symlinks and special files are not part of a package's config
      // surface; skip them.
    }
    Ok(())
  }
}
