//! Snapshot (de)serialization as archive entries.
//!
//! # Layout
//!
//! Under a caller-chosen prefix:
//!
//! ```text
//! <prefix>modules.json            # index: one record per module {Key, Source, Version, Dir}
//! <prefix>modules/<key>/<name>    # verbatim file bytes, namespaced by manifest key
//! ```
//!
//! The root module's key is the empty string, so its files sit under a
//! trailing-slash-only segment (`modules//main.mp.json`). A module that
//! holds no config files at all gets a directory marker entry instead, so
//! it survives the round trip. Reading restores the index first and then
//! associates files back to their keys; a file with no index record, or an
//! indexed module with neither files nor a marker, is a corruption error
//! with no partial recovery.

use std::io::{Read, Seek, Write};

use tracing::debug;
use zip::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::manifest::Manifest;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotModule};

/// Index entry name, relative to the prefix.
pub const INDEX_ENTRY: &str = "modules.json";

/// Per-module file namespace, relative to the prefix.
pub const MODULES_PREFIX: &str = "modules/";

/// Write `snapshot` into an open archive under `prefix` (empty string or a
/// directory-like prefix ending in `/`).
pub fn write_snapshot<W: Write + Seek>(
  zip: &mut ZipWriter<W>,
  prefix: &str,
  snapshot: &Snapshot,
) -> Result<(), SnapshotError> {
  let options = SimpleFileOptions::default();

  let index = snapshot.to_manifest().to_json().map_err(SnapshotError::Index)?;
  zip.start_file(format!("{}{}", prefix, INDEX_ENTRY), options)?;
  zip.write_all(index.as_bytes())?;

  for (key, module) in snapshot.modules() {
    if module.files.is_empty() {
      // Marker for an explicitly-empty file set.
      zip.add_directory(format!("{}{}{}/", prefix, MODULES_PREFIX, key), options)?;
      continue;
    }
    for (name, bytes) in &module.files {
      zip.start_file(format!("{}{}{}/{}", prefix, MODULES_PREFIX, key, name), options)?;
      zip.write_all(bytes)?;
    }
  }
  debug!(modules = snapshot.len(), prefix, "wrote snapshot entries");
  Ok(())
}

/// Read a snapshot back from an archive written by [`write_snapshot`].
pub fn read_snapshot<R: Read + Seek>(archive: &mut ZipArchive<R>, prefix: &str) -> Result<Snapshot, SnapshotError> {
  let index_name = format!("{}{}", prefix, INDEX_ENTRY);
  let mut index_bytes = Vec::new();
  match archive.by_name(&index_name) {
    Ok(mut entry) => {
      entry.read_to_end(&mut index_bytes)?;
    }
    Err(zip::result::ZipError::FileNotFound) => return Err(SnapshotError::MissingIndex),
    Err(e) => return Err(e.into()),
  }
  let index = Manifest::from_json(&index_bytes).map_err(SnapshotError::Index)?;

  let mut snapshot = Snapshot::new();
  for record in index.records() {
    snapshot.insert(
      record.key.clone(),
      SnapshotModule {
        dir: record.dir.clone(),
        files: Default::default(),
        source_addr: record.source_addr.clone(),
        version: record.version.clone(),
      },
    );
  }

  let files_prefix = format!("{}{}", prefix, MODULES_PREFIX);
  let entry_names: Vec<String> = archive
    .file_names()
    .filter(|name| name.starts_with(&files_prefix))
    .map(str::to_string)
    .collect();

  // Rebuild keyed modules; files must associate back to an index record.
  let mut rebuilt: std::collections::BTreeMap<String, std::collections::BTreeMap<String, Vec<u8>>> =
    Default::default();
  for entry_name in entry_names {
    let rest = &entry_name[files_prefix.len()..];
    let Some((key, file_name)) = rest.split_once('/') else {
      return Err(SnapshotError::UnexpectedFile(entry_name));
    };
    if snapshot.get(key).is_none() {
      return Err(SnapshotError::UnexpectedFile(entry_name));
    }
    if file_name.is_empty() {
      // Directory marker: the module exists and holds no config files.
      rebuilt.entry(key.to_string()).or_default();
      continue;
    }

    let mut bytes = Vec::new();
    archive.by_name(&entry_name)?.read_to_end(&mut bytes)?;
    rebuilt.entry(key.to_string()).or_default().insert(file_name.to_string(), bytes);
  }

  let keys: Vec<String> = snapshot.modules().map(|(key, _)| key.clone()).collect();
  for key in keys {
    let Some(files) = rebuilt.remove(&key) else {
      return Err(SnapshotError::MissingFiles(key));
    };
    let module = snapshot.get(&key).expect("key came from the snapshot");
    let mut module = module.clone();
    module.files = files;
    snapshot.insert(key, module);
  }

  debug!(modules = snapshot.len(), prefix, "read snapshot entries");
  Ok(snapshot)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use std::io::Cursor;
  use std::path::PathBuf;

  fn sample_snapshot() -> Snapshot {
    let mut snapshot = Snapshot::new();
    snapshot.insert(
      String::new(),
      SnapshotModule {
        dir: PathBuf::from("root"),
        files: BTreeMap::from([("main.mp.json".to_string(), br#"{"module":{}}"#.to_vec())]),
        source_addr: String::new(),
        version: None,
      },
    );
    snapshot.insert(
      "x.y".to_string(),
      SnapshotModule {
        dir: PathBuf::from("mods/x.y"),
        files: BTreeMap::from([("main.mp.json".to_string(), b"{}".to_vec())]),
        source_addr: "ns/y/p".to_string(),
        version: Some(semver::Version::new(1, 2, 0)),
      },
    );
    snapshot
  }

  fn to_archive(snapshot: &Snapshot) -> ZipArchive<Cursor<Vec<u8>>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    write_snapshot(&mut zip, "config/", snapshot).unwrap();
    let cursor = zip.finish().unwrap();
    ZipArchive::new(cursor).unwrap()
  }

  #[test]
  fn round_trip_preserves_everything() {
    let snapshot = sample_snapshot();
    let mut archive = to_archive(&snapshot);
    let restored = read_snapshot(&mut archive, "config/").unwrap();
    assert_eq!(snapshot, restored);
    assert_eq!(snapshot.checksum(), restored.checksum());
  }

  #[test]
  fn root_key_uses_empty_segment() {
    let snapshot = sample_snapshot();
    let mut archive = to_archive(&snapshot);
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"config/modules//main.mp.json"));
    assert!(names.contains(&"config/modules/x.y/main.mp.json"));
    drop(names);
    let _ = read_snapshot(&mut archive, "config/").unwrap();
  }

  #[test]
  fn file_without_index_record_is_corrupt() {
    let snapshot = sample_snapshot();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    write_snapshot(&mut zip, "config/", &snapshot).unwrap();
    zip
      .start_file("config/modules/ghost/main.mp.json", SimpleFileOptions::default())
      .unwrap();
    zip.write_all(b"{}").unwrap();
    let cursor = zip.finish().unwrap();

    let mut archive = ZipArchive::new(cursor).unwrap();
    let err = read_snapshot(&mut archive, "config/").unwrap_err();
    assert!(matches!(err, SnapshotError::UnexpectedFile(_)));
  }

  #[test]
  fn empty_module_round_trips() {
    let mut snapshot = sample_snapshot();
    snapshot.insert(
      "empty".to_string(),
      SnapshotModule {
        dir: PathBuf::from("mods/empty"),
        files: BTreeMap::new(),
        source_addr: "./empty".to_string(),
        version: None,
      },
    );

    let mut archive = to_archive(&snapshot);
    let restored = read_snapshot(&mut archive, "config/").unwrap();
    assert_eq!(snapshot, restored);
    assert!(restored.get("empty").unwrap().files.is_empty());
  }

  #[test]
  fn index_record_with_no_entries_is_corrupt() {
    // An index that lists a module the archive holds nothing for, not even
    // an empty-module marker.
    let snapshot = sample_snapshot();
    let index = snapshot.to_manifest().to_json().unwrap();
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.start_file("config/modules.json", SimpleFileOptions::default()).unwrap();
    zip.write_all(index.as_bytes()).unwrap();
    let cursor = zip.finish().unwrap();

    let mut archive = ZipArchive::new(cursor).unwrap();
    let err = read_snapshot(&mut archive, "config/").unwrap_err();
    assert!(matches!(err, SnapshotError::MissingFiles(_)));
  }

  #[test]
  fn missing_index_is_corrupt() {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip
      .start_file("config/modules//main.mp.json", SimpleFileOptions::default())
      .unwrap();
    zip.write_all(b"{}").unwrap();
    let cursor = zip.finish().unwrap();

    let mut archive = ZipArchive::new(cursor).unwrap();
    let err = read_snapshot(&mut archive, "config/").unwrap_err();
    assert!(matches!(err, SnapshotError::MissingIndex));
  }
}
