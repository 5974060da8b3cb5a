//! Implementation of the `modplan show` command.
//!
//! Prints the contents of a saved plan file: change-set header, state
//! presence, and the embedded config snapshot.

use std::path::Path;

use anyhow::{Context, Result};

use modplan_lib::planfile::PlanReader;

pub fn cmd_show(plan: &Path, json: bool) -> Result<()> {
  let mut reader = PlanReader::open(plan).with_context(|| format!("Failed to open plan: {}", plan.display()))?;
  let changes = reader.read_change_set()?;
  let state = reader.read_state()?;
  let snapshot = reader.read_config_snapshot()?;

  if json {
    let modules: Vec<_> = snapshot
      .modules()
      .map(|(key, module)| {
        serde_json::json!({
          "key": key,
          "source": module.source_addr,
          "version": module.version.as_ref().map(ToString::to_string),
          "dir": module.dir.display().to_string(),
          "files": module.files.keys().collect::<Vec<_>>(),
        })
      })
      .collect();
    let doc = serde_json::json!({
      "format_version": changes.format_version,
      "tool_version": changes.tool_version,
      "change_bytes": changes.data.len(),
      "state_bytes": state.as_ref().map(Vec::len),
      "config_checksum": snapshot.checksum(),
      "modules": modules,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    return Ok(());
  }

  println!("Plan: {}", plan.display());
  println!(
    "Created by: modplan {} (change-set format {})",
    changes.tool_version, changes.format_version
  );
  println!("Changes: {} byte(s)", changes.data.len());
  match &state {
    Some(state) => println!("State: {} byte(s)", state.len()),
    None => println!("State: none"),
  }
  println!("Config checksum: {}", snapshot.checksum());
  println!("Modules: {}", snapshot.len());
  for (key, module) in snapshot.modules() {
    let name = if key.is_empty() { "(root)" } else { key.as_str() };
    match &module.version {
      Some(version) => println!("  {} {} ({} file(s))", name, version, module.files.len()),
      None => println!("  {} ({} file(s))", name, module.files.len()),
    }
  }
  Ok(())
}
