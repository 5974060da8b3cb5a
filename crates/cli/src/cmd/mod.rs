mod install;
mod show;
mod validate;

pub use install::cmd_install;
pub use show::cmd_show;
pub use validate::cmd_validate;

use std::path::{Path, PathBuf};

/// Where installed modules and the manifest live, relative to the root
/// configuration directory.
pub fn modules_dir(root: &Path) -> PathBuf {
  root.join(".modplan").join("modules")
}
