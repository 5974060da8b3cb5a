//! Parsed modules and the shared module-call walk.
//!
//! Both the installer and the loader build the same static [`Config`] tree;
//! they differ only in how each child module is obtained (fetch vs. reuse
//! vs. verify). That difference lives behind the [`ModuleWalker`] trait, so
//! the depth-first walk itself is written once.
//!
//! # Modules
//!
//! - [`parser`] - Parsing of `*.mp.json` module files via the filesystem
//!   capability

pub mod parser;

use std::collections::BTreeMap;
use std::path::PathBuf;

use semver::Version;

use crate::addrs::{SourceAddr, VersionConstraint};
use crate::diags::Diagnostics;

/// One `module` block: a call from a parent module to a child.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleCall {
  /// Call name, unique among the parent's calls.
  pub name: String,
  /// Raw source string as written in configuration.
  pub source: String,
  /// Classified form of `source`.
  pub source_addr: SourceAddr,
  /// Optional version constraint; only meaningful for registry sources.
  pub version: Option<VersionConstraint>,
  /// File that declared this call, for diagnostics.
  pub decl_file: String,
}

impl ModuleCall {
  /// Diagnostic subject naming the declaring file and call.
  pub fn subject(&self) -> String {
    format!("{}: module \"{}\"", self.decl_file, self.name)
  }
}

/// A parsed module: the contents of one configuration directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
  /// Directory the module was parsed from.
  pub dir: PathBuf,
  /// Child module calls, keyed by call name.
  pub calls: BTreeMap<String, ModuleCall>,
  /// Top-level attributes other than `module`, kept opaquely.
  pub attrs: BTreeMap<String, serde_json::Value>,
  /// Names of every file the parser opened in `dir`. The snapshot
  /// completeness invariant is defined over this list.
  pub files: Vec<String>,
}

/// A node in the resolved static configuration tree. Never mutated after
/// construction; a re-resolve discards and rebuilds the whole tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// Call names from the root down to this node; empty for the root.
  pub path: Vec<String>,
  /// Source address this node was reached through; `None` for the root.
  pub source_addr: Option<SourceAddr>,
  /// Concrete version the walker resolved, when the source is versioned.
  pub version: Option<Version>,
  pub module: Module,
  pub children: BTreeMap<String, Config>,
}

impl Config {
  /// Manifest key for this node (`""` for the root).
  pub fn key(&self) -> String {
    self.path.join(".")
  }

  /// Visit this node and every descendant, depth-first.
  pub fn walk(&self, visit: &mut dyn FnMut(&Config)) {
    visit(self);
    for child in self.children.values() {
      child.walk(visit);
    }
  }

  /// Find a descendant by manifest key.
  pub fn descendant(&self, key: &str) -> Option<&Config> {
    if key.is_empty() {
      return Some(self);
    }
    let mut node = self;
    for name in key.split('.') {
      node = node.children.get(name)?;
    }
    Some(node)
  }
}

/// One step of the walk: a module call in context.
#[derive(Debug)]
pub struct ModuleRequest<'a> {
  /// Full call path of the requested module, including its own name.
  pub path: Vec<String>,
  pub call: &'a ModuleCall,
}

impl ModuleRequest<'_> {
  pub fn key(&self) -> String {
    self.path.join(".")
  }

  pub fn parent_key(&self) -> String {
    self.path[..self.path.len() - 1].join(".")
  }
}

/// Supplies each child module during the walk. Returning `None` for the
/// module aborts recursion into that subtree only; diagnostics explain why.
pub trait ModuleWalker {
  fn load_module(&mut self, req: &ModuleRequest) -> (Option<Module>, Option<Version>, Diagnostics);
}

/// Build the static config tree from an already-parsed root module,
/// obtaining every descendant through `walker`. Sibling subtrees are
/// independent: a failed module does not stop its siblings from being
/// visited, so the caller sees as many problems as possible in one pass.
pub fn build_config(root: Module, walker: &mut dyn ModuleWalker) -> (Config, Diagnostics) {
  let mut diags = Diagnostics::new();
  let children = build_children(&root, &[], walker, &mut diags);
  (
    Config {
      path: Vec::new(),
      source_addr: None,
      version: None,
      module: root,
      children,
    },
    diags,
  )
}

fn build_children(
  parent: &Module,
  path: &[String],
  walker: &mut dyn ModuleWalker,
  diags: &mut Diagnostics,
) -> BTreeMap<String, Config> {
  let mut children = BTreeMap::new();
  for (name, call) in &parent.calls {
    let mut child_path = path.to_vec();
    child_path.push(name.clone());

    let req = ModuleRequest {
      path: child_path.clone(),
      call,
    };
    let (module, version, d) = walker.load_module(&req);
    diags.extend(d);

    let Some(module) = module else {
      continue;
    };
    let grandchildren = build_children(&module, &child_path, walker, diags);
    children.insert(
      name.clone(),
      Config {
        path: child_path,
        source_addr: Some(call.source_addr.clone()),
        version,
        module,
        children: grandchildren,
      },
    );
  }
  children
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diags::Diagnostic;

  fn module_with_calls(dir: &str, calls: &[&str]) -> Module {
    let calls = calls
      .iter()
      .map(|name| {
        (
          name.to_string(),
          ModuleCall {
            name: name.to_string(),
            source: format!("./{}", name),
            source_addr: SourceAddr::parse(&format!("./{}", name)),
            version: None,
            decl_file: "main.mp.json".to_string(),
          },
        )
      })
      .collect();
    Module {
      dir: PathBuf::from(dir),
      calls,
      attrs: BTreeMap::new(),
      files: vec!["main.mp.json".to_string()],
    }
  }

  struct StaticWalker {
    fail: Vec<String>,
  }

  impl ModuleWalker for StaticWalker {
    fn load_module(&mut self, req: &ModuleRequest) -> (Option<Module>, Option<Version>, Diagnostics) {
      if self.fail.contains(&req.key()) {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("Unreadable module directory", req.key()));
        return (None, None, diags);
      }
      (Some(module_with_calls(&req.key(), &[])), None, Diagnostics::new())
    }
  }

  #[test]
  fn walk_builds_children_and_keys() {
    let root = module_with_calls("root", &["a", "b"]);
    let mut walker = StaticWalker { fail: vec![] };
    let (config, diags) = build_config(root, &mut walker);

    assert!(!diags.has_errors());
    assert_eq!(config.key(), "");
    assert_eq!(config.children.len(), 2);
    assert_eq!(config.children["a"].key(), "a");
    assert_eq!(config.descendant("b").unwrap().key(), "b");
  }

  #[test]
  fn failed_sibling_does_not_stop_the_walk() {
    let root = module_with_calls("root", &["a", "b"]);
    let mut walker = StaticWalker {
      fail: vec!["a".to_string()],
    };
    let (config, diags) = build_config(root, &mut walker);

    assert!(diags.has_errors());
    assert!(config.children.get("a").is_none());
    assert!(config.children.get("b").is_some());
  }

  #[test]
  fn request_keys() {
    let call = ModuleCall {
      name: "y".to_string(),
      source: "./y".to_string(),
      source_addr: SourceAddr::parse("./y"),
      version: None,
      decl_file: "main.mp.json".to_string(),
    };
    let req = ModuleRequest {
      path: vec!["x".to_string(), "y".to_string()],
      call: &call,
    };
    assert_eq!(req.key(), "x.y");
    assert_eq!(req.parent_key(), "x");
  }
}
