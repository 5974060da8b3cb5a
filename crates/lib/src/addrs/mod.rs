//! Module source addresses and version constraints.
//!
//! # Modules
//!
//! - [`source`] - Classification of raw source strings into Local, Registry,
//!   and Remote addresses
//! - [`version`] - Semantic version constraints on module calls

pub mod source;
pub mod version;

pub use source::{RegistrySource, RemoteSource, SourceAddr, split_package_subdir};
pub use version::VersionConstraint;
