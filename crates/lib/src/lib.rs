//! modplan-lib: Core types and logic for modplan
//!
//! This crate resolves trees of declarative configuration modules, installs
//! the packages they reference, and captures the exact source files of a
//! load into reproducible artifacts:
//! - `addrs`: source address classification and version constraints
//! - `config`: parsed modules and the shared module-call walk
//! - `diags`: accumulated diagnostics for module walks
//! - `fsys`: the read-only filesystem capability
//! - `manifest`: the persisted table of installed modules
//! - `install`: the module resolver/installer walk
//! - `loader`: the no-network config loader
//! - `registry`: registry indirection for module sources
//! - `snapshot`: the config snapshot and its read-only virtual filesystem
//! - `planfile`: the plan container archive format

pub mod addrs;
pub mod config;
pub mod diags;
pub mod fsys;
pub mod install;
pub mod loader;
pub mod manifest;
pub mod planfile;
pub mod registry;
pub mod snapshot;
