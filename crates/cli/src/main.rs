use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

/// modplan - resolve, install, and snapshot configuration module trees
#[derive(Parser)]
#[command(name = "modplan")]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Install the module tree declared by a configuration directory
  Install {
    /// Root configuration directory
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Replace every installed module, not just outdated ones
    #[arg(short, long)]
    upgrade: bool,

    /// Path to a JSON registry index for registry module sources
    #[arg(long)]
    registry: Option<PathBuf>,
  },

  /// Check installed modules against the configuration without fetching
  Validate {
    /// Root configuration directory
    #[arg(default_value = ".")]
    dir: PathBuf,
  },

  /// Inspect a saved plan file
  Show {
    /// Path to the plan file
    plan: PathBuf,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    json: bool,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .without_time()
    .init();

  let cli = Cli::parse();

  match cli.command {
    Commands::Install { dir, upgrade, registry } => cmd::cmd_install(&dir, upgrade, registry.as_deref()),
    Commands::Validate { dir } => cmd::cmd_validate(&dir),
    Commands::Show { plan, json } => cmd::cmd_show(&plan, json),
  }
}
