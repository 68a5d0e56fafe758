//! Command-line interface for Rollkit
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: One-shot build, or watch mode with `--watch`
//! - `config`: Print the effective configuration

mod build;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{resolve_config, BuildCommand, OptionArgs};
pub use config::ConfigCommand;

/// Rollkit - drive a bundler once or in watch mode
#[derive(Parser, Debug)]
#[command(name = "rollkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project manifest (package.json or rollkit.toml)
    #[arg(short, long, global = true, default_value = "package.json")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project once, or keep rebuilding with --watch
    Build(BuildCommand),

    /// Print the merged build configuration
    Config(ConfigCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Config(cmd) => cmd.execute(&self.config).await,
        }
    }
}

/// Print the Rollkit banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "◆".cyan(),
        "Rollkit".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
