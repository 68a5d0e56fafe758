//! Rollkit - build-configuration orchestrator
//!
//! Merges built-in defaults, the project manifest and command-line options
//! into one bundler request, then runs it once or keeps rebuilding on change.
//!
//! # Features
//! - Layered configuration from `package.json` or `rollkit.toml`
//! - Mode-aware transform chain (`NODE_ENV`)
//! - Watch mode with per-cycle lifecycle reporting

use anyhow::Result;
use clap::Parser;
use rollkit_lib::Cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rollkit=debug,rollkit_lib=debug"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("rollkit=info,rollkit_lib=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    cli.execute().await
}
