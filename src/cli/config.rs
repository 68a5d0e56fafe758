//! Config command: print the effective configuration

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use super::build::{resolve_config, OptionArgs};
use crate::plugins::BuildSession;

/// Print the merged build configuration as JSON
#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(flatten)]
    pub options: OptionArgs,
}

impl ConfigCommand {
    pub async fn execute(&self, config_path: &Path) -> Result<()> {
        let session = BuildSession::from_env();
        let config = resolve_config(config_path, &self.options, &session)?;

        let json = serde_json::to_string_pretty(&config)
            .context("Failed to serialize configuration")?;
        println!("{}", json);

        Ok(())
    }
}
