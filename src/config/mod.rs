//! Configuration handling for Rollkit
//!
//! Merges built-in defaults, the project manifest, and caller options into
//! the effective configuration handed to the execution driver.

mod manifest;
mod schema;

use serde::Serialize;

use crate::plugins::{Stage, StyleStage};

pub use manifest::{load_manifest, ConfigError, MANIFEST_KEY};
pub use schema::*;

/// Fully-resolved build configuration
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfig {
    /// Entry module path
    pub entry: String,

    /// Output destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    /// Output format, always concrete
    pub format: OutputFormat,

    /// Global name for iife/umd bundles
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<ExportsMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_strict: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<SourceMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map_file: Option<SourceMap>,

    /// Ordered transform stages
    pub plugins: Vec<Stage>,

    /// Keep rebuilding on file changes
    pub watch: bool,
}

impl EffectiveConfig {
    /// Merge the configuration layers.
    ///
    /// Precedence, lowest to highest: built-in defaults, `manifest`, `caller`.
    /// The assembled `chain` comes first in the stage list, followed by the
    /// stages each layer contributes in order.
    ///
    /// Without an explicit `sourceMapFile`, the caller's `sourceMap` is used;
    /// a manifest `sourceMap` alone does not set it.
    pub fn merge(chain: Vec<Stage>, manifest: BuildOptions, caller: BuildOptions) -> Self {
        let caller_source_map = caller.source_map.clone();
        let layered = BuildOptions::defaults().overlay(manifest).overlay(caller);

        let mut plugins = chain;
        plugins.extend(layered.plugins.into_iter().map(Stage::Custom));

        Self {
            entry: layered.entry.unwrap_or_else(default_entry),
            dest: layered.dest,
            format: layered.format.unwrap_or_default(),
            module_name: layered.module_name,
            exports: layered.exports,
            use_strict: layered.strict,
            source_map_file: layered.source_map_file.or(caller_source_map),
            source_map: layered.source_map,
            plugins,
            watch: layered.watch.unwrap_or(false),
        }
    }

    /// Split off the watch flag.
    ///
    /// The returned request has no watch field at all, so it can never leak
    /// into a bundler call.
    pub fn into_request(self) -> (BundleRequest, bool) {
        let request = BundleRequest {
            entry: self.entry,
            dest: self.dest,
            format: self.format,
            module_name: self.module_name,
            exports: self.exports,
            use_strict: self.use_strict,
            source_map: self.source_map,
            source_map_file: self.source_map_file,
            plugins: self.plugins,
        };
        (request, self.watch)
    }
}

/// What the external bundler receives, for both its build and write steps
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    pub entry: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    pub format: OutputFormat,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<ExportsMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_strict: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<SourceMap>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map_file: Option<SourceMap>,

    pub plugins: Vec<Stage>,
}

impl BundleRequest {
    /// The style-processing stage, if the chain has one
    pub fn style_stage(&self) -> Option<&StyleStage> {
        self.plugins.iter().find_map(|stage| match stage {
            Stage::Postcss(style) => Some(style),
            _ => None,
        })
    }
}
