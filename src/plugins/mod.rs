//! Transform stage chain for Rollkit
//!
//! Describes the Rollup-style plugin chain handed to the external bundler and
//! assembles it for a [`BuildSession`].

mod session;
mod style;

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::StageConfig;

pub use session::{BuildSession, Mode, MODE_VAR};
pub use style::{ExportTokens, StyleExports, StyleParser, StyleStage, StyleTransform};

/// Calls removed by the strip stage in production builds
pub const DEBUG_FUNCTIONS: [&str; 4] = ["console.*", "assert.*", "debug", "alert"];

/// Dependencies excluded from CommonJS interop
pub const COMMONJS_EXCLUDE: &str = "node_modules/process-es6/**";

/// Expression replaced with the JSON-encoded mode
pub const MODE_SENTINEL: &str = "process.env.NODE_ENV";

/// Options of the debug-stripping stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StripOptions {
    pub debugger: bool,
    pub functions: Vec<String>,
    pub source_map: bool,
}

impl Default for StripOptions {
    fn default() -> Self {
        Self {
            debugger: true,
            functions: DEBUG_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            source_map: false,
        }
    }
}

/// Options of the module-resolution stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveOptions {
    pub jsnext: bool,
    pub main: bool,
    pub browser: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            jsnext: true,
            main: true,
            browser: true,
        }
    }
}

/// Options of the CommonJS interop stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonjsOptions {
    pub exclude: String,
    pub include: Vec<String>,
}

impl Default for CommonjsOptions {
    fn default() -> Self {
        Self {
            exclude: COMMONJS_EXCLUDE.to_string(),
            include: Vec::new(),
        }
    }
}

/// Syntax transforms enabled in the downleveling stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubleTransforms {
    pub arrow: bool,
    pub modules: bool,
    pub classes: bool,
    pub dangerous_for_of: bool,
}

/// Options of the legacy-syntax downleveling stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BubleOptions {
    pub object_assign: String,
    pub transforms: BubleTransforms,
}

impl Default for BubleOptions {
    fn default() -> Self {
        Self {
            object_assign: "Object.assign".to_string(),
            transforms: BubleTransforms {
                arrow: true,
                modules: true,
                classes: true,
                dangerous_for_of: true,
            },
        }
    }
}

/// Options of the value-substitution stage (`expression -> replacement`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReplaceOptions {
    pub values: BTreeMap<String, String>,
}

impl ReplaceOptions {
    /// Substitute the mode sentinel with the JSON-encoded mode
    pub fn for_mode(mode: &Mode) -> Self {
        let mut values = BTreeMap::new();
        values.insert(MODE_SENTINEL.to_string(), json_string(mode.as_str()));
        Self { values }
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// One transform stage of the bundler pipeline
#[derive(Debug, Clone)]
pub enum Stage {
    Postcss(StyleStage),
    Json,
    Strip(StripOptions),
    NodeResolve(ResolveOptions),
    Commonjs(CommonjsOptions),
    Buble(BubleOptions),
    Replace(ReplaceOptions),
    Uglify,
    /// Stage contributed by the manifest or the caller
    Custom(StageConfig),
}

impl Stage {
    /// Plugin name as the bundler knows it
    pub fn name(&self) -> &str {
        match self {
            Stage::Postcss(_) => "postcss",
            Stage::Json => "json",
            Stage::Strip(_) => "strip",
            Stage::NodeResolve(_) => "node-resolve",
            Stage::Commonjs(_) => "commonjs",
            Stage::Buble(_) => "buble",
            Stage::Replace(_) => "replace",
            Stage::Uglify => "uglify",
            Stage::Custom(config) => &config.name,
        }
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", self.name())?;
        match self {
            Stage::Postcss(options) => map.serialize_entry("options", options)?,
            Stage::Strip(options) => map.serialize_entry("options", options)?,
            Stage::NodeResolve(options) => map.serialize_entry("options", options)?,
            Stage::Commonjs(options) => map.serialize_entry("options", options)?,
            Stage::Buble(options) => map.serialize_entry("options", options)?,
            Stage::Replace(options) => map.serialize_entry("options", options)?,
            Stage::Custom(StageConfig {
                options: Some(options),
                ..
            }) => map.serialize_entry("options", options)?,
            Stage::Json | Stage::Uglify | Stage::Custom(_) => {}
        }
        map.end()
    }
}

/// Assemble the built-in stage chain for `session`.
///
/// Production-only stages are left out entirely in other modes. Calling this
/// repeatedly with the same session gives the same chain.
pub fn assemble(session: &BuildSession) -> Vec<Stage> {
    let production = session.mode().is_production();

    let chain = [
        Some(Stage::Postcss(StyleStage::new(
            session.optimizer().clone(),
            session.exports().clone(),
        ))),
        Some(Stage::Json),
        production.then(|| Stage::Strip(StripOptions::default())),
        Some(Stage::NodeResolve(ResolveOptions::default())),
        Some(Stage::Commonjs(CommonjsOptions::default())),
        Some(Stage::Buble(BubleOptions::default())),
        Some(Stage::Replace(ReplaceOptions::for_mode(session.mode()))),
        production.then_some(Stage::Uglify),
    ];

    let stages: Vec<Stage> = chain.into_iter().flatten().collect();
    debug!(
        "Assembled {} stage(s) for {} mode: {}",
        stages.len(),
        session.mode(),
        stages.iter().map(Stage::name).collect::<Vec<_>>().join(", ")
    );
    stages
}
