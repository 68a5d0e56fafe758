//! Configuration schema definitions

use std::fmt;

use serde::{Deserialize, Serialize};

/// Output module format handed to the bundler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Immediately-invoked function expression, suitable for `<script>` tags
    #[default]
    Iife,

    /// ES module
    #[serde(alias = "esm", alias = "module")]
    #[value(alias = "esm", alias = "module")]
    Es,

    /// CommonJS
    #[serde(alias = "commonjs")]
    #[value(alias = "commonjs")]
    Cjs,

    /// Asynchronous module definition
    Amd,

    /// Universal module definition
    Umd,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Iife => "iife",
            OutputFormat::Es => "es",
            OutputFormat::Cjs => "cjs",
            OutputFormat::Amd => "amd",
            OutputFormat::Umd => "umd",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the bundle exposes the entry module's exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportsMode {
    Auto,
    Default,
    Named,
    None,
}

/// Source map setting: a plain on/off switch or a target such as `inline`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceMap {
    Enabled(bool),
    Target(String),
}

impl SourceMap {
    /// Parse a command-line value (`true`, `false`, `inline`, or a file path)
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "" => Err("source map value cannot be empty".to_string()),
            "true" => Ok(SourceMap::Enabled(true)),
            "false" => Ok(SourceMap::Enabled(false)),
            other => Ok(SourceMap::Target(other.to_string())),
        }
    }
}

/// An extra stage contributed by the manifest or the caller.
///
/// These are passed to the bundler as-is after the built-in chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name/identifier
    pub name: String,

    /// Stage-specific options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// One layer of build options.
///
/// Every field is optional so that a layer only overrides what it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    pub entry: Option<String>,

    pub dest: Option<String>,

    pub format: Option<OutputFormat>,

    #[serde(alias = "module_name")]
    pub module_name: Option<String>,

    pub exports: Option<ExportsMode>,

    #[serde(alias = "useStrict", alias = "use_strict")]
    pub strict: Option<bool>,

    #[serde(alias = "source_map")]
    pub source_map: Option<SourceMap>,

    #[serde(alias = "source_map_file")]
    pub source_map_file: Option<SourceMap>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<StageConfig>,

    pub watch: Option<bool>,
}

impl BuildOptions {
    /// Built-in defaults, the lowest-precedence layer
    pub fn defaults() -> Self {
        Self {
            entry: Some(default_entry()),
            format: Some(OutputFormat::default()),
            ..Self::default()
        }
    }

    /// Lay `higher` over `self`.
    ///
    /// Fields set in `higher` win; stage lists are concatenated.
    pub fn overlay(self, higher: BuildOptions) -> Self {
        let mut plugins = self.plugins;
        plugins.extend(higher.plugins);

        Self {
            entry: higher.entry.or(self.entry),
            dest: higher.dest.or(self.dest),
            format: higher.format.or(self.format),
            module_name: higher.module_name.or(self.module_name),
            exports: higher.exports.or(self.exports),
            strict: higher.strict.or(self.strict),
            source_map: higher.source_map.or(self.source_map),
            source_map_file: higher.source_map_file.or(self.source_map_file),
            plugins,
            watch: higher.watch.or(self.watch),
        }
    }
}

pub fn default_entry() -> String {
    "./src/index.js".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overlay_prefers_higher_layer() {
        let low = BuildOptions {
            dest: Some("dist/low.js".into()),
            module_name: Some("Low".into()),
            ..BuildOptions::default()
        };
        let high = BuildOptions {
            dest: Some("dist/high.js".into()),
            ..BuildOptions::default()
        };

        let merged = low.overlay(high);
        assert_eq!(merged.dest.as_deref(), Some("dist/high.js"));
        assert_eq!(merged.module_name.as_deref(), Some("Low"));
    }

    #[test]
    fn test_overlay_concatenates_plugins() {
        let stage = |name: &str| StageConfig {
            name: name.to_string(),
            options: None,
        };
        let low = BuildOptions {
            plugins: vec![stage("a"), stage("b")],
            ..BuildOptions::default()
        };
        let high = BuildOptions {
            plugins: vec![stage("c")],
            ..BuildOptions::default()
        };

        let names: Vec<_> = low
            .overlay(high)
            .plugins
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_deserialize_accepts_rollup_names() {
        let options: BuildOptions = serde_json::from_str(
            r#"{"useStrict": false, "moduleName": "App", "format": "esm", "sourceMap": "inline"}"#,
        )
        .unwrap();

        assert_eq!(options.strict, Some(false));
        assert_eq!(options.module_name.as_deref(), Some("App"));
        assert_eq!(options.format, Some(OutputFormat::Es));
        assert_eq!(options.source_map, Some(SourceMap::Target("inline".into())));
    }

    #[test]
    fn test_source_map_parse() {
        assert_eq!(SourceMap::parse("true"), Ok(SourceMap::Enabled(true)));
        assert_eq!(SourceMap::parse("false"), Ok(SourceMap::Enabled(false)));
        assert_eq!(
            SourceMap::parse("inline"),
            Ok(SourceMap::Target("inline".into()))
        );
        assert!(SourceMap::parse("").is_err());
    }
}
