//! Style processing stage and its export side channel

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::trace;

/// Scoped class names extracted from one style module (`local -> scoped`)
pub type ExportTokens = BTreeMap<String, String>;

/// Side channel from the css-modules transform to the JS binding emitter.
///
/// Cloning shares the underlying map. Entries are keyed by style module id.
#[derive(Debug, Clone, Default)]
pub struct StyleExports {
    tokens: Arc<DashMap<String, ExportTokens>>,
}

impl StyleExports {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tokens extracted for `id`, replacing any earlier entry
    pub fn record(&self, id: impl Into<String>, tokens: ExportTokens) {
        let id = id.into();
        trace!("Captured {} style export(s) for {}", tokens.len(), id);
        self.tokens.insert(id, tokens);
    }

    /// Tokens recorded for `id` during the current cycle
    pub fn get(&self, id: &str) -> Option<ExportTokens> {
        self.tokens.get(id).map(|entry| entry.value().clone())
    }

    /// Forget every entry. Called at the start of each build cycle.
    pub fn clear(&self) {
        self.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Parser used for style sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleParser {
    Scss,
}

/// A transform inside the style stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
pub enum StyleTransform {
    /// Sass-like syntax support
    Precss,

    /// Scopes class names and reports them through [`StyleExports`]
    CssModules,

    /// Minifying optimizer, production only
    Cssnano {
        #[serde(rename = "sourceMap")]
        source_map: bool,
    },

    /// Pretty-printing formatter, used outside production
    Perfectionist,
}

/// Options of the style-processing stage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleStage {
    pub parser: StyleParser,
    pub plugins: Vec<StyleTransform>,
    pub combine_style_tags: bool,
    pub extract: bool,
    pub source_map: bool,
    pub extensions: Vec<String>,
    #[serde(skip)]
    exports: StyleExports,
}

impl StyleStage {
    pub fn new(optimizer: StyleTransform, exports: StyleExports) -> Self {
        Self {
            parser: StyleParser::Scss,
            plugins: vec![StyleTransform::Precss, StyleTransform::CssModules, optimizer],
            combine_style_tags: false,
            extract: true,
            source_map: true,
            extensions: [".css", ".sss", ".less", ".scss"]
                .into_iter()
                .map(String::from)
                .collect(),
            exports,
        }
    }

    /// Whether this stage handles the file at `id`
    pub fn handles(&self, id: &str) -> bool {
        self.extensions.iter().any(|ext| id.ends_with(ext.as_str()))
    }

    /// Hook for the css-modules transform once a module's tokens are known
    pub fn capture(&self, id: &str, tokens: ExportTokens) {
        self.exports.record(id, tokens);
    }

    /// Hook for the JS binding emitter of style module `id`
    pub fn export_for(&self, id: &str) -> Option<ExportTokens> {
        self.exports.get(id)
    }

    /// Forget the tokens of the previous cycle. Runs before the build step,
    /// so every read in a cycle sees only that cycle's captures.
    pub fn reset(&self) {
        self.exports.clear();
    }
}
