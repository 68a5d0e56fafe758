//! Per-invocation build session context

use std::env;
use std::fmt;

use tracing::debug;

use super::style::{StyleExports, StyleTransform};

/// Environment variable carrying the build mode
pub const MODE_VAR: &str = "NODE_ENV";

/// Runtime environment mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Production,
    Development,
    Other(String),
}

impl Mode {
    /// Read the mode from [`MODE_VAR`]. Unset or empty means development.
    pub fn from_env() -> Self {
        Self::parse(env::var(MODE_VAR).ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value {
            None | Some("") | Some("development") => Mode::Development,
            Some("production") => Mode::Production,
            Some(other) => Mode::Other(other.to_string()),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Mode::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Mode::Production => "production",
            Mode::Development => "development",
            Mode::Other(value) => value,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by the stages of one build or watch session.
///
/// The mode and the style optimizer are fixed when the session is created,
/// so assembling the chain again yields the same stages.
#[derive(Debug, Clone)]
pub struct BuildSession {
    mode: Mode,
    optimizer: StyleTransform,
    exports: StyleExports,
}

impl BuildSession {
    pub fn new(mode: Mode) -> Self {
        let optimizer = if mode.is_production() {
            StyleTransform::Cssnano { source_map: true }
        } else {
            StyleTransform::Perfectionist
        };
        debug!("Build session in {} mode, style optimizer {:?}", mode, optimizer);

        Self {
            mode,
            optimizer,
            exports: StyleExports::new(),
        }
    }

    /// Create a session for the mode found in the environment
    pub fn from_env() -> Self {
        Self::new(Mode::from_env())
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn optimizer(&self) -> &StyleTransform {
        &self.optimizer
    }

    pub fn exports(&self) -> &StyleExports {
        &self.exports
    }
}
