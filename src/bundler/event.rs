//! Watch lifecycle events

use std::fmt;

use serde::{Deserialize, Serialize};

use super::BundleError;

/// Location of a build error in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

/// Payload of an `ERROR` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Offending source excerpt, when the bundler provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<ErrorLocation>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Convert a failed cycle into an event payload.
    ///
    /// The snippet is taken from a [`BundleError`] anywhere in the chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let snippet = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<BundleError>())
            .and_then(|bundle_err| bundle_err.snippet())
            .map(str::to_owned);

        Self {
            message: err.to_string(),
            stack: Some(format!("{:?}", err)),
            snippet,
            loc: None,
        }
    }

    /// Stack trace, falling back to the message
    pub fn stack(&self) -> &str {
        self.stack.as_deref().unwrap_or(&self.message)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.loc {
            Some(loc) => match (loc.line, loc.column) {
                (Some(line), Some(column)) => {
                    write!(f, "{} ({}:{}:{})", self.message, loc.file, line, column)
                }
                _ => write!(f, "{} ({})", self.message, loc.file),
            },
            None => f.write_str(&self.message),
        }
    }
}

/// Lifecycle notification from a watcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub enum WatchEvent {
    /// A cycle is about to run
    Starting,
    /// The bundler started building
    BuildStart,
    /// The cycle finished and output was written
    BuildEnd { duration_ms: Option<u64> },
    /// The cycle failed
    Error(BuildError),
    /// A code outside the known set
    Unknown(String),
}

impl WatchEvent {
    pub const STARTING: &'static str = "STARTING";
    pub const BUILD_START: &'static str = "BUILD_START";
    pub const BUILD_END: &'static str = "BUILD_END";
    pub const ERROR: &'static str = "ERROR";

    /// Wire code of this event
    pub fn code(&self) -> &str {
        match self {
            WatchEvent::Starting => Self::STARTING,
            WatchEvent::BuildStart => Self::BUILD_START,
            WatchEvent::BuildEnd { .. } => Self::BUILD_END,
            WatchEvent::Error(_) => Self::ERROR,
            WatchEvent::Unknown(code) => code,
        }
    }
}

/// Wire shape: `{"code": "...", "error": {...}, "duration": 12}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEvent {
    code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<BuildError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
}

impl From<RawEvent> for WatchEvent {
    fn from(raw: RawEvent) -> Self {
        match raw.code.as_str() {
            WatchEvent::STARTING => WatchEvent::Starting,
            WatchEvent::BUILD_START => WatchEvent::BuildStart,
            WatchEvent::BUILD_END => WatchEvent::BuildEnd {
                duration_ms: raw.duration,
            },
            WatchEvent::ERROR => WatchEvent::Error(raw.error.unwrap_or_default()),
            _ => WatchEvent::Unknown(raw.code),
        }
    }
}

impl From<WatchEvent> for RawEvent {
    fn from(event: WatchEvent) -> Self {
        let code = event.code().to_string();
        match event {
            WatchEvent::BuildEnd { duration_ms } => RawEvent {
                code,
                error: None,
                duration: duration_ms,
            },
            WatchEvent::Error(error) => RawEvent {
                code,
                error: Some(error),
                duration: None,
            },
            _ => RawEvent {
                code,
                error: None,
                duration: None,
            },
        }
    }
}
