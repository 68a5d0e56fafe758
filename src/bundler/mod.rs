//! External bundler interface
//!
//! Rollkit does not bundle anything itself. It hands a [`BundleRequest`] to a
//! [`Bundler`] for one-shot builds, or to a [`Watcher`] that keeps rebuilding
//! and reports each cycle as a [`WatchEvent`].

mod command;
mod event;
mod watcher;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::BundleRequest;

pub use command::CommandBundler;
pub use event::{BuildError, ErrorLocation, WatchEvent};
pub use watcher::FsWatcher;

/// Information about a written bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleInfo {
    /// Output file path, when the request names one
    pub output_path: Option<PathBuf>,

    /// Bundle size in bytes, when the output could be inspected
    pub size: Option<u64>,
}

/// Failures reported by a bundler implementation
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to start bundler `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("bundler `{program}` failed ({status}): {message}")]
    Failed {
        program: String,
        status: String,
        message: String,
        snippet: Option<String>,
    },

    #[error("failed to encode bundle request")]
    Encode(#[from] serde_json::Error),
}

impl BundleError {
    /// Source excerpt attached to the failure, if any
    pub fn snippet(&self) -> Option<&str> {
        match self {
            BundleError::Failed { snippet, .. } => snippet.as_deref(),
            _ => None,
        }
    }
}

/// Build step of the bundling capability
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    /// Prepare a bundle from `request`
    async fn rollup(&self, request: &BundleRequest) -> Result<Box<dyn Bundle>>;
}

/// Write step of a prepared bundle
#[async_trait]
pub trait Bundle: Send + Sync {
    /// Emit the bundle using `request` as output options
    async fn write(&self, request: &BundleRequest) -> Result<BundleInfo>;
}

/// Lifecycle events of one watch session
pub type EventStream = mpsc::Receiver<WatchEvent>;

/// Continuous rebuild capability.
///
/// Dropping the returned stream unsubscribes; implementations stop once they
/// notice the receiver is gone.
pub trait Watcher: Send + Sync {
    /// Start watching. Must be called from within a tokio runtime.
    fn watch(&self, bundler: Arc<dyn Bundler>, request: BundleRequest) -> Result<EventStream>;
}
