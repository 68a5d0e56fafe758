//! Execution driver
//!
//! Runs an [`EffectiveConfig`] either once or as a watch session, mapping
//! watcher lifecycle events onto the [`Reporter`].

mod session;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::bundler::{BundleInfo, Bundler, Watcher};
use crate::config::{BundleRequest, EffectiveConfig};
use crate::reporter::Reporter;

pub use session::{CompletionSignal, WatchSession, WatchState};

/// Outcome of [`Driver::run`]
pub enum Execution {
    /// One-shot build finished
    Built(BundleInfo),
    /// Watch session started; it keeps running until stopped
    Watching(WatchSession),
}

/// Drives the external bundler
pub struct Driver {
    bundler: Arc<dyn Bundler>,
    watcher: Arc<dyn Watcher>,
    reporter: Reporter,
}

impl Driver {
    pub fn new(bundler: Arc<dyn Bundler>, watcher: Arc<dyn Watcher>, reporter: Reporter) -> Self {
        Self {
            bundler,
            watcher,
            reporter,
        }
    }

    /// Build once, or start watching when the configuration asks for it
    pub async fn run(&self, config: EffectiveConfig) -> Result<Execution> {
        let (request, watch) = config.into_request();

        if watch {
            self.watch(request).map(Execution::Watching)
        } else {
            self.build_once(request).await.map(Execution::Built)
        }
    }

    /// Run one build and write. Failures propagate unchanged.
    pub async fn build_once(&self, request: BundleRequest) -> Result<BundleInfo> {
        debug!("One-shot build of {} with {}", request.entry, self.bundler.name());
        let bundle = self.bundler.rollup(&request).await?;
        bundle.write(&request).await
    }

    /// Start a watch session.
    ///
    /// Returns before any event is processed. Must be called from within a
    /// tokio runtime.
    pub fn watch(&self, request: BundleRequest) -> Result<WatchSession> {
        let label = request.format.to_string();
        info!("Starting watch session for {}", request.entry);

        let events = self.watcher.watch(self.bundler.clone(), request)?;
        Ok(WatchSession::spawn(events, label, self.reporter.clone()))
    }
}
