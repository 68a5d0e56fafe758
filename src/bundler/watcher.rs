//! File-system driven rebuild loop

use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify::{RecursiveMode, Watcher as _};
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{BuildError, Bundler, EventStream, WatchEvent, Watcher};
use crate::config::BundleRequest;
use crate::utils::relative_path;

/// Paths never worth a rebuild
const DEFAULT_IGNORES: [&str; 2] = ["node_modules/**", ".git/**"];

/// Watches a project directory and rebuilds on change.
///
/// Every cycle emits `Starting`, `BuildStart`, then `BuildEnd` or `Error`.
/// Style exports left by the previous cycle are dropped right before the
/// build step. Cycles never overlap; changes that arrive while one runs are folded into
/// a single follow-up cycle.
#[derive(Debug, Clone)]
pub struct FsWatcher {
    root: PathBuf,
    debounce: Duration,
    ignore: Vec<String>,
}

impl FsWatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce: Duration::from_millis(100),
            ignore: DEFAULT_IGNORES.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Ignore paths matching `pattern`, relative to the root
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }

    /// Ignore set for one session; the output file and its map are added so
    /// writing the bundle does not trigger another cycle
    fn ignore_set(&self, request: &BundleRequest) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.ignore {
            builder.add(Glob::new(pattern).with_context(|| format!("Invalid ignore pattern: {}", pattern))?);
        }
        if let Some(dest) = &request.dest {
            let dest = dest.trim_start_matches("./");
            for pattern in [dest.to_string(), format!("{}.map", dest)] {
                builder.add(Glob::new(&pattern).with_context(|| format!("Invalid output path: {}", pattern))?);
            }
        }
        Ok(builder.build()?)
    }
}

impl Watcher for FsWatcher {
    fn watch(&self, bundler: Arc<dyn Bundler>, request: BundleRequest) -> Result<EventStream> {
        let root = self
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve watch root: {}", self.root.display()))?;
        let ignore = self.ignore_set(&request)?;

        let (events_tx, events_rx) = mpsc::channel(64);
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(self.debounce, tx)?;
        debouncer.watcher().watch(&root, RecursiveMode::Recursive)?;

        info!("Watching {} with {}", root.display(), bundler.name());
        let display_root = root.clone();

        // The debouncer lives in this thread; it ends once the rebuild loop is gone
        std::thread::spawn(move || {
            let _debouncer = debouncer;

            loop {
                match rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(Ok(events)) => {
                        let changed: Vec<PathBuf> = events
                            .into_iter()
                            .map(|event| event.path)
                            .filter(|path| is_relevant(path, &root, &ignore))
                            .collect();
                        if !changed.is_empty() && changes_tx.send(changed).is_err() {
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Watch error: {:?}", e);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if changes_tx.is_closed() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("File watcher stopped");
        });

        tokio::spawn(rebuild_loop(bundler, request, display_root, changes_rx, events_tx));

        Ok(events_rx)
    }
}

fn is_relevant(path: &Path, root: &Path, ignore: &GlobSet) -> bool {
    match path.strip_prefix(root) {
        Ok(relative) => !ignore.is_match(relative),
        Err(_) => false,
    }
}

async fn rebuild_loop(
    bundler: Arc<dyn Bundler>,
    request: BundleRequest,
    root: PathBuf,
    mut changes: mpsc::UnboundedReceiver<Vec<PathBuf>>,
    events: mpsc::Sender<WatchEvent>,
) {
    loop {
        if run_cycle(bundler.as_ref(), &request, &events).await.is_err() {
            break;
        }

        tokio::select! {
            changed = changes.recv() => {
                let Some(mut changed) = changed else { break };
                while let Ok(more) = changes.try_recv() {
                    changed.extend(more);
                }
                for path in &changed {
                    let shown = relative_path(&root, path).unwrap_or_else(|| path.display().to_string());
                    info!("File changed: {}", shown);
                }
            }
            _ = events.closed() => break,
        }
    }
    debug!("Rebuild loop ended");
}

/// Run one cycle. Errs only when nobody listens for events any more.
async fn run_cycle(
    bundler: &dyn Bundler,
    request: &BundleRequest,
    events: &mpsc::Sender<WatchEvent>,
) -> Result<(), mpsc::error::SendError<WatchEvent>> {
    events.send(WatchEvent::Starting).await?;
    events.send(WatchEvent::BuildStart).await?;

    if let Some(style) = request.style_stage() {
        style.reset();
    }

    let start = Instant::now();
    let outcome = async {
        let bundle = bundler.rollup(request).await?;
        bundle.write(request).await
    }
    .await;

    let event = match outcome {
        Ok(info) => {
            debug!("Cycle wrote {:?}", info.output_path);
            WatchEvent::BuildEnd {
                duration_ms: Some(start.elapsed().as_millis() as u64),
            }
        }
        Err(err) => WatchEvent::Error(BuildError::from_error(&err)),
    };
    events.send(event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{Bundle, BundleInfo};
    use crate::config::{BuildOptions, EffectiveConfig};
    use crate::plugins::{assemble, BuildSession, Mode, StyleExports};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every other build
    struct FlakyBundler {
        calls: AtomicUsize,
    }

    struct NoopBundle;

    #[async_trait]
    impl Bundle for NoopBundle {
        async fn write(&self, _request: &BundleRequest) -> Result<BundleInfo> {
            Ok(BundleInfo::default())
        }
    }

    #[async_trait]
    impl Bundler for FlakyBundler {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn rollup(&self, _request: &BundleRequest) -> Result<Box<dyn Bundle>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                anyhow::bail!("syntax error");
            }
            Ok(Box::new(NoopBundle))
        }
    }

    fn request(dest: Option<&str>) -> BundleRequest {
        let caller = BuildOptions {
            dest: dest.map(String::from),
            ..BuildOptions::default()
        };
        EffectiveConfig::merge(Vec::new(), BuildOptions::default(), caller)
            .into_request()
            .0
    }

    #[tokio::test]
    async fn test_cycle_event_sequence() {
        let bundler = FlakyBundler {
            calls: AtomicUsize::new(0),
        };
        let (tx, mut rx) = mpsc::channel(16);
        let request = request(None);

        run_cycle(&bundler, &request, &tx).await.unwrap();
        run_cycle(&bundler, &request, &tx).await.unwrap();
        drop(tx);

        let mut codes = Vec::new();
        while let Some(event) = rx.recv().await {
            codes.push(event.code().to_string());
        }
        assert_eq!(
            codes,
            vec!["STARTING", "BUILD_START", "BUILD_END", "STARTING", "BUILD_START", "ERROR"]
        );
    }

    #[tokio::test]
    async fn test_cycle_stops_when_unsubscribed() {
        let bundler = FlakyBundler {
            calls: AtomicUsize::new(0),
        };
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        assert!(run_cycle(&bundler, &request(None), &tx).await.is_err());
        assert_eq!(bundler.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ignore_set_covers_output() {
        let watcher = FsWatcher::new(".");
        let set = watcher.ignore_set(&request(Some("./dist/app.js"))).unwrap();
        let root = Path::new("/project");

        assert!(!is_relevant(Path::new("/project/dist/app.js"), root, &set));
        assert!(!is_relevant(Path::new("/project/dist/app.js.map"), root, &set));
        assert!(!is_relevant(Path::new("/project/node_modules/x/index.js"), root, &set));
        assert!(!is_relevant(Path::new("/elsewhere/src/main.js"), root, &set));
        assert!(is_relevant(Path::new("/project/src/main.js"), root, &set));
    }

    /// Captures style tokens while building, reads them back while writing
    struct StyleBundler {
        reads: mpsc::UnboundedSender<(bool, bool)>,
    }

    struct StyleBundle {
        reads: mpsc::UnboundedSender<(bool, bool)>,
    }

    #[async_trait]
    impl Bundler for StyleBundler {
        fn name(&self) -> &str {
            "style"
        }

        async fn rollup(&self, request: &BundleRequest) -> Result<Box<dyn Bundle>> {
            let style = request.style_stage().unwrap();
            style.capture(
                "src/card.css",
                [("title".to_string(), "card__title___3f".to_string())].into(),
            );
            Ok(Box::new(StyleBundle {
                reads: self.reads.clone(),
            }))
        }
    }

    #[async_trait]
    impl Bundle for StyleBundle {
        async fn write(&self, request: &BundleRequest) -> Result<BundleInfo> {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            let style = request.style_stage().unwrap();
            let current = style.export_for("src/card.css").is_some();
            let stale = style.export_for("src/old.css").is_some();
            self.reads.send((current, stale)).unwrap();
            Ok(BundleInfo::default())
        }
    }

    fn styled_request() -> (BundleRequest, StyleExports) {
        let session = BuildSession::new(Mode::Development);
        let (request, _) =
            EffectiveConfig::merge(assemble(&session), BuildOptions::default(), BuildOptions::default())
                .into_request();
        (request, session.exports().clone())
    }

    #[tokio::test]
    async fn test_cycle_drops_stale_exports_before_building() {
        let (reads_tx, mut reads) = mpsc::unbounded_channel();
        let bundler = StyleBundler { reads: reads_tx };
        let (request, exports) = styled_request();
        exports.record("src/old.css", [("a".to_string(), "old_a".to_string())].into());

        let (tx, _rx) = mpsc::channel(16);
        run_cycle(&bundler, &request, &tx).await.unwrap();

        assert_eq!(reads.recv().await, Some((true, false)));
        assert_eq!(exports.len(), 1);
    }

    #[tokio::test]
    async fn test_exports_visible_while_events_are_consumed() {
        let dir = tempfile::tempdir().unwrap();
        let (reads_tx, mut reads) = mpsc::unbounded_channel();
        let (request, exports) = styled_request();

        let mut events = FsWatcher::new(dir.path())
            .watch(Arc::new(StyleBundler { reads: reads_tx }), request)
            .unwrap();
        let consumer = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if matches!(event, WatchEvent::BuildEnd { .. }) {
                    break;
                }
            }
        });

        assert_eq!(reads.recv().await, Some((true, false)));
        consumer.await.unwrap();
        assert!(exports.get("src/card.css").is_some());
    }

    #[tokio::test]
    async fn test_watch_emits_initial_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let bundler = Arc::new(FlakyBundler {
            calls: AtomicUsize::new(0),
        });

        let mut events = FsWatcher::new(dir.path())
            .watch(bundler, request(None))
            .unwrap();

        assert_eq!(events.recv().await, Some(WatchEvent::Starting));
        assert_eq!(events.recv().await, Some(WatchEvent::BuildStart));
        assert!(matches!(
            events.recv().await,
            Some(WatchEvent::BuildEnd { .. })
        ));
    }
}
