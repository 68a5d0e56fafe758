//! Watch session state machine

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bundler::{EventStream, WatchEvent};
use crate::reporter::{Reporter, Style};

/// Where a watch session currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Subscribed, no event seen yet
    Watching,
    Starting,
    Building,
    Built,
    Errored,
    /// The session was stopped or the watcher went away
    Stopped,
}

/// Resolves once, on the first `Starting` event of a session.
///
/// It never fails: if the session ends before starting, [`wait`](Self::wait)
/// stays pending.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    rx: watch::Receiver<bool>,
}

impl CompletionSignal {
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|ready| *ready).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    pub fn is_resolved(&self) -> bool {
        *self.rx.borrow()
    }
}

/// A running watch session.
///
/// Dropping it has the same effect as [`stop`](Self::stop), without waiting.
pub struct WatchSession {
    ready: CompletionSignal,
    state: Arc<RwLock<WatchState>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchSession {
    pub(crate) fn spawn(events: EventStream, label: String, reporter: Reporter) -> Self {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = oneshot::channel();
        let state = Arc::new(RwLock::new(WatchState::Watching));

        let dispatcher = Dispatcher {
            label,
            reporter,
            ready: ready_tx,
            state: state.clone(),
        };
        let task = tokio::spawn(dispatcher.run(events, stop_rx));

        Self {
            ready: CompletionSignal { rx: ready_rx },
            state,
            stop: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Handle that resolves on the first `Starting` event
    pub fn ready(&self) -> CompletionSignal {
        self.ready.clone()
    }

    pub fn state(&self) -> WatchState {
        *self.state.read()
    }

    /// Wait until the watcher closes its event stream
    pub async fn join(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            if let Err(e) = result {
                warn!("Watch dispatcher ended abnormally: {}", e);
            }
        }
    }

    /// Unsubscribe from the watcher and wait for the dispatcher to finish
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.join().await;
    }
}

/// Consumes events for one session
struct Dispatcher {
    label: String,
    reporter: Reporter,
    ready: watch::Sender<bool>,
    state: Arc<RwLock<WatchState>>,
}

impl Dispatcher {
    async fn run(mut self, mut events: EventStream, mut stop: oneshot::Receiver<()>) {
        loop {
            tokio::select! {
                _ = &mut stop => {
                    debug!("Watch session stopped");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        debug!("Watcher closed its event stream");
                        break;
                    }
                },
            }
        }
        // Dropping `events` here unsubscribes from the watcher
        self.set_state(WatchState::Stopped);
    }

    fn dispatch(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Starting => {
                self.set_state(WatchState::Starting);
                self.reporter.report(&self.label, "starting", Some(Style::Info));
                if self.resolve() {
                    debug!("First cycle started, completion signal resolved");
                }
            }
            WatchEvent::BuildStart => {
                self.set_state(WatchState::Building);
            }
            WatchEvent::BuildEnd { duration_ms } => {
                self.set_state(WatchState::Built);
                self.reporter
                    .report(&self.label, "bundled successfully", Some(Style::Success));
                if let Some(ms) = duration_ms {
                    debug!("Cycle took {}ms", ms);
                }
            }
            WatchEvent::Error(error) => {
                self.set_state(WatchState::Errored);
                self.reporter.report(&self.label, "", Some(Style::Failure));
                if let Some(snippet) = &error.snippet {
                    self.reporter.snippet(snippet);
                }
                self.reporter.stack(error.stack());
            }
            WatchEvent::Unknown(code) => {
                self.reporter.unknown(&code);
            }
        }
    }

    /// Mark the signal resolved; false if it already was
    fn resolve(&self) -> bool {
        self.ready.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    fn set_state(&self, state: WatchState) {
        *self.state.write() = state;
    }
}
