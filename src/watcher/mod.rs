//! Periodic watchers, one per slice of project state.
//!
//! # Architecture
//!
//! ```text
//!  FileWatcher   GitWatcher   ErrorWatcher   ProcessWatcher   BuildWatcher
//!      |             |             |               |               |
//!   own task      own task      own task        own task        own task
//!      |             |             |               |               |
//!      +------ watch::channel<Published<Slice>> per watcher -------+
//!                                  |
//!                          SnapshotCoordinator
//! ```
//!
//! A watcher owns its private state and is only ever touched by its task.
//! The task polls on the watcher's interval, or immediately when the
//! coordinator requests a poll, and publishes each result on a watch channel.

mod build;
mod errors;
mod files;
mod git;
mod processes;

pub use build::BuildWatcher;
pub use errors::{ErrorSlice, ErrorWatcher};
pub use files::{FileSlice, FileWatcher};
pub use git::{GitWatcher, parse_porcelain};
pub use processes::ProcessWatcher;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// One independently scheduled producer of a snapshot slice.
#[async_trait]
pub trait Watcher: Send + 'static {
    type Slice: Send + Sync + 'static;

    /// Name for logging.
    fn name(&self) -> &'static str;

    fn interval(&self) -> Duration;

    /// Recomputes the slice. `forced` is set when the poll was requested
    /// out of cycle, so expensive work on a slower cadence should run too.
    async fn poll(&mut self, forced: bool) -> Self::Slice;
}

/// The latest slice a watcher produced.
#[derive(Debug)]
pub struct Published<T> {
    /// Number of completed polls
    pub generation: u64,
    /// Highest poll request observed before the poll that produced `value`
    pub served: u64,
    pub value: Option<Arc<T>>,
}

impl<T> Default for Published<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            served: 0,
            value: None,
        }
    }
}

/// The coordinator's side of a running watcher task.
pub struct WatcherHandle<T> {
    name: &'static str,
    slice: watch::Receiver<Published<T>>,
    requests: watch::Sender<u64>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> WatcherHandle<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The most recent slice, if the first poll has finished.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slice.borrow().value.clone()
    }

    pub fn generation(&self) -> u64 {
        self.slice.borrow().generation
    }

    /// Asks the task to poll now. Returns the request id to pass to
    /// [`WatcherHandle::fresh`].
    pub fn request_poll(&self) -> u64 {
        let mut id = 0;
        self.requests.send_modify(|current| {
            *current += 1;
            id = *current;
        });
        id
    }

    /// Waits up to `limit` for a slice produced by a poll that started after
    /// `request` was made, falling back to the latest slice on timeout.
    pub async fn fresh(&self, request: u64, limit: Duration) -> Option<Arc<T>> {
        let mut slice = self.slice.clone();
        let waited = tokio::time::timeout(
            limit,
            slice.wait_for(|p| p.value.is_some() && p.served >= request),
        )
        .await;
        match waited {
            Ok(Ok(published)) => published.value.clone(),
            Ok(Err(_)) => self.latest(),
            Err(_) => {
                tracing::warn!("[{}] no fresh slice within {limit:?}, using the previous one", self.name);
                self.latest()
            }
        }
    }

    /// Waits for the task to exit after its cancellation token fired.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!("[{}] watcher task panicked", self.name);
            }
        }
    }
}

/// Starts `watcher` on its own task. The first poll runs immediately.
pub fn spawn<W: Watcher>(mut watcher: W, cancel: CancellationToken) -> WatcherHandle<W::Slice> {
    let name = watcher.name();
    let (slice_tx, slice_rx) = watch::channel(Published::default());
    let (request_tx, mut request_rx) = watch::channel(0_u64);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(watcher.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut generation = 0_u64;
        crate::debug_event!(name, "started", "every {:?}", watcher.interval());

        loop {
            let forced = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => false,
                changed = request_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    true
                }
            };
            let served = *request_rx.borrow_and_update();

            let value = tokio::select! {
                _ = cancel.cancelled() => break,
                value = watcher.poll(forced) => value,
            };
            generation += 1;
            slice_tx.send_replace(Published {
                generation,
                served,
                value: Some(Arc::new(value)),
            });
            if forced {
                ticker.reset();
            }
        }
        crate::debug_event!(name, "stopped");
    });

    WatcherHandle {
        name,
        slice: slice_rx,
        requests: request_tx,
        task,
    }
}
