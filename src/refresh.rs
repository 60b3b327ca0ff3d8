//! Refresh scheduler: background loop keeping the cache current.
//!
//! Every interval the scheduler checks that storage still points at the
//! dataset it started with, then asks the cache to refresh. Any failure is
//! fatal: the loop stops and hands the error to its host, which is expected
//! to stop serving rather than answer from a snapshot that can no longer be
//! brought up to date.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::cache::{GraphCache, RefreshOutcome};
use crate::error::{GraphError, Result};
use crate::graph::Checkpoint;

/// Default time between checkpoint polls.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

// ─── Observers ─────────────────────────────────────────────────────

/// Receives the result of every scheduler tick.
pub trait RefreshObserver: Send + Sync {
    fn on_updated(&self, _checkpoint: Checkpoint, _elapsed: Duration) {}
    fn on_unchanged(&self, _checkpoint: Checkpoint) {}
    fn on_failed(&self, _error: &GraphError) {}
}

/// Logs every tick through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl RefreshObserver for TracingObserver {
    fn on_updated(&self, checkpoint: Checkpoint, elapsed: Duration) {
        info!(
            checkpoint = checkpoint.counter,
            checkpoint_time = checkpoint.timestamp,
            elapsed_ms = elapsed.as_millis() as u64,
            "graph updated"
        );
    }

    fn on_unchanged(&self, checkpoint: Checkpoint) {
        debug!(checkpoint = %checkpoint, "checkpoint unchanged");
    }

    fn on_failed(&self, error: &GraphError) {
        error!(error = %error, "graph refresh failed");
    }
}

/// Success and failure gauges plus the duration of the last update.
#[derive(Debug, Default)]
pub struct RefreshStats {
    successful: AtomicU64,
    failed: AtomicU64,
    last_update_ms: AtomicU64,
}

impl RefreshStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successful_updates(&self) -> u64 {
        self.successful.load(Ordering::SeqCst)
    }

    pub fn failed_updates(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms.load(Ordering::SeqCst)
    }
}

impl RefreshObserver for RefreshStats {
    fn on_updated(&self, _checkpoint: Checkpoint, elapsed: Duration) {
        self.successful.fetch_add(1, Ordering::SeqCst);
        self.last_update_ms
            .store(elapsed.as_millis() as u64, Ordering::SeqCst);
    }

    fn on_failed(&self, _error: &GraphError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

// ─── Scheduler ─────────────────────────────────────────────────────

pub struct RefreshScheduler {
    cache: Arc<GraphCache>,
    interval: Duration,
    rebuild_timeout: Option<Duration>,
    observers: Vec<Arc<dyn RefreshObserver>>,
    identity: String,
}

impl RefreshScheduler {
    /// Create a scheduler for `cache`, pinning the dataset identity storage
    /// reports right now.
    pub fn new(cache: Arc<GraphCache>, interval: Duration) -> Result<Self> {
        let identity = cache.storage().dataset_identity()?;
        Ok(Self {
            cache,
            interval,
            rebuild_timeout: None,
            observers: vec![Arc::new(TracingObserver)],
            identity,
        })
    }

    /// Bound each refresh. Exceeding the bound is fatal.
    pub fn with_rebuild_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.rebuild_timeout = timeout;
        self
    }

    pub fn observe(mut self, observer: Arc<dyn RefreshObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One scheduler iteration without the sleep.
    pub fn tick(&self) -> Result<RefreshOutcome> {
        self.tick_with(false)
    }

    /// Like [`tick`](Self::tick) but rebuilds even if the checkpoint did not
    /// move. The dataset identity is still checked first.
    pub fn force_tick(&self) -> Result<RefreshOutcome> {
        self.tick_with(true)
    }

    fn tick_with(&self, force: bool) -> Result<RefreshOutcome> {
        let result = self.check_identity().and_then(|()| self.refresh(force));
        match &result {
            Ok(RefreshOutcome::Updated { checkpoint, elapsed }) => {
                for o in &self.observers {
                    o.on_updated(*checkpoint, *elapsed);
                }
            }
            Ok(RefreshOutcome::Unchanged(checkpoint)) => {
                for o in &self.observers {
                    o.on_unchanged(*checkpoint);
                }
            }
            Err(e) => {
                for o in &self.observers {
                    o.on_failed(e);
                }
            }
        }
        result
    }

    fn check_identity(&self) -> Result<()> {
        let found = self
            .cache
            .storage()
            .dataset_identity()
            .map_err(GraphError::RebuildFailed)?;
        if found != self.identity {
            return Err(GraphError::DatasetChanged {
                expected: self.identity.clone(),
                found,
            });
        }
        Ok(())
    }

    fn refresh(&self, force: bool) -> Result<RefreshOutcome> {
        let run = move |cache: &GraphCache| {
            if force {
                cache.force_rebuild()
            } else {
                cache.refresh()
            }
        };
        let Some(timeout) = self.rebuild_timeout else {
            return run(&*self.cache);
        };

        let (tx, rx) = mpsc::channel();
        let cache = Arc::clone(&self.cache);
        thread::Builder::new()
            .name("permgraph-rebuild".into())
            .spawn(move || {
                // receiver is gone once the deadline passed
                let _ = tx.send(run(&*cache));
            })
            .map_err(|e| GraphError::RebuildFailed(e.into()))?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(GraphError::RebuildTimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(GraphError::RebuildFailed(
                std::io::Error::new(std::io::ErrorKind::Other, "rebuild thread panicked").into(),
            )),
        }
    }

    /// Run until told to stop or a tick fails.
    ///
    /// Dropping every sender also stops the loop. The returned error is
    /// always fatal.
    pub fn run(&self, commands: &Receiver<Command>) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            dataset = %self.identity,
            "refresh scheduler started"
        );
        loop {
            match commands.recv_timeout(self.interval) {
                Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    info!("refresh scheduler stopped");
                    return Ok(());
                }
                Ok(Command::Rebuild(reply)) => {
                    match self.force_tick() {
                        Ok(outcome) => {
                            let _ = reply.send(Ok(outcome));
                        }
                        Err(e) => {
                            error!(error = %e, "forced rebuild failed, stopping refresh scheduler");
                            let _ = reply.send(Err(e.to_string()));
                            return Err(e);
                        }
                    }
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            if let Err(e) = self.tick() {
                error!(error = %e, "stopping refresh scheduler");
                return Err(e);
            }
        }
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> Result<SchedulerHandle> {
        let (tx, rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("permgraph-refresh".into())
            .spawn(move || self.run(&rx))?;
        Ok(SchedulerHandle {
            control: SchedulerControl(tx),
            thread,
        })
    }
}

// ─── Control ───────────────────────────────────────────────────────

/// Messages accepted by a running scheduler loop.
#[derive(Debug)]
pub enum Command {
    Stop,
    /// Rebuild now through [`RefreshScheduler::force_tick`]. The outcome,
    /// or the message of the error that stopped the loop, is sent back.
    Rebuild(Sender<std::result::Result<RefreshOutcome, String>>),
}

/// Sends commands to a running scheduler. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SchedulerControl(Sender<Command>);

impl SchedulerControl {
    /// A control with no loop behind it. Stopping is a no-op and rebuilds
    /// fail with `SchedulerStopped`.
    pub fn detached() -> Self {
        let (tx, _) = mpsc::channel();
        SchedulerControl(tx)
    }

    pub fn stop(&self) {
        // already stopped if the loop has exited
        let _ = self.0.send(Command::Stop);
    }

    /// Ask the loop for a forced rebuild and wait for it.
    ///
    /// Any error is fatal: the loop has stopped and returns the original
    /// error through its handle.
    pub fn rebuild(&self) -> Result<RefreshOutcome> {
        let (tx, rx) = mpsc::channel();
        self.0
            .send(Command::Rebuild(tx))
            .map_err(|_| GraphError::SchedulerStopped("not running".into()))?;
        match rx.recv() {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(message)) => Err(GraphError::SchedulerStopped(message)),
            Err(_) => Err(GraphError::SchedulerStopped("exited before rebuilding".into())),
        }
    }
}

impl From<Sender<Command>> for SchedulerControl {
    fn from(sender: Sender<Command>) -> Self {
        SchedulerControl(sender)
    }
}

pub struct SchedulerHandle {
    control: SchedulerControl,
    thread: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    pub fn control(&self) -> SchedulerControl {
        self.control.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Stop the loop and wait for it.
    pub fn stop(self) -> Result<()> {
        self.control.stop();
        self.join()
    }

    /// Wait for the loop to end on its own, returning its fatal error.
    pub fn join(self) -> Result<()> {
        match self.thread.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
