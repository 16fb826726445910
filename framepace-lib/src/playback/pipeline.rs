//! Single-worker, order-preserving delivery pipelines.
//!
//! The pump hands each pipeline a deep duplicate of a frame. The worker owns
//! that duplicate until the task finishes and the duplicate is dropped, which
//! is recorded as a release. Every submitted duplicate is released exactly
//! once: after delivery, after a failed or panicking consumer, when skipped
//! because the session was cancelled, or when the queue is already closed.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::cancel::Cancellation;
use crate::error::{DeliveryError, PlayerError};
use crate::frame::Frame;

const SHUTDOWN_POLL_MS: u64 = 5;

/// Media type served by a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

/// Snapshot of a pipeline's task counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub skipped: u64,
    pub released: u64,
}

impl PipelineStats {
    /// Tasks neither released nor finished yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.released)
    }
}

#[derive(Default)]
pub(crate) struct PipelineCounters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    released: AtomicU64,
}

impl PipelineCounters {
    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }
}

/// Frame duplicate owned by a queued task. Dropping it records the release.
struct OwnedFrame {
    frame: Frame,
    relative_us: i64,
    counters: Arc<PipelineCounters>,
}

impl Drop for OwnedFrame {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a handler did with a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    Delivered,
    /// Nothing was delivered, for instance because a wait was cancelled.
    Skipped,
}

pub(crate) type TaskHandler =
    Box<dyn Fn(&Frame, i64, &Cancellation) -> Result<TaskOutcome, DeliveryError> + Send>;

/// One worker thread draining an unbounded queue of frame tasks in order.
pub(crate) struct DispatchPipeline {
    kind: MediaKind,
    sender: Option<Sender<OwnedFrame>>,
    worker: Option<JoinHandle<()>>,
    cancel: Cancellation,
    counters: Arc<PipelineCounters>,
}

impl DispatchPipeline {
    /// Spawn the worker. The pipeline is cancelled together with `session`.
    pub(crate) fn spawn(
        kind: MediaKind,
        session: &Cancellation,
        handler: TaskHandler,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<OwnedFrame>();
        let cancel = session.child();
        let counters = Arc::new(PipelineCounters::default());

        let worker_cancel = cancel.clone();
        let worker_counters = counters.clone();
        let worker = thread::Builder::new()
            .name(format!("framepace-{}", kind.name()))
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    run_task(kind, &handler, task, &worker_cancel, &worker_counters);
                }
                debug!("{} pipeline worker exiting", kind.name());
            })?;

        Ok(Self {
            kind,
            sender: Some(sender),
            worker: Some(worker),
            cancel,
            counters,
        })
    }

    pub(crate) fn kind(&self) -> MediaKind {
        self.kind
    }

    pub(crate) fn thread_id(&self) -> Option<ThreadId> {
        self.worker.as_ref().map(|worker| worker.thread().id())
    }

    /// Queue `frame` without waiting for it to be delivered.
    ///
    /// Returns `false` when the pipeline no longer accepts work; the frame is
    /// released immediately in that case.
    pub(crate) fn submit(&self, frame: Frame, relative_us: i64) -> bool {
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        let task = OwnedFrame {
            frame,
            relative_us,
            counters: self.counters.clone(),
        };
        match &self.sender {
            Some(sender) => match sender.send(task) {
                Ok(()) => true,
                Err(_) => {
                    self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
            None => {
                self.counters.skipped.fetch_add(1, Ordering::SeqCst);
                drop(task);
                false
            }
        }
    }

    pub(crate) fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    pub(crate) fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Close the queue and wait for the worker.
    ///
    /// Queued tasks get `timeout` to complete. After that the pipeline is
    /// cancelled so the rest are released undelivered, and the worker gets
    /// `timeout` again before it is detached. Returns `true` when the worker
    /// exited.
    pub(crate) fn shutdown(&mut self, timeout: Duration) -> bool {
        self.sender.take();
        let Some(worker) = self.worker.take() else {
            return true;
        };

        if wait_for_exit(&worker, timeout) {
            join_worker(self.kind, worker);
            return true;
        }

        warn!(
            "{} pipeline did not drain within {:?}; cancelling remaining tasks",
            self.kind.name(),
            timeout
        );
        self.cancel.cancel();
        if wait_for_exit(&worker, timeout) {
            join_worker(self.kind, worker);
            return true;
        }

        error!(
            "{} pipeline worker still busy after forced cancellation; detaching it",
            self.kind.name()
        );
        false
    }
}

impl Drop for DispatchPipeline {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel.cancel();
            self.sender.take();
        }
    }
}

fn run_task(
    kind: MediaKind,
    handler: &TaskHandler,
    task: OwnedFrame,
    cancel: &Cancellation,
    counters: &PipelineCounters,
) {
    if cancel.is_cancelled() {
        counters.skipped.fetch_add(1, Ordering::SeqCst);
        return;
    }

    let result = catch_unwind(AssertUnwindSafe(|| {
        handler(&task.frame, task.relative_us, cancel)
    }));
    match result {
        Ok(Ok(TaskOutcome::Delivered)) => {
            counters.delivered.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Ok(TaskOutcome::Skipped)) => {
            counters.skipped.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Err(err)) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            warn!(
                "{} pipeline at {} us: {}",
                kind.name(),
                task.relative_us,
                PlayerError::Delivery(err)
            );
        }
        Err(panic) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            error!(
                "{} consumer panicked at {} us: {}",
                kind.name(),
                task.relative_us,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn wait_for_exit(worker: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !worker.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(SHUTDOWN_POLL_MS));
    }
    true
}

fn join_worker(kind: MediaKind, worker: JoinHandle<()>) {
    if worker.join().is_err() {
        warn!("{} pipeline thread panicked during join", kind.name());
    }
}
