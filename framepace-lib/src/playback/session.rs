//! One playback attempt and the resources it owns.
//!
//! Every resource sits in an `Option` and is taken out exactly once, so the
//! teardown run by `stop()` and the one run by the pump's exit guard can race
//! without closing anything twice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::cancel::Cancellation;
use crate::clock::PlaybackTimer;
use crate::error::SourceError;
use crate::frame::{Frame, MediaInfo};
use crate::settings::PlaybackSettings;
use crate::sink::AudioSink;
use crate::source::FrameSource;

use super::pipeline::{DispatchPipeline, MediaKind, PipelineCounters};
use super::player::{PumpState, SessionStats};

pub(crate) type BoxedSource = Box<dyn FrameSource + Send>;

const SOURCE_LOCK_POLL_MS: u64 = 5;

pub(crate) struct Pipelines {
    pub(crate) video: DispatchPipeline,
    pub(crate) audio: DispatchPipeline,
}

impl Pipelines {
    fn shutdown(mut self, timeout: Duration) {
        for pipeline in [&mut self.video, &mut self.audio] {
            let exited = pipeline.shutdown(timeout);
            let stats = pipeline.stats();
            if exited {
                debug!(
                    "{} pipeline stopped: {} delivered, {} failed, {} skipped",
                    pipeline.kind().name(),
                    stats.delivered,
                    stats.failed,
                    stats.skipped
                );
            }
        }
    }
}

pub(crate) struct Session {
    id: u64,
    settings: PlaybackSettings,
    cancel: Cancellation,
    state: Mutex<PumpState>,
    source: Mutex<Option<BoxedSource>>,
    sink: Mutex<Option<Arc<dyn AudioSink>>>,
    pipelines: Mutex<Option<Pipelines>>,
    timer: Mutex<Option<Arc<PlaybackTimer>>>,
    video_counters: Mutex<Option<Arc<PipelineCounters>>>,
    audio_counters: Mutex<Option<Arc<PipelineCounters>>>,
    iterations: AtomicU64,
    backpressure_suspensions: AtomicU64,
    longest_suspension_us: AtomicU64,
    pump_finished: AtomicBool,
    /// Pump and pipeline worker threads, where consumers run.
    threads: Mutex<Vec<ThreadId>>,
}

impl Session {
    pub(crate) fn new(id: u64, settings: PlaybackSettings, source: BoxedSource) -> Self {
        Self {
            id,
            settings,
            cancel: Cancellation::new(),
            state: Mutex::new(PumpState::Idle),
            source: Mutex::new(Some(source)),
            sink: Mutex::new(None),
            pipelines: Mutex::new(None),
            timer: Mutex::new(None),
            video_counters: Mutex::new(None),
            audio_counters: Mutex::new(None),
            iterations: AtomicU64::new(0),
            backpressure_suspensions: AtomicU64::new(0),
            longest_suspension_us: AtomicU64::new(0),
            pump_finished: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }

    pub(crate) fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn state(&self) -> PumpState {
        *self.state.lock().unwrap()
    }

    /// Move to `next`. `Stopped` is terminal.
    pub(crate) fn set_state(&self, next: PumpState) {
        let mut state = self.state.lock().unwrap();
        if *state != PumpState::Stopped && *state != next {
            debug!("session {}: {:?} -> {:?}", self.id, *state, next);
            *state = next;
        }
    }

    pub(crate) fn open_source(&self, locator: &str) -> Result<MediaInfo, SourceError> {
        let mut source = self.source.lock().unwrap();
        source.as_mut().ok_or(SourceError::Closed)?.open(locator)
    }

    /// Pull the next frame, failing with [`SourceError::Closed`] after teardown.
    pub(crate) fn pull(&self) -> Result<Option<Frame>, SourceError> {
        let mut source = self.source.lock().unwrap();
        source.as_mut().ok_or(SourceError::Closed)?.pull()
    }

    pub(crate) fn install_sink(&self, sink: Arc<dyn AudioSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    pub(crate) fn sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.sink.lock().unwrap().clone()
    }

    pub(crate) fn install_pipelines(&self, pipelines: Pipelines, timer: Arc<PlaybackTimer>) {
        *self.video_counters.lock().unwrap() = Some(pipelines.video.counters());
        *self.audio_counters.lock().unwrap() = Some(pipelines.audio.counters());
        *self.timer.lock().unwrap() = Some(timer);
        for id in [pipelines.video.thread_id(), pipelines.audio.thread_id()]
            .into_iter()
            .flatten()
        {
            self.register_thread(id);
        }
        *self.pipelines.lock().unwrap() = Some(pipelines);
    }

    pub(crate) fn register_thread(&self, id: ThreadId) {
        self.threads.lock().unwrap().push(id);
    }

    /// True when called from the pump or one of the pipeline workers.
    pub(crate) fn runs_on_current_thread(&self) -> bool {
        let current = thread::current().id();
        self.threads.lock().unwrap().contains(&current)
    }

    /// Hand a frame duplicate to the pipeline for `kind`.
    ///
    /// After teardown the duplicate is dropped and `false` is returned.
    pub(crate) fn dispatch(&self, kind: MediaKind, frame: Frame, relative_us: i64) -> bool {
        let pipelines = self.pipelines.lock().unwrap();
        match pipelines.as_ref() {
            Some(pipelines) => match kind {
                MediaKind::Video => pipelines.video.submit(frame, relative_us),
                MediaKind::Audio => pipelines.audio.submit(frame, relative_us),
            },
            None => false,
        }
    }

    /// Let both pipelines finish their queued deliveries.
    pub(crate) fn drain_pipelines(&self) {
        let pipelines = self.pipelines.lock().unwrap().take();
        if let Some(pipelines) = pipelines {
            pipelines.shutdown(self.settings.pipeline_shutdown());
        }
    }

    pub(crate) fn next_iteration(&self) -> u64 {
        self.iterations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_suspension(&self, suspension: Duration) {
        self.backpressure_suspensions.fetch_add(1, Ordering::Relaxed);
        self.longest_suspension_us
            .fetch_max(suspension.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn mark_pump_finished(&self) {
        self.pump_finished.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pump_finished(&self) -> bool {
        self.pump_finished.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let timer = self.timer.lock().unwrap().clone();
        let snapshot = |counters: &Mutex<Option<Arc<PipelineCounters>>>| {
            counters
                .lock()
                .unwrap()
                .as_ref()
                .map(|counters| counters.snapshot())
                .unwrap_or_default()
        };
        SessionStats {
            state: self.state(),
            iterations: self.iterations.load(Ordering::Relaxed),
            backpressure_suspensions: self.backpressure_suspensions.load(Ordering::Relaxed),
            longest_suspension: Duration::from_micros(
                self.longest_suspension_us.load(Ordering::Relaxed),
            ),
            elapsed_us: timer.as_ref().map(|timer| timer.elapsed()).unwrap_or(0),
            clock_active: timer
                .as_ref()
                .map(|timer| timer.is_clock_active())
                .unwrap_or(false),
            device_clock_seen: timer
                .as_ref()
                .map(|timer| timer.device_ever_running())
                .unwrap_or(false),
            video: snapshot(&self.video_counters),
            audio: snapshot(&self.audio_counters),
        }
    }

    /// Release everything the session owns.
    ///
    /// Order: sink (stop, drain, close), source, then both pipelines. Safe to
    /// call from several threads and more than once.
    pub(crate) fn teardown(&self) {
        if let Some(sink) = self.sink.lock().unwrap().take() {
            sink.stop();
            sink.drain();
            sink.close();
            debug!("session {}: audio sink closed", self.id);
        }

        match self.take_source(self.settings.stop_join_timeout()) {
            Ok(Some(mut source)) => {
                source.close();
                debug!("session {}: source closed", self.id);
            }
            Ok(None) => {}
            Err(()) => error!(
                "session {}: source still busy after {:?}; leaving it to the pump",
                self.id,
                self.settings.stop_join_timeout()
            ),
        }

        let pipelines = self.pipelines.lock().unwrap().take();
        if let Some(pipelines) = pipelines {
            pipelines.shutdown(self.settings.pipeline_shutdown());
        }
    }

    /// Take the source, waiting up to `wait` for a pull in progress.
    fn take_source(&self, wait: Duration) -> Result<Option<BoxedSource>, ()> {
        let deadline = Instant::now() + wait;
        loop {
            match self.source.try_lock() {
                Ok(mut source) => return Ok(source.take()),
                Err(TryLockError::Poisoned(poisoned)) => {
                    let mut source: MutexGuard<'_, Option<BoxedSource>> = poisoned.into_inner();
                    warn!("session {}: source lock poisoned", self.id);
                    return Ok(source.take());
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(());
                    }
                    thread::sleep(Duration::from_millis(SOURCE_LOCK_POLL_MS));
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.teardown();
        debug!("session {} released", self.id);
    }
}
