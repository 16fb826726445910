//! High-level playback controller.

mod controls;
mod runtime;
mod settings;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::delivery::Delivery;
use crate::settings::PlaybackSettings;
use crate::sink::SinkProvider;
use crate::source::FrameSource;

use super::pipeline::PipelineStats;
use super::session::Session;

/// Builds a fresh source for every session.
pub type SourceFactory = dyn Fn() -> Box<dyn FrameSource + Send> + Send + Sync;

/// Pump loop state of the current (or last) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Priming,
    Running,
    Draining,
    Stopped,
}

/// Counters and clock state of the current (or last) session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionStats {
    pub state: PumpState,
    pub iterations: u64,
    pub backpressure_suspensions: u64,
    pub longest_suspension: Duration,
    pub elapsed_us: i64,
    pub clock_active: bool,
    pub device_clock_seen: bool,
    pub video: PipelineStats,
    pub audio: PipelineStats,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            state: PumpState::Idle,
            iterations: 0,
            backpressure_suspensions: 0,
            longest_suspension: Duration::ZERO,
            elapsed_us: 0,
            clock_active: false,
            device_clock_seen: false,
            video: PipelineStats::default(),
            audio: PipelineStats::default(),
        }
    }
}

/// Primary playback controller.
///
/// `Player` owns at most one live session. Each `start()` builds a new source
/// through the factory and runs a pump thread until end of media, a fatal
/// error, or `stop()`.
#[derive(Clone)]
pub struct Player {
    settings: PlaybackSettings,
    source_factory: Arc<SourceFactory>,
    sink_provider: Option<Arc<dyn SinkProvider>>,
    delivery: Delivery,
    session: Arc<Mutex<Option<Arc<Session>>>>,
    pump_thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    session_id: Arc<AtomicU64>,
}

impl Player {
    /// Start configuring a player around a source factory and its consumers.
    pub fn builder<F>(source_factory: F, delivery: Delivery) -> PlayerBuilder
    where
        F: Fn() -> Box<dyn FrameSource + Send> + Send + Sync + 'static,
    {
        PlayerBuilder::new(source_factory, delivery)
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }
}

/// Optional capabilities injected before the first session.
pub struct PlayerBuilder {
    settings: PlaybackSettings,
    source_factory: Arc<SourceFactory>,
    sink_provider: Option<Arc<dyn SinkProvider>>,
    delivery: Delivery,
}

impl PlayerBuilder {
    pub fn new<F>(source_factory: F, delivery: Delivery) -> Self
    where
        F: Fn() -> Box<dyn FrameSource + Send> + Send + Sync + 'static,
    {
        Self {
            settings: PlaybackSettings::default(),
            source_factory: Arc::new(source_factory),
            sink_provider: None,
            delivery,
        }
    }

    /// Output device used when the media has audio. Without one, playback
    /// paces against the wall clock only.
    pub fn sink_provider(mut self, provider: Arc<dyn SinkProvider>) -> Self {
        self.sink_provider = Some(provider);
        self
    }

    pub fn settings(mut self, settings: PlaybackSettings) -> Self {
        self.settings = settings.sanitized();
        self
    }

    pub fn build(self) -> Player {
        Player {
            settings: self.settings.sanitized(),
            source_factory: self.source_factory,
            sink_provider: self.sink_provider,
            delivery: self.delivery,
            session: Arc::new(Mutex::new(None)),
            pump_thread: Arc::new(Mutex::new(None)),
            session_id: Arc::new(AtomicU64::new(0)),
        }
    }
}
