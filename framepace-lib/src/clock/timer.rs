//! Playback timer shared by the pump and the video pipeline.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use log::{info, warn};

use crate::sink::AudioSink;

use super::{ClockSource, DeviceClock, ReferenceClock, WallClock};

const SOURCE_NONE: u8 = 0;
const SOURCE_WALL: u8 = 1;
const SOURCE_DEVICE: u8 = 2;

struct Anchor {
    timestamp_us: i64,
    wall: WallClock,
}

/// Elapsed playback time measured against the best available clock.
///
/// The anchor is bound once by [`start`](Self::start). Every `elapsed()` call
/// asks the device clock first and falls back to wall time while the device
/// is not streaming. Switches between the two are logged but not smoothed.
pub struct PlaybackTimer {
    anchor: OnceLock<Anchor>,
    device: Option<DeviceClock>,
    device_ever_running: AtomicBool,
    device_announced: AtomicBool,
    last_source: AtomicU8,
}

impl PlaybackTimer {
    pub fn new(sink: Option<Arc<dyn AudioSink>>) -> Self {
        Self {
            anchor: OnceLock::new(),
            device: sink.map(DeviceClock::new),
            device_ever_running: AtomicBool::new(false),
            device_announced: AtomicBool::new(false),
            last_source: AtomicU8::new(SOURCE_NONE),
        }
    }

    /// Bind the anchor timestamp and start the wall clock.
    ///
    /// Returns `false` without changing anything when already started.
    pub fn start(&self, anchor_us: i64) -> bool {
        let mut bound = false;
        self.anchor.get_or_init(|| {
            bound = true;
            Anchor {
                timestamp_us: anchor_us,
                wall: WallClock::start(),
            }
        });
        if bound {
            info!("playback timer anchored at {} us", anchor_us);
        }
        bound
    }

    pub fn has_started(&self) -> bool {
        self.anchor.get().is_some()
    }

    pub fn anchor_timestamp(&self) -> Option<i64> {
        self.anchor.get().map(|anchor| anchor.timestamp_us)
    }

    /// Microseconds of playback since the anchor, 0 before `start()`.
    pub fn elapsed(&self) -> i64 {
        let Some(anchor) = self.anchor.get() else {
            return 0;
        };
        match self.device.as_ref().and_then(|device| device.reading_micros()) {
            Some(position) => {
                self.record_source(SOURCE_DEVICE);
                position
            }
            None => {
                self.record_source(SOURCE_WALL);
                anchor.wall.elapsed_micros()
            }
        }
    }

    /// True while the device clock is valid. Independent of `start()`.
    pub fn is_clock_active(&self) -> bool {
        let active = self
            .device
            .as_ref()
            .map(|device| device.is_valid())
            .unwrap_or(false);
        if active {
            self.device_ever_running.store(true, Ordering::Relaxed);
        }
        active
    }

    /// True once the device clock has been observed running this session.
    pub fn device_ever_running(&self) -> bool {
        self.device_ever_running.load(Ordering::Relaxed)
    }

    /// Clock that answered the latest `elapsed()` query.
    pub fn clock_source(&self) -> Option<ClockSource> {
        match self.last_source.load(Ordering::Relaxed) {
            SOURCE_DEVICE => Some(ClockSource::Device),
            SOURCE_WALL => Some(ClockSource::Wall),
            _ => None,
        }
    }

    fn record_source(&self, source: u8) {
        let previous = self.last_source.swap(source, Ordering::Relaxed);
        if previous == source {
            return;
        }
        match source {
            SOURCE_DEVICE => {
                self.device_ever_running.store(true, Ordering::Relaxed);
                if !self.device_announced.swap(true, Ordering::Relaxed) {
                    info!("device clock running; pacing against audio position");
                } else {
                    info!("device clock resumed");
                }
            }
            _ if previous == SOURCE_DEVICE => {
                warn!("device clock stalled; falling back to wall clock");
            }
            _ => {}
        }
    }
}
