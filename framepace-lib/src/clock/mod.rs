//! Playback clocks.
//!
//! - [`wall`] measures host time since the playback timer started.
//! - [`device`] reads the audio device's played position while it streams.
//! - [`timer`] picks between the two on every query.

pub mod device;
pub mod timer;
pub mod wall;

pub use device::DeviceClock;
pub use timer::PlaybackTimer;
pub use wall::WallClock;

/// A time source able to report elapsed playback microseconds.
pub trait ReferenceClock {
    /// Elapsed microseconds, or `None` while the clock cannot be trusted.
    fn reading_micros(&self) -> Option<i64>;
}

/// Which reference clock answered the latest `elapsed()` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    Device,
    Wall,
}
