use std::time::{Duration, Instant};

use super::ReferenceClock;

/// Host-time stopwatch started when the playback timer binds its anchor.
///
/// Always valid; does not notice device stalls.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    start_time: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn get_time(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn elapsed_micros(&self) -> i64 {
        self.get_time().as_micros() as i64
    }
}

impl ReferenceClock for WallClock {
    fn reading_micros(&self) -> Option<i64> {
        Some(self.elapsed_micros())
    }
}
