use std::sync::Arc;

use crate::sink::AudioSink;

use super::ReferenceClock;

/// Clock backed by the audio device's played position.
///
/// Only valid while the device reports open and running with a non-negative
/// position. An underrun or stop invalidates it until the device runs again.
#[derive(Clone)]
pub struct DeviceClock {
    sink: Arc<dyn AudioSink>,
}

impl DeviceClock {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self { sink }
    }

    pub fn is_valid(&self) -> bool {
        self.valid_position().is_some()
    }

    fn valid_position(&self) -> Option<i64> {
        if !(self.sink.is_open() && self.sink.is_running()) {
            return None;
        }
        // Some devices report a negative position while they spin up.
        let position = self.sink.position_micros();
        (position >= 0).then_some(position)
    }
}

impl ReferenceClock for DeviceClock {
    fn reading_micros(&self) -> Option<i64> {
        self.valid_position()
    }
}
