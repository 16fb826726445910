//! Audio output devices.
//!
//! The pump opens a sink through a [`SinkProvider`] when the media has audio.
//! The sink is shared by the audio pipeline (writes), the playback timer
//! (position and running state), and teardown, so every method takes `&self`.

pub mod rodio_output;
pub mod virtual_device;

use std::sync::Arc;
use std::time::Duration;

use crate::error::SinkError;

/// PCM layout accepted by a sink: interleaved signed 16-bit little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn bytes_per_frame(&self) -> usize {
        Self::BYTES_PER_SAMPLE * self.channels as usize
    }

    /// Byte size of `duration` worth of audio, rounded to whole frames.
    pub fn buffer_size_for(&self, duration: Duration) -> usize {
        let frames = (self.sample_rate as u128 * duration.as_micros()) / 1_000_000;
        frames as usize * self.bytes_per_frame()
    }

    /// Playback length of `bytes` worth of audio.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame_bytes = self.bytes_per_frame();
        if frame_bytes == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (bytes / frame_bytes) as u64;
        Duration::from_micros(frames * 1_000_000 / self.sample_rate as u64)
    }

    /// Decode little-endian sink bytes back into `f32` samples.
    pub fn decode_f32(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(Self::BYTES_PER_SAMPLE)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 2f32.powi(15))
            .collect()
    }
}

/// An opened audio output device.
pub trait AudioSink: Send + Sync {
    /// Begin streaming. Until data arrives the device may still not run.
    fn start(&self) -> Result<(), SinkError>;

    /// Queue PCM bytes, returning how many were accepted.
    fn write(&self, bytes: &[u8]) -> Result<usize, SinkError>;

    /// Microseconds of audio the device has played since it started.
    fn position_micros(&self) -> i64;

    fn is_open(&self) -> bool;

    /// True while the device is actively playing (started and not underrun).
    fn is_running(&self) -> bool;

    /// Block until queued audio has been played or discarded.
    fn drain(&self);

    /// Stop output and discard anything still queued.
    fn stop(&self);

    /// Release the device. Further writes fail with [`SinkError::Closed`].
    fn close(&self);
}

/// Opens audio sinks for a session.
pub trait SinkProvider: Send + Sync {
    /// Open a sink for `format` with a device buffer of `buffer_size` bytes.
    fn open(&self, format: AudioFormat, buffer_size: usize)
        -> Result<Arc<dyn AudioSink>, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_is_whole_frames() {
        let format = AudioFormat::new(44_100, 2);
        assert_eq!(format.bytes_per_frame(), 4);
        assert_eq!(format.buffer_size_for(Duration::from_millis(750)), 33_075 * 4);
    }

    #[test]
    fn duration_of_bytes() {
        let format = AudioFormat::new(1000, 1);
        assert_eq!(format.duration_of(200), Duration::from_millis(100));
        assert_eq!(AudioFormat::new(0, 0).duration_of(200), Duration::ZERO);
    }

    #[test]
    fn decode_round_trips_full_scale() {
        let samples = AudioFormat::decode_f32(&i16::MIN.to_le_bytes());
        assert_eq!(samples, vec![-1.0]);
    }
}
