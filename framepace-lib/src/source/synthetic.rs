//! Generated test pattern: a moving bar at a fixed frame rate plus a sine tone.
//!
//! Frames come out in timestamp order as fast as they are pulled, so a pump
//! reading this source is always ahead of real time and must throttle itself.
//! Optional jitter stalls some pulls to imitate uneven decoder output.

use std::f32::consts::PI;
use std::thread;
use std::time::Duration;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::SourceError;
use crate::frame::{Frame, Image, MediaInfo, PixelFormat, Samples};

use super::FrameSource;

const PATTERN_FORMAT: PixelFormat = PixelFormat::Rgb24;

/// Shape of the generated media.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub duration: Duration,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub tone_hz: f32,
    /// Length of each audio frame.
    pub audio_chunk: Duration,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(3),
            width: 160,
            height: 90,
            frame_rate: 30.0,
            sample_rate: 44_100,
            channels: 2,
            tone_hz: 440.0,
            audio_chunk: Duration::from_millis(20),
        }
    }
}

struct Jitter {
    rng: StdRng,
    probability: f64,
    max_stall: Duration,
}

/// Source generating [`SyntheticConfig`] media.
pub struct SyntheticSource {
    config: SyntheticConfig,
    jitter: Option<Jitter>,
    open: bool,
    video_index: u64,
    audio_index: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            jitter: None,
            open: false,
            video_index: 0,
            audio_index: 0,
        }
    }

    /// Stall a random share of pulls by up to `max_stall`, reproducibly.
    pub fn with_jitter(mut self, seed: u64, probability: f64, max_stall: Duration) -> Self {
        self.jitter = Some(Jitter {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
            max_stall,
        });
        self
    }

    fn has_video(&self) -> bool {
        self.config.width > 0 && self.config.height > 0 && self.config.frame_rate > 0.0
    }

    fn has_audio(&self) -> bool {
        self.config.channels > 0 && self.config.sample_rate > 0 && !self.config.audio_chunk.is_zero()
    }

    fn video_timestamp(&self) -> Option<i64> {
        if !self.has_video() {
            return None;
        }
        let ts = (self.video_index as f64 * 1_000_000.0 / self.config.frame_rate) as i64;
        (ts < self.config.duration.as_micros() as i64).then_some(ts)
    }

    fn audio_timestamp(&self) -> Option<i64> {
        if !self.has_audio() {
            return None;
        }
        let ts = (self.audio_index as u128 * self.config.audio_chunk.as_micros()) as i64;
        (ts < self.config.duration.as_micros() as i64).then_some(ts)
    }

    fn video_frame(&mut self, timestamp_us: i64) -> Frame {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let pixel = PATTERN_FORMAT.bytes_per_pixel().unwrap_or(3);
        let stride = width * pixel;
        let mut data = vec![16u8; stride * height];
        let bar = (self.video_index as usize * 2) % width;
        for row in 0..height {
            let offset = row * stride + bar * pixel;
            data[offset..offset + pixel].fill(235);
        }
        self.video_index += 1;
        Frame::video(
            timestamp_us,
            Image {
                width: self.config.width,
                height: self.config.height,
                pixel_format: PATTERN_FORMAT,
                stride,
                data,
            },
        )
    }

    fn audio_frame(&mut self, timestamp_us: i64) -> Frame {
        let rate = self.config.sample_rate;
        let channels = self.config.channels as usize;
        let frames = (rate as u128 * self.config.audio_chunk.as_micros() / 1_000_000) as usize;
        let first = (timestamp_us as i128 * rate as i128 / 1_000_000) as usize;
        let mut data = Vec::with_capacity(frames * channels);
        for n in 0..frames {
            let t = (first + n) as f32 / rate as f32;
            let value = ((2.0 * PI * self.config.tone_hz * t).sin() * 0.2 * i16::MAX as f32) as i16;
            data.extend(std::iter::repeat(value).take(channels));
        }
        self.audio_index += 1;
        Frame::audio(
            timestamp_us,
            Samples {
                channels: self.config.channels,
                sample_rate: rate,
                data,
            },
        )
    }

    fn maybe_stall(&mut self) {
        if let Some(jitter) = self.jitter.as_mut() {
            if jitter.rng.gen_bool(jitter.probability) {
                let max = jitter.max_stall.as_micros().max(1) as u64;
                let stall = Duration::from_micros(jitter.rng.gen_range(0..max));
                debug!("synthetic decoder stalling for {:?}", stall);
                thread::sleep(stall);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self, locator: &str) -> Result<MediaInfo, SourceError> {
        if !self.has_video() && !self.has_audio() {
            return Err(SourceError::Unsupported(format!(
                "synthetic source '{}' has no streams",
                locator
            )));
        }
        self.open = true;
        self.video_index = 0;
        self.audio_index = 0;
        Ok(MediaInfo {
            image_width: if self.has_video() { self.config.width } else { 0 },
            image_height: if self.has_video() { self.config.height } else { 0 },
            pixel_format: PATTERN_FORMAT,
            channel_count: if self.has_audio() { self.config.channels } else { 0 },
            sample_rate: if self.has_audio() { self.config.sample_rate } else { 0 },
            frame_rate: self.config.frame_rate,
        })
    }

    fn pull(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::Closed);
        }
        self.maybe_stall();
        let frame = match (self.audio_timestamp(), self.video_timestamp()) {
            (Some(audio), Some(video)) if audio <= video => self.audio_frame(audio),
            (_, Some(video)) => self.video_frame(video),
            (Some(audio), None) => self.audio_frame(audio),
            (None, None) => return Ok(None),
        };
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.open = false;
    }
}
