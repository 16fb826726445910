//! Headless audio sink that consumes written audio in real time.
//!
//! The virtual device behaves like a hardware output for pacing purposes: it
//! only runs while it is started and holds queued audio, it underruns when the
//! queue empties, and its position advances with the wall clock while it runs.
//! An optional startup latency delays the first consumption after `start()`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::SinkError;

use super::{AudioFormat, AudioSink, SinkProvider};

const POLL_MS: u64 = 2;

/// Opens [`VirtualSink`]s.
#[derive(Debug, Clone, Default)]
pub struct VirtualSinkProvider {
    startup_latency: Duration,
}

impl VirtualSinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay between `start()` and the device consuming its first sample.
    pub fn with_startup_latency(mut self, latency: Duration) -> Self {
        self.startup_latency = latency;
        self
    }
}

impl SinkProvider for VirtualSinkProvider {
    fn open(
        &self,
        format: AudioFormat,
        buffer_size: usize,
    ) -> Result<Arc<dyn AudioSink>, SinkError> {
        Ok(Arc::new(VirtualSink::open(
            format,
            buffer_size,
            self.startup_latency,
        )?))
    }
}

struct DeviceState {
    open: bool,
    started: bool,
    consume_from: Option<Instant>,
    last_tick: Instant,
    carry_us: u64,
    queued_frames: u64,
    played_frames: u64,
    underruns: u64,
}

/// Software output device with a bounded buffer.
pub struct VirtualSink {
    format: AudioFormat,
    capacity_frames: u64,
    startup_latency: Duration,
    state: Mutex<DeviceState>,
}

impl VirtualSink {
    pub fn open(
        format: AudioFormat,
        buffer_size: usize,
        startup_latency: Duration,
    ) -> Result<Self, SinkError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(SinkError::Unsupported(format!(
                "{} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }
        let capacity_frames = (buffer_size / format.bytes_per_frame()).max(1) as u64;
        info!(
            "virtual audio device opened: {} Hz, {} channels, {} frame buffer",
            format.sample_rate, format.channels, capacity_frames
        );
        Ok(Self {
            format,
            capacity_frames,
            startup_latency,
            state: Mutex::new(DeviceState {
                open: true,
                started: false,
                consume_from: None,
                last_tick: Instant::now(),
                carry_us: 0,
                queued_frames: 0,
                played_frames: 0,
                underruns: 0,
            }),
        })
    }

    /// Number of times the queue ran dry while the device was started.
    pub fn underruns(&self) -> u64 {
        self.state.lock().unwrap().underruns
    }

    /// Consume audio for the time that passed since the last tick.
    fn advance(&self, state: &mut DeviceState, now: Instant) {
        let from = match state.consume_from {
            Some(from) if state.started => from.max(state.last_tick),
            _ => {
                state.last_tick = now;
                return;
            }
        };
        state.last_tick = now;
        if now <= from || state.queued_frames == 0 {
            return;
        }

        let rate = self.format.sample_rate as u64;
        state.carry_us += now.duration_since(from).as_micros() as u64;
        let frames = state.carry_us * rate / 1_000_000;
        state.carry_us -= frames * 1_000_000 / rate;

        let consumed = frames.min(state.queued_frames);
        state.queued_frames -= consumed;
        state.played_frames += consumed;
        if state.queued_frames == 0 {
            state.carry_us = 0;
            state.underruns += 1;
            debug!(
                "virtual audio device underrun at {} frames",
                state.played_frames
            );
        }
    }
}

impl AudioSink for VirtualSink {
    fn start(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(SinkError::Closed);
        }
        if !state.started {
            let now = Instant::now();
            state.started = true;
            state.last_tick = now;
            state.consume_from = Some(now + self.startup_latency);
        }
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, SinkError> {
        let frame_bytes = self.format.bytes_per_frame();
        let frames = (bytes.len() / frame_bytes) as u64;
        if frames == 0 {
            return Ok(0);
        }

        loop {
            let mut state = self.state.lock().unwrap();
            if !state.open {
                return Err(SinkError::Closed);
            }
            self.advance(&mut state, Instant::now());
            let free = self.capacity_frames.saturating_sub(state.queued_frames);
            // A stopped device never frees space, so accept what fits. A chunk
            // larger than the whole buffer is accepted once the queue is empty.
            if free >= frames || state.queued_frames == 0 || !state.started {
                let accepted = if state.started { frames } else { frames.min(free) };
                state.queued_frames += accepted;
                return Ok(accepted as usize * frame_bytes);
            }
            drop(state);
            thread::sleep(Duration::from_millis(POLL_MS));
        }
    }

    fn position_micros(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        self.advance(&mut state, Instant::now());
        (state.played_frames * 1_000_000 / self.format.sample_rate as u64) as i64
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn is_running(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        self.advance(&mut state, now);
        let consuming = state.consume_from.map(|from| now >= from).unwrap_or(false);
        state.open && state.started && consuming && state.queued_frames > 0
    }

    fn drain(&self) {
        let bound = {
            let state = self.state.lock().unwrap();
            if !state.started {
                return;
            }
            Duration::from_micros(
                state.queued_frames * 1_000_000 / self.format.sample_rate as u64,
            ) + self.startup_latency
                + Duration::from_millis(100)
        };
        let deadline = Instant::now() + bound;
        while Instant::now() < deadline {
            {
                let mut state = self.state.lock().unwrap();
                self.advance(&mut state, Instant::now());
                if !state.started || state.queued_frames == 0 {
                    return;
                }
            }
            thread::sleep(Duration::from_millis(POLL_MS));
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        self.advance(&mut state, Instant::now());
        state.started = false;
        state.consume_from = None;
        state.queued_frames = 0;
        state.carry_us = 0;
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        state.started = false;
        state.queued_frames = 0;
    }
}
