//! Audio sink backed by the default `rodio` output device.
//!
//! `rodio::OutputStream` cannot leave the thread that opened it, so the stream
//! lives on a dedicated output thread until the sink is closed. Writes are
//! appended to a `rodio::Sink` as one chunk each; the played position is
//! inferred from how many chunks the sink has consumed plus the position inside
//! the chunk currently playing.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};

use crate::error::SinkError;

use super::{AudioFormat, AudioSink, SinkProvider};

const OUTPUT_STREAM_OPEN_RETRIES: usize = 20;
const OUTPUT_STREAM_OPEN_RETRY_MS: u64 = 100;
const WRITE_POLL_MS: u64 = 5;

/// Opens sinks on the system's default output device.
#[derive(Debug, Clone)]
pub struct RodioSinkProvider {
    open_retries: usize,
    retry_delay: Duration,
}

impl RodioSinkProvider {
    pub fn new() -> Self {
        Self {
            open_retries: OUTPUT_STREAM_OPEN_RETRIES,
            retry_delay: Duration::from_millis(OUTPUT_STREAM_OPEN_RETRY_MS),
        }
    }

    /// Configure how many times opening the device is attempted.
    pub fn with_open_retries(mut self, retries: usize) -> Self {
        self.open_retries = retries.max(1);
        self
    }
}

impl Default for RodioSinkProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkProvider for RodioSinkProvider {
    fn open(
        &self,
        format: AudioFormat,
        buffer_size: usize,
    ) -> Result<Arc<dyn AudioSink>, SinkError> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(SinkError::Unsupported(format!(
                "{} channels at {} Hz",
                format.channels, format.sample_rate
            )));
        }

        let (mixer_tx, mixer_rx) = mpsc::channel();
        let (close_tx, close_rx) = mpsc::channel::<()>();
        let retries = self.open_retries;
        let retry_delay = self.retry_delay;

        let output_thread = thread::Builder::new()
            .name("framepace-output".to_string())
            .spawn(move || match open_output_stream_with_retry(retries, retry_delay) {
                Ok(stream) => {
                    if mixer_tx.send(Ok(stream.mixer().clone())).is_err() {
                        return;
                    }
                    // Keep the stream alive until the sink is closed or dropped.
                    let _ = close_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = mixer_tx.send(Err(err));
                }
            })
            .map_err(|err| SinkError::Device(err.to_string()))?;

        let mixer = match mixer_rx.recv() {
            Ok(Ok(mixer)) => mixer,
            Ok(Err(err)) => {
                let _ = output_thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = output_thread.join();
                return Err(SinkError::Device("output thread exited".to_string()));
            }
        };

        let sink = Sink::connect_new(&mixer);
        sink.pause();
        info!(
            "audio output opened: {} Hz, {} channels, buffer {} bytes ({:.0} ms)",
            format.sample_rate,
            format.channels,
            buffer_size,
            format.duration_of(buffer_size).as_secs_f64() * 1000.0
        );

        Ok(Arc::new(RodioSink {
            format,
            buffer_capacity: format.duration_of(buffer_size),
            sink,
            state: Mutex::new(OutputState {
                open: true,
                ..OutputState::default()
            }),
            close_tx: Mutex::new(Some(close_tx)),
            output_thread: Mutex::new(Some(output_thread)),
        }))
    }
}

/// Open the default output stream with bounded retry behavior.
fn open_output_stream_with_retry(
    retries: usize,
    retry_delay: Duration,
) -> Result<OutputStream, SinkError> {
    let mut attempt = 1;
    loop {
        match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if attempt >= retries {
                    error!(
                        "failed to open default output stream after {} attempts: {}",
                        retries, err
                    );
                    return Err(SinkError::Device(err.to_string()));
                }
                warn!(
                    "open_default_stream attempt {}/{} failed: {}",
                    attempt, retries, err
                );
                thread::sleep(retry_delay);
                attempt += 1;
            }
        }
    }
}

#[derive(Default)]
struct OutputState {
    open: bool,
    started: bool,
    /// Lengths of appended chunks the sink has not finished yet.
    pending: VecDeque<Duration>,
    /// Total length of chunks the sink has finished.
    played: Duration,
}

impl OutputState {
    /// Move chunks the sink no longer holds from `pending` into `played`.
    fn reconcile(&mut self, queued_in_sink: usize) {
        let finished = self.pending.len().saturating_sub(queued_in_sink);
        for _ in 0..finished {
            if let Some(length) = self.pending.pop_front() {
                self.played += length;
            }
        }
    }

    fn queued(&self) -> Duration {
        self.pending.iter().sum()
    }
}

struct RodioSink {
    format: AudioFormat,
    buffer_capacity: Duration,
    sink: Sink,
    state: Mutex<OutputState>,
    close_tx: Mutex<Option<Sender<()>>>,
    output_thread: Mutex<Option<JoinHandle<()>>>,
}

impl RodioSink {
    /// Block until the queued audio fits in the device buffer.
    fn wait_for_capacity(&self) -> Result<(), SinkError> {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if !state.open {
                    return Err(SinkError::Closed);
                }
                state.reconcile(self.sink.len());
                if state.queued() < self.buffer_capacity || !state.started {
                    return Ok(());
                }
            }
            thread::sleep(Duration::from_millis(WRITE_POLL_MS));
        }
    }
}

impl AudioSink for RodioSink {
    fn start(&self) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(SinkError::Closed);
        }
        state.started = true;
        self.sink.play();
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, SinkError> {
        let usable = bytes.len() - bytes.len() % self.format.bytes_per_frame();
        if usable == 0 {
            return Ok(0);
        }
        self.wait_for_capacity()?;

        let samples = AudioFormat::decode_f32(&bytes[..usable]);
        let buffer = SamplesBuffer::new(self.format.channels, self.format.sample_rate, samples);

        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(SinkError::Closed);
        }
        self.sink.append(buffer);
        state.pending.push_back(self.format.duration_of(usable));
        Ok(usable)
    }

    fn position_micros(&self) -> i64 {
        let mut state = self.state.lock().unwrap();
        let queued_in_sink = self.sink.len();
        state.reconcile(queued_in_sink);
        let current = if queued_in_sink > 0 {
            self.sink.get_pos()
        } else {
            Duration::ZERO
        };
        (state.played + current).as_micros() as i64
    }

    fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    fn is_running(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.open && state.started && !self.sink.is_paused() && !self.sink.empty()
    }

    fn drain(&self) {
        let bound = {
            let mut state = self.state.lock().unwrap();
            state.reconcile(self.sink.len());
            state.queued() + Duration::from_secs(1)
        };
        let deadline = Instant::now() + bound;
        while self.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(WRITE_POLL_MS));
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        self.sink.stop();
        state.started = false;
        state.reconcile(0);
        state.pending.clear();
    }

    fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.open = false;
            state.started = false;
            state.pending.clear();
        }
        self.sink.stop();
        if let Some(close_tx) = self.close_tx.lock().unwrap().take() {
            let _ = close_tx.send(());
        }
        if let Some(handle) = self.output_thread.lock().unwrap().take() {
            if handle.join().is_err() {
                warn!("audio output thread panicked during join");
            }
        }
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        if let Some(close_tx) = self.close_tx.lock().unwrap().take() {
            let _ = close_tx.send(());
        }
    }
}
