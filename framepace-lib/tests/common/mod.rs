//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use framepace_lib::sink::{AudioFormat, AudioSink, SinkProvider};
use framepace_lib::source::FrameSource;
use framepace_lib::{
    Delivery, Frame, Image, MediaInfo, PixelFormat, PlayerEvent, Samples, SinkError, SourceError,
};

pub fn image() -> Image {
    Image {
        width: 4,
        height: 2,
        pixel_format: PixelFormat::Rgb24,
        stride: 12,
        data: vec![7; 24],
    }
}

pub fn video(ts: i64) -> Frame {
    Frame::video(ts, image())
}

pub fn audio(ts: i64) -> Frame {
    Frame::audio(
        ts,
        Samples {
            channels: 2,
            sample_rate: 8000,
            data: vec![0; 320],
        },
    )
}

/// Frame carrying both an image and samples.
pub fn mixed(ts: i64) -> Frame {
    let mut frame = video(ts);
    frame.samples = audio(ts).samples;
    frame
}

pub fn video_info() -> MediaInfo {
    MediaInfo {
        image_width: 4,
        image_height: 2,
        pixel_format: PixelFormat::Rgb24,
        channel_count: 0,
        sample_rate: 0,
        frame_rate: 30.0,
    }
}

pub fn av_info() -> MediaInfo {
    MediaInfo {
        channel_count: 2,
        sample_rate: 8000,
        ..video_info()
    }
}

/// One scripted pull result.
#[derive(Clone)]
pub enum Step {
    Frame(Frame),
    Fail(String),
}

/// What happens once the script runs out.
#[derive(Clone, Copy)]
pub enum Tail {
    EndOfStream,
    /// Keep producing interleaved audio and video every `step_us`.
    Endless { step_us: i64 },
}

#[derive(Default)]
pub struct SourceLog {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub pulls: AtomicUsize,
}

pub struct ScriptedSource {
    info: Result<MediaInfo, String>,
    steps: VecDeque<Step>,
    tail: Tail,
    next_ts: i64,
    audio_next: bool,
    log: Arc<SourceLog>,
}

impl FrameSource for ScriptedSource {
    fn open(&mut self, _locator: &str) -> Result<MediaInfo, SourceError> {
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        self.info.clone().map_err(SourceError::Unsupported)
    }

    fn pull(&mut self) -> Result<Option<Frame>, SourceError> {
        self.log.pulls.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Frame(frame)) => {
                self.next_ts = self.next_ts.max(frame.timestamp_us);
                Ok(Some(frame))
            }
            Some(Step::Fail(message)) => Err(SourceError::Decode(message)),
            None => match self.tail {
                Tail::EndOfStream => Ok(None),
                Tail::Endless { step_us } => {
                    let frame = if self.audio_next {
                        audio(self.next_ts)
                    } else {
                        self.next_ts += step_us;
                        video(self.next_ts)
                    };
                    self.audio_next = !self.audio_next;
                    Ok(Some(frame))
                }
            },
        }
    }

    fn close(&mut self) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a fresh [`ScriptedSource`] per session, sharing one [`SourceLog`].
#[derive(Clone)]
pub struct Script {
    pub info: Result<MediaInfo, String>,
    pub steps: Vec<Step>,
    pub tail: Tail,
    pub log: Arc<SourceLog>,
}

impl Script {
    pub fn new(info: MediaInfo, frames: Vec<Frame>) -> Self {
        Self {
            info: Ok(info),
            steps: frames.into_iter().map(Step::Frame).collect(),
            tail: Tail::EndOfStream,
            log: Arc::new(SourceLog::default()),
        }
    }

    pub fn failing_open(message: &str) -> Self {
        Self {
            info: Err(message.to_string()),
            steps: Vec::new(),
            tail: Tail::EndOfStream,
            log: Arc::new(SourceLog::default()),
        }
    }

    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn endless(mut self, step_us: i64) -> Self {
        self.tail = Tail::Endless { step_us };
        self
    }

    pub fn factory(&self) -> impl Fn() -> Box<dyn FrameSource + Send> + Send + Sync + 'static {
        let script = self.clone();
        move || {
            Box::new(ScriptedSource {
                info: script.info.clone(),
                steps: script.steps.iter().cloned().collect(),
                tail: script.tail,
                next_ts: 0,
                audio_next: true,
                log: script.log.clone(),
            }) as Box<dyn FrameSource + Send>
        }
    }
}

/// Sink whose running flag and position are controlled by the test.
pub struct ScriptedSink {
    pub running: AtomicBool,
    pub run_on_write: bool,
    pub position: AtomicI64,
    pub written: AtomicUsize,
    open: AtomicBool,
    pub calls: Mutex<Vec<&'static str>>,
}

impl ScriptedSink {
    pub fn new(run_on_write: bool, position_us: i64) -> Arc<Self> {
        Arc::new(Self {
            running: AtomicBool::new(false),
            run_on_write,
            position: AtomicI64::new(position_us),
            written: AtomicUsize::new(0),
            open: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

impl AudioSink for ScriptedSink {
    fn start(&self) -> Result<(), SinkError> {
        self.calls.lock().unwrap().push("start");
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> Result<usize, SinkError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        self.written.fetch_add(bytes.len(), Ordering::SeqCst);
        if self.run_on_write {
            self.running.store(true, Ordering::SeqCst);
        }
        Ok(bytes.len())
    }

    fn position_micros(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.is_open() && self.running.load(Ordering::SeqCst)
    }

    fn drain(&self) {
        self.calls.lock().unwrap().push("drain");
    }

    fn stop(&self) {
        self.calls.lock().unwrap().push("stop");
        self.running.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        self.calls.lock().unwrap().push("close");
        self.open.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Hands out the same [`ScriptedSink`] and counts how often it was asked.
pub struct ScriptedSinkProvider {
    pub sink: Arc<ScriptedSink>,
    pub opens: AtomicUsize,
    pub fail: bool,
}

impl ScriptedSinkProvider {
    pub fn new(sink: Arc<ScriptedSink>) -> Arc<Self> {
        Arc::new(Self {
            sink,
            opens: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sink: ScriptedSink::new(false, 0),
            opens: AtomicUsize::new(0),
            fail: true,
        })
    }
}

impl SinkProvider for ScriptedSinkProvider {
    fn open(
        &self,
        _format: AudioFormat,
        _buffer_size: usize,
    ) -> Result<Arc<dyn AudioSink>, SinkError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SinkError::Device("no device".to_string()));
        }
        Ok(self.sink.clone())
    }
}

/// Records deliveries and events with the time they arrived.
#[derive(Clone, Default)]
pub struct Recorder {
    pub video: Arc<Mutex<Vec<(i64, Instant)>>>,
    pub audio: Arc<Mutex<Vec<i64>>>,
    pub events: Arc<Mutex<Vec<PlayerEvent>>>,
}

impl Recorder {
    pub fn delivery(&self) -> Delivery {
        let video = self.video.clone();
        let events = self.events.clone();
        Delivery::new(move |_, relative| {
            video.lock().unwrap().push((relative, Instant::now()));
            Ok(())
        })
        .with_events(move |event| events.lock().unwrap().push(event))
    }

    pub fn delivery_with_audio(&self) -> Delivery {
        let audio = self.audio.clone();
        self.delivery().with_audio(move |_, _, frame| {
            audio.lock().unwrap().push(frame.timestamp_us);
            Ok(())
        })
    }

    pub fn video_relatives(&self) -> Vec<i64> {
        self.video.lock().unwrap().iter().map(|(rel, _)| *rel).collect()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|event| match event {
                PlayerEvent::DimensionsDetected { .. } => "dimensions".to_string(),
                PlayerEvent::PlaybackStarted => "started".to_string(),
                PlayerEvent::EndOfMedia => "end".to_string(),
                PlayerEvent::Error { message, .. } => format!("error: {}", message),
            })
            .collect()
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
