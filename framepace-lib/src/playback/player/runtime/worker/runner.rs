//! Pump loop implementation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::clock::PlaybackTimer;
use crate::delivery::PlayerEvent;
use crate::error::{PlayerError, SourceError};
use crate::frame::Frame;
use crate::pacing;
use crate::playback::handlers::{audio_handler, video_handler};
use crate::playback::pipeline::{DispatchPipeline, MediaKind};
use crate::playback::session::{Pipelines, Session};
use crate::sink::{AudioFormat, AudioSink};

use super::super::super::PumpState;
use super::context::PumpContext;
use super::guard::PumpThreadGuard;
use super::warmup::{warm_up, WarmupOutcome};

/// Pause before skipping a frame that cannot anchor the timer.
const UNANCHORED_FRAME_PAUSE_MS: u64 = 10;
/// Pause after a frame that carries neither image nor samples.
const EMPTY_FRAME_PAUSE_MS: u64 = 1;
/// Iterations logged in detail before sampling kicks in.
const DETAILED_LOG_ITERATIONS: u64 = 10;
const LOG_EVERY_ITERATIONS: u64 = 50;

/// Result of one source pull.
pub(super) enum Pulled {
    Frame(Frame),
    EndOfStream,
    Failed(SourceError),
}

pub(super) fn pull_next(session: &Session) -> Pulled {
    match session.pull() {
        Ok(Some(frame)) => Pulled::Frame(frame),
        Ok(None) => Pulled::EndOfStream,
        Err(err) => Pulled::Failed(err),
    }
}

/// Relative timestamp of `frame`, or `None` when it cannot be placed.
pub(super) fn relative_timestamp(timer: &PlaybackTimer, frame: &Frame) -> Option<i64> {
    let anchor = timer.anchor_timestamp()?;
    frame
        .has_usable_timestamp()
        .then(|| frame.timestamp_us - anchor)
}

/// How the pump loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    EndOfMedia,
    Cancelled,
}

/// Run one session from source open to teardown.
pub(in crate::playback::player::runtime) fn run_pump_thread(ctx: PumpContext) {
    let _thread_guard = PumpThreadGuard::new(ctx.session.clone(), ctx.delivery.clone());
    let session_id = ctx.session.id();

    let outcome = run_session(&ctx);
    ctx.session.teardown();
    ctx.session.set_state(PumpState::Stopped);

    let stats = ctx.session.stats();
    match outcome {
        Ok(exit) => info!(
            "session {} finished ({:?}): {} iterations, {} video and {} audio frames delivered, {} backpressure pauses (longest {:?})",
            session_id,
            exit,
            stats.iterations,
            stats.video.delivered,
            stats.audio.delivered,
            stats.backpressure_suspensions,
            stats.longest_suspension
        ),
        Err(err) => {
            error!("session {} failed: {}", session_id, err);
            ctx.delivery.emit(PlayerEvent::error(err));
        }
    }
}

fn run_session(ctx: &PumpContext) -> Result<PumpExit, PlayerError> {
    let session = &ctx.session;
    let settings = *session.settings();

    let info = session
        .open_source(&ctx.locator)
        .map_err(PlayerError::SourceOpen)?;
    info!(
        "session {}: {}x{} {:?} at {:.2} fps, {} channels at {} Hz",
        session.id(),
        info.image_width,
        info.image_height,
        info.pixel_format,
        info.frame_rate,
        info.channel_count,
        info.sample_rate
    );
    if info.has_video() {
        ctx.delivery.emit(PlayerEvent::DimensionsDetected {
            width: info.image_width,
            height: info.image_height,
            pixel_format: info.pixel_format,
        });
    } else {
        debug!("session {}: no video dimensions reported", session.id());
    }

    let sink = if info.has_audio() {
        open_sink(ctx, AudioFormat::new(info.sample_rate, info.channel_count))
    } else {
        None
    };

    let timer = Arc::new(PlaybackTimer::new(sink.clone()));
    let video = DispatchPipeline::spawn(
        MediaKind::Video,
        session.cancellation(),
        video_handler(timer.clone(), settings, ctx.delivery.clone()),
    )
    .map_err(PlayerError::Spawn)?;
    let audio = DispatchPipeline::spawn(
        MediaKind::Audio,
        session.cancellation(),
        audio_handler(sink.clone(), ctx.delivery.clone()),
    )
    .map_err(PlayerError::Spawn)?;
    session.install_pipelines(Pipelines { video, audio }, timer.clone());

    let warmup = if sink.is_some() {
        session.set_state(PumpState::Priming);
        warm_up(ctx, &timer)
    } else {
        WarmupOutcome::default()
    };

    if session.is_cancelled() {
        return Ok(PumpExit::Cancelled);
    }
    session.set_state(PumpState::Running);
    ctx.delivery.emit(PlayerEvent::PlaybackStarted);

    run_loop(ctx, &timer, sink.is_some(), warmup)
}

/// Open and start the audio device. Failures fall back to wall-clock pacing.
fn open_sink(ctx: &PumpContext, format: AudioFormat) -> Option<Arc<dyn AudioSink>> {
    let session = &ctx.session;
    let Some(provider) = ctx.sink_provider.as_ref() else {
        warn!(
            "session {}: no audio output configured; pacing against the wall clock",
            session.id()
        );
        return None;
    };

    let buffer_size = format.buffer_size_for(Duration::from_millis(
        session.settings().audio_buffer_ms,
    ));
    let sink = match provider.open(format, buffer_size) {
        Ok(sink) => sink,
        Err(err) => {
            warn!(
                "session {}: {}; pacing against the wall clock",
                session.id(),
                PlayerError::SinkUnavailable(err)
            );
            return None;
        }
    };
    if let Err(err) = sink.start() {
        warn!(
            "session {}: {}; pacing against the wall clock",
            session.id(),
            PlayerError::SinkUnavailable(err)
        );
        sink.close();
        return None;
    }
    session.install_sink(sink.clone());
    Some(sink)
}

fn should_log(iteration: u64) -> bool {
    cfg!(feature = "debug")
        || iteration <= DETAILED_LOG_ITERATIONS
        || iteration % LOG_EVERY_ITERATIONS == 0
}

fn run_loop(
    ctx: &PumpContext,
    timer: &PlaybackTimer,
    has_sink: bool,
    warmup: WarmupOutcome,
) -> Result<PumpExit, PlayerError> {
    let session = &ctx.session;
    let settings = *session.settings();
    let dispatch_audio = has_sink || ctx.delivery.has_audio_consumer();

    let mut carried: VecDeque<Frame> = warmup.carried;
    let mut deferred = warmup.terminal;
    let mut last_relative = 0;

    loop {
        if session.is_cancelled() {
            return Ok(PumpExit::Cancelled);
        }
        let iteration = session.next_iteration();

        let pulled = match carried.pop_front() {
            Some(frame) => Pulled::Frame(frame),
            None => match deferred.take() {
                Some(pulled) => pulled,
                None => pull_next(session),
            },
        };

        let frame = match pulled {
            Pulled::Frame(frame) => frame,
            Pulled::EndOfStream => {
                info!(
                    "session {}: end of media after {} iterations",
                    session.id(),
                    iteration
                );
                ctx.delivery.emit(PlayerEvent::EndOfMedia);
                session.set_state(PumpState::Draining);
                session.drain_pipelines();
                if !session.is_cancelled() {
                    if let Some(sink) = session.sink() {
                        sink.drain();
                    }
                }
                return Ok(PumpExit::EndOfMedia);
            }
            Pulled::Failed(err) => {
                if session.is_cancelled() {
                    return Ok(PumpExit::Cancelled);
                }
                session.set_state(PumpState::Draining);
                return Err(PlayerError::SourceRead(err));
            }
        };

        if !timer.has_started() {
            if !frame.has_usable_timestamp() {
                debug!(
                    "session {}: skipping frame without a usable timestamp ({})",
                    session.id(),
                    frame.timestamp_us
                );
                drop(frame);
                if !session
                    .cancellation()
                    .sleep(Duration::from_millis(UNANCHORED_FRAME_PAUSE_MS))
                {
                    return Ok(PumpExit::Cancelled);
                }
                continue;
            }
            timer.start(frame.timestamp_us);
        }

        let relative = relative_timestamp(timer, &frame).unwrap_or(last_relative);
        last_relative = relative;

        let has_image = frame.has_image();
        let has_samples = frame.has_samples();
        if !has_image && !has_samples {
            if !session
                .cancellation()
                .sleep(Duration::from_millis(EMPTY_FRAME_PAUSE_MS))
            {
                return Ok(PumpExit::Cancelled);
            }
            continue;
        }

        if has_image {
            session.dispatch(MediaKind::Video, frame.duplicate_image(), relative);
        }
        if has_samples && dispatch_audio {
            session.dispatch(MediaKind::Audio, frame.duplicate_samples(), relative);
        }
        drop(frame);

        let elapsed = timer.elapsed();
        let active = timer.is_clock_active();
        if should_log(iteration) {
            debug!(
                "session {} iteration {}: relative {} us, elapsed {} us, read-ahead {} us, clock active {}",
                session.id(),
                iteration,
                relative,
                elapsed,
                relative - elapsed,
                active
            );
        }

        if let Some(pause) = pacing::backpressure(relative, elapsed, active, &settings) {
            session.record_suspension(pause);
            if should_log(iteration) {
                debug!(
                    "session {} iteration {}: backpressure pause {:?}",
                    session.id(),
                    iteration,
                    pause
                );
            }
            if !session.cancellation().sleep(pause) {
                return Ok(PumpExit::Cancelled);
            }
        }
    }
}
