//! Audio warm-up before the pump loop starts.
//!
//! The output device usually needs some queued audio before it reports
//! running. Warm-up feeds it the first audio frames and polls until the
//! device clock becomes active or the frame budget runs out. Image frames
//! pulled along the way are kept in order for the pump loop.

use std::collections::VecDeque;

use log::{debug, info, warn};

use crate::clock::PlaybackTimer;
use crate::frame::Frame;
use crate::playback::pipeline::MediaKind;

use super::context::PumpContext;
use super::runner::{pull_next, relative_timestamp, Pulled};

#[derive(Default)]
pub(super) struct WarmupOutcome {
    /// Image-bearing frames for the pump loop to dispatch first.
    pub(super) carried: VecDeque<Frame>,
    /// End of stream or pull failure observed during warm-up.
    pub(super) terminal: Option<Pulled>,
    pub(super) pulled: usize,
    pub(super) clock_active: bool,
}

/// Prime the audio pipeline until the device clock runs.
///
/// Stops at the first poll that observes an active clock, at
/// `warmup_max_frames`, at end of stream or a pull error, or on cancellation.
pub(super) fn warm_up(ctx: &PumpContext, timer: &PlaybackTimer) -> WarmupOutcome {
    let session = &ctx.session;
    let settings = *session.settings();
    let mut outcome = WarmupOutcome::default();

    debug!(
        "session {}: warming up audio output (up to {} frames)",
        session.id(),
        settings.warmup_max_frames
    );

    while outcome.pulled < settings.warmup_max_frames {
        if session.is_cancelled() {
            return outcome;
        }

        match pull_next(session) {
            Pulled::Frame(mut frame) => {
                outcome.pulled += 1;
                if frame.has_usable_timestamp() {
                    timer.start(frame.timestamp_us);
                }
                if frame.has_samples() {
                    let relative = relative_timestamp(timer, &frame).unwrap_or(0);
                    session.dispatch(MediaKind::Audio, frame.duplicate_samples(), relative);
                    frame.samples = None;
                }
                if frame.has_image() {
                    outcome.carried.push_back(frame);
                }
            }
            terminal => {
                outcome.terminal = Some(terminal);
                break;
            }
        }

        if !session.cancellation().sleep(settings.warmup_poll()) {
            return outcome;
        }
        if timer.is_clock_active() {
            outcome.clock_active = true;
            break;
        }
    }

    if outcome.clock_active {
        info!(
            "session {}: audio clock active after {} warm-up frames",
            session.id(),
            outcome.pulled
        );
    } else if !session.is_cancelled() {
        warn!(
            "session {}: audio clock not active after {} warm-up frames; starting on the wall clock",
            session.id(),
            outcome.pulled
        );
    }
    outcome
}
