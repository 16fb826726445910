//! Task handlers run by the video and audio pipelines.

use std::sync::Arc;

use log::{trace, warn};

use crate::clock::PlaybackTimer;
use crate::delivery::Delivery;
use crate::pacing;
use crate::settings::PlaybackSettings;
use crate::sink::AudioSink;

use super::pipeline::{TaskHandler, TaskOutcome};

/// Wait until the frame is due against the playback timer, then deliver it.
///
/// Elapsed time is sampled when the task runs, not when it was queued.
pub(crate) fn video_handler(
    timer: Arc<PlaybackTimer>,
    settings: PlaybackSettings,
    delivery: Delivery,
) -> TaskHandler {
    Box::new(move |frame, relative_us, cancel| {
        let elapsed = timer.elapsed();
        let active = timer.is_clock_active();
        if let Some(delay) = pacing::video_delay(relative_us, elapsed, active, &settings) {
            trace!(
                "video frame at {} us waits {:?} (elapsed {} us, clock active {})",
                relative_us,
                delay,
                elapsed,
                active
            );
            if !cancel.sleep(delay) {
                return Ok(TaskOutcome::Skipped);
            }
        }
        delivery.video(frame, relative_us)?;
        Ok(TaskOutcome::Delivered)
    })
}

/// Hand samples to the injected audio consumer, or write them to the sink.
pub(crate) fn audio_handler(sink: Option<Arc<dyn AudioSink>>, delivery: Delivery) -> TaskHandler {
    Box::new(move |frame, _relative_us, _cancel| {
        let Some(samples) = frame.samples.as_ref() else {
            return Ok(TaskOutcome::Skipped);
        };
        if let Some(result) = delivery.audio(samples, sink.as_ref(), frame) {
            result?;
            return Ok(TaskOutcome::Delivered);
        }
        let Some(sink) = sink.as_ref() else {
            return Ok(TaskOutcome::Skipped);
        };

        let bytes = samples.to_le_bytes();
        let written = sink.write(&bytes)?;
        if written < bytes.len() {
            warn!(
                "audio sink accepted {} of {} bytes at {} us",
                written,
                bytes.len(),
                frame.timestamp_us
            );
        }
        Ok(TaskOutcome::Delivered)
    })
}
