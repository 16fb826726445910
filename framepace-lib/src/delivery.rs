//! Consumers that receive paced frames and lifecycle events.
//!
//! Only the video consumer is required. When no audio consumer is injected the
//! audio pipeline writes samples straight to the sink.

use std::fmt;
use std::sync::Arc;

use crate::error::{DeliveryError, PlayerError};
use crate::frame::{Frame, PixelFormat, Samples};
use crate::sink::AudioSink;

/// Receives each video frame with its relative timestamp in microseconds.
pub type VideoConsumer = dyn Fn(&Frame, i64) -> Result<(), DeliveryError> + Send + Sync;

/// Receives each audio buffer, the session sink (if one opened), and the frame
/// the samples came from.
pub type AudioConsumer = dyn Fn(&Samples, Option<&Arc<dyn AudioSink>>, &Frame) -> Result<(), DeliveryError>
    + Send
    + Sync;

/// Receives lifecycle events.
pub type EventConsumer = dyn Fn(PlayerEvent) + Send + Sync;

/// Lifecycle notifications emitted from the pump thread.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    DimensionsDetected {
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    },
    PlaybackStarted,
    EndOfMedia,
    Error {
        message: String,
        cause: Option<Arc<PlayerError>>,
    },
}

impl PlayerEvent {
    pub(crate) fn error(err: PlayerError) -> Self {
        Self::Error {
            message: err.to_string(),
            cause: Some(Arc::new(err)),
        }
    }
}

/// Set of consumers for one player.
#[derive(Clone)]
pub struct Delivery {
    on_video: Arc<VideoConsumer>,
    on_audio: Option<Arc<AudioConsumer>>,
    on_event: Option<Arc<EventConsumer>>,
}

impl Delivery {
    pub fn new<F>(on_video: F) -> Self
    where
        F: Fn(&Frame, i64) -> Result<(), DeliveryError> + Send + Sync + 'static,
    {
        Self {
            on_video: Arc::new(on_video),
            on_audio: None,
            on_event: None,
        }
    }

    /// Route audio samples to `on_audio` instead of the sink.
    pub fn with_audio<F>(mut self, on_audio: F) -> Self
    where
        F: Fn(&Samples, Option<&Arc<dyn AudioSink>>, &Frame) -> Result<(), DeliveryError>
            + Send
            + Sync
            + 'static,
    {
        self.on_audio = Some(Arc::new(on_audio));
        self
    }

    pub fn with_events<F>(mut self, on_event: F) -> Self
    where
        F: Fn(PlayerEvent) + Send + Sync + 'static,
    {
        self.on_event = Some(Arc::new(on_event));
        self
    }

    pub fn has_audio_consumer(&self) -> bool {
        self.on_audio.is_some()
    }

    pub(crate) fn video(&self, frame: &Frame, relative_us: i64) -> Result<(), DeliveryError> {
        (self.on_video)(frame, relative_us)
    }

    /// Returns `None` when no audio consumer was injected.
    pub(crate) fn audio(
        &self,
        samples: &Samples,
        sink: Option<&Arc<dyn AudioSink>>,
        frame: &Frame,
    ) -> Option<Result<(), DeliveryError>> {
        self.on_audio
            .as_ref()
            .map(|on_audio| on_audio(samples, sink, frame))
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("on_audio", &self.on_audio.is_some())
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}
