//! # Framepace
//!
//! This library paces the presentation of decoded audio and video frames.
//! It includes the playback clock, the audio warm-up stage, per-stream
//! dispatch pipelines, and the backpressured pump that ties them together.
//! Decoding, the audio device, and rendering are reached through the
//! [`source`], [`sink`], and [`delivery`] seams.

pub mod clock;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod playback;
pub mod settings;
pub mod sink;
pub mod source;

mod cancel;
mod pacing;

pub use delivery::{Delivery, PlayerEvent};
pub use error::{PlayerError, SettingsError, SinkError, SourceError};
pub use frame::{Frame, Image, MediaInfo, PixelFormat, Samples};
pub use playback::pipeline::{MediaKind, PipelineStats};
pub use playback::player::{Player, PlayerBuilder, PumpState, SessionStats};
pub use settings::PlaybackSettings;
