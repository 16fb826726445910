//! Error types for sources, sinks, and the playback session.

use std::fmt::{Display, Formatter};

/// Boxed error returned by delivery consumers.
pub type DeliveryError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by a [`FrameSource`](crate::source::FrameSource).
#[derive(Debug)]
pub enum SourceError {
    Io(std::io::Error),
    Unsupported(String),
    Decode(String),
    Closed,
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Unsupported(err) => write!(f, "unsupported media: {}", err),
            Self::Decode(err) => write!(f, "decode error: {}", err),
            Self::Closed => write!(f, "source is closed"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Failure reported by an audio output device.
#[derive(Debug)]
pub enum SinkError {
    Unsupported(String),
    Device(String),
    Closed,
}

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsupported(err) => write!(f, "unsupported audio format: {}", err),
            Self::Device(err) => write!(f, "audio device error: {}", err),
            Self::Closed => write!(f, "audio sink is closed"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Failure while loading [`PlaybackSettings`](crate::settings::PlaybackSettings).
#[derive(Debug)]
pub enum SettingsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "invalid settings: {}", err),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SettingsError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Session-level failure taxonomy.
///
/// `SourceOpen`, `SourceRead` and `Spawn` end the session; `SinkUnavailable`
/// and `Delivery` are logged and playback continues. `Settings` is only
/// produced before a session exists.
#[derive(Debug)]
pub enum PlayerError {
    SourceOpen(SourceError),
    SourceRead(SourceError),
    SinkUnavailable(SinkError),
    Delivery(DeliveryError),
    Spawn(std::io::Error),
    Settings(SettingsError),
}

impl PlayerError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SourceOpen(_) | Self::SourceRead(_) | Self::Spawn(_)
        )
    }
}

impl Display for PlayerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceOpen(err) => write!(f, "failed to open source: {}", err),
            Self::SourceRead(err) => write!(f, "failed to read frame: {}", err),
            Self::SinkUnavailable(err) => write!(f, "audio output unavailable: {}", err),
            Self::Delivery(err) => write!(f, "delivery failed: {}", err),
            Self::Spawn(err) => write!(f, "failed to spawn playback thread: {}", err),
            Self::Settings(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SourceOpen(err) | Self::SourceRead(err) => Some(err),
            Self::SinkUnavailable(err) => Some(err),
            Self::Spawn(err) => Some(err),
            Self::Settings(err) => Some(err),
            Self::Delivery(err) => Some(err.as_ref()),
        }
    }
}

impl From<SettingsError> for PlayerError {
    fn from(value: SettingsError) -> Self {
        Self::Settings(value)
    }
}
