//! Decoders the pump pulls frames from.

pub mod symphonia;
pub mod synthetic;

use crate::error::SourceError;
use crate::frame::{Frame, MediaInfo};

/// A demuxer/decoder producing timestamped frames.
///
/// A source is owned by one session and used from the pump thread only.
pub trait FrameSource {
    /// Open the media at `locator` and report its stream parameters.
    fn open(&mut self, locator: &str) -> Result<MediaInfo, SourceError>;

    /// Next decoded frame, or `Ok(None)` at end of stream.
    fn pull(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Release decoder resources. Called exactly once per session.
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self, locator: &str) -> Result<MediaInfo, SourceError> {
        (**self).open(locator)
    }

    fn pull(&mut self) -> Result<Option<Frame>, SourceError> {
        (**self).pull()
    }

    fn close(&mut self) {
        (**self).close()
    }
}
