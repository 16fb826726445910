//! Decoded media units exchanged between the source, the pump, and the
//! dispatch pipelines.

use serde::{Deserialize, Serialize};

/// Pixel layout of an image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgba,
    Bgra,
    Yuv420p,
    Gray8,
    /// Decoder-specific format code.
    Other(i32),
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for planar or unknown ones.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Rgba | Self::Bgra => Some(4),
            Self::Gray8 => Some(1),
            Self::Yuv420p | Self::Other(_) => None,
        }
    }
}

/// Stream parameters reported by a source once it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub image_width: u32,
    pub image_height: u32,
    pub pixel_format: PixelFormat,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub frame_rate: f64,
}

impl MediaInfo {
    /// True when the stream carries a positive-sized video track.
    pub fn has_video(&self) -> bool {
        self.image_width > 0 && self.image_height > 0
    }

    /// True when the stream carries audio.
    pub fn has_audio(&self) -> bool {
        self.channel_count > 0 && self.sample_rate > 0
    }
}

/// Decoded image payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Image {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }
}

/// Interleaved signed 16-bit PCM samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub channels: u16,
    pub sample_rate: u32,
    pub data: Vec<i16>,
}

impl Samples {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of sample frames (one sample per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.data.len() / self.channels as usize
    }

    /// Little-endian byte encoding used for sink writes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.data.len() * 2);
        for sample in &self.data {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// A decoded unit with an absolute media timestamp in microseconds.
///
/// A negative timestamp means the decoder could not assign one.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp_us: i64,
    pub image: Option<Image>,
    pub samples: Option<Samples>,
}

impl Frame {
    pub fn video(timestamp_us: i64, image: Image) -> Self {
        Self {
            timestamp_us,
            image: Some(image),
            samples: None,
        }
    }

    pub fn audio(timestamp_us: i64, samples: Samples) -> Self {
        Self {
            timestamp_us,
            image: None,
            samples: Some(samples),
        }
    }

    /// Deep copy of the image payload only, for the video pipeline.
    ///
    /// Duplicates share no buffers with `self`, so either can be dropped
    /// without affecting the other.
    pub fn duplicate_image(&self) -> Frame {
        Frame {
            timestamp_us: self.timestamp_us,
            image: self.copy_image(),
            samples: None,
        }
    }

    /// Deep copy of the sample payload only, for the audio pipeline.
    pub fn duplicate_samples(&self) -> Frame {
        Frame {
            timestamp_us: self.timestamp_us,
            image: None,
            samples: self.copy_samples(),
        }
    }

    fn copy_image(&self) -> Option<Image> {
        self.image.as_ref().map(|image| Image {
            width: image.width,
            height: image.height,
            pixel_format: image.pixel_format,
            stride: image.stride,
            data: image.data.to_vec(),
        })
    }

    fn copy_samples(&self) -> Option<Samples> {
        self.samples.as_ref().map(|samples| Samples {
            channels: samples.channels,
            sample_rate: samples.sample_rate,
            data: samples.data.to_vec(),
        })
    }

    pub fn has_image(&self) -> bool {
        self.image.as_ref().map(|image| !image.is_empty()).unwrap_or(false)
    }

    pub fn has_samples(&self) -> bool {
        self.samples
            .as_ref()
            .map(|samples| !samples.is_empty())
            .unwrap_or(false)
    }

    /// True when the timestamp can anchor the playback timer.
    pub fn has_usable_timestamp(&self) -> bool {
        self.timestamp_us >= 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Image {
        Image {
            width: 2,
            height: 1,
            pixel_format: PixelFormat::Rgb24,
            stride: 6,
            data: vec![1, 2, 3, 4, 5, 6],
        }
    }

    #[test]
    fn duplicate_does_not_share_buffers() {
        let frame = Frame::video(10, image());
        let copy = frame.duplicate_image();
        assert_eq!(copy, frame);
        assert_ne!(
            frame.image.as_ref().unwrap().data.as_ptr(),
            copy.image.as_ref().unwrap().data.as_ptr()
        );
        drop(frame);
        assert_eq!(copy.image.unwrap().data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn zero_sized_image_is_not_a_payload() {
        let mut empty = image();
        empty.height = 0;
        assert!(!Frame::video(0, empty).has_image());
        assert!(Frame::video(0, image()).has_image());
    }

    #[test]
    fn payload_duplicates_carry_one_payload() {
        let mut frame = Frame::video(40, image());
        frame.samples = Some(Samples {
            channels: 1,
            sample_rate: 8000,
            data: vec![7; 4],
        });

        let video = frame.duplicate_image();
        assert_eq!(video.timestamp_us, 40);
        assert_eq!(video.image, frame.image);
        assert!(video.samples.is_none());

        let audio = frame.duplicate_samples();
        assert!(audio.image.is_none());
        assert_eq!(audio.samples, frame.samples);
        assert_ne!(
            audio.samples.as_ref().unwrap().data.as_ptr(),
            frame.samples.as_ref().unwrap().data.as_ptr()
        );
    }

    #[test]
    fn samples_report_frames_and_bytes() {
        let samples = Samples {
            channels: 2,
            sample_rate: 1000,
            data: vec![1, -1, 2, -2],
        };
        assert_eq!(samples.frame_count(), 2);
        assert_eq!(samples.to_le_bytes(), vec![1, 0, 255, 255, 2, 0, 254, 255]);
    }
}
