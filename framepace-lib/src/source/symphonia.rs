//! Audio-only source decoding files with `symphonia`.

use std::fs::File;
use std::path::Path;

use log::{debug, info, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use crate::error::SourceError;
use crate::frame::{Frame, MediaInfo, PixelFormat, Samples};

use super::FrameSource;

struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    sample_rate: u32,
    channels: u16,
    decoded_frames: u64,
}

/// Decodes the first playable audio track of a file into 16-bit frames.
#[derive(Default)]
pub struct SymphoniaSource {
    track: Option<OpenTrack>,
}

impl SymphoniaSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn timestamp_us(track: &OpenTrack, ts: u64) -> i64 {
        match track.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(ts);
                time.seconds as i64 * 1_000_000 + (time.frac * 1_000_000.0) as i64
            }
            None => (track.decoded_frames * 1_000_000 / track.sample_rate.max(1) as u64) as i64,
        }
    }
}

impl FrameSource for SymphoniaSource {
    fn open(&mut self, locator: &str) -> Result<MediaInfo, SourceError> {
        let file = File::open(locator)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = Path::new(locator).extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|err| SourceError::Unsupported(err.to_string()))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SourceError::Unsupported("no supported audio tracks".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let dec_opts: DecoderOptions = Default::default();
        let decoder = symphonia::default::get_codecs()
            .make(&params, &dec_opts)
            .map_err(|err| SourceError::Unsupported(err.to_string()))?;

        let sample_rate = params.sample_rate.unwrap_or(0);
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
        info!(
            "opened {}: track {} at {} Hz, {} channels",
            locator, track_id, sample_rate, channels
        );

        self.track = Some(OpenTrack {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
            sample_rate,
            channels,
            decoded_frames: 0,
        });

        Ok(MediaInfo {
            image_width: 0,
            image_height: 0,
            pixel_format: PixelFormat::Other(-1),
            channel_count: channels,
            sample_rate,
            frame_rate: 0.0,
        })
    }

    fn pull(&mut self) -> Result<Option<Frame>, SourceError> {
        let track = self.track.as_mut().ok_or(SourceError::Closed)?;
        loop {
            let packet = match track.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(Error::ResetRequired) => return Ok(None),
                Err(err) => return Err(SourceError::Decode(err.to_string())),
            };
            if packet.track_id() != track.track_id {
                continue;
            }

            let decoded = match track.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(err)) => {
                    warn!("skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => return Err(SourceError::Decode(err.to_string())),
            };

            let spec = *decoded.spec();
            let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);
            if buffer.samples().is_empty() {
                continue;
            }

            let samples = Samples {
                channels: spec.channels.count() as u16,
                sample_rate: spec.rate,
                data: buffer.samples().to_vec(),
            };
            let timestamp_us = Self::timestamp_us(track, packet.ts());
            track.decoded_frames += samples.frame_count() as u64;
            return Ok(Some(Frame::audio(timestamp_us, samples)));
        }
    }

    fn close(&mut self) {
        if let Some(track) = self.track.take() {
            debug!(
                "closing decoder after {} frames at {} Hz, {} channels",
                track.decoded_frames, track.sample_rate, track.channels
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_io_error() {
        let mut source = SymphoniaSource::new();
        let err = source.open("/definitely/not/here.wav").unwrap_err();
        assert!(matches!(err, SourceError::Io(_)));
    }

    #[test]
    fn pull_before_open_is_closed() {
        let mut source = SymphoniaSource::new();
        assert!(matches!(source.pull(), Err(SourceError::Closed)));
    }

    #[test]
    fn decodes_a_wav_file() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), wav_bytes(8000, 1, 800)).unwrap();

        let mut source = SymphoniaSource::new();
        let info = source.open(file.path().to_str().unwrap()).unwrap();
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channel_count, 1);
        assert!(!info.has_video());

        let mut total = 0;
        let mut last_ts = -1;
        while let Some(frame) = source.pull().unwrap() {
            assert!(frame.timestamp_us >= last_ts);
            last_ts = frame.timestamp_us;
            total += frame.samples.unwrap().frame_count();
        }
        assert_eq!(total, 800);
        source.close();
    }

    fn wav_bytes(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
        let data_len = frames * channels as u32 * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames * channels as u32 {
            bytes.extend_from_slice(&((i % 64) as i16 * 100).to_le_bytes());
        }
        bytes
    }
}
