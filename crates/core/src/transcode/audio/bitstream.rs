//! Deterministic frame-by-frame encoding.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::path::PathBuf;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::format::ids::{MP3, WAV};
use crate::format::FormatId;
use crate::transcode::capabilities::EncoderCapabilities;
use crate::transcode::error::TranscodeError;
use crate::transcode::ffmpeg::FfmpegMp3Encoder;
use crate::transcode::types::{DecodedAudio, StreamSpec};
use crate::transcode::worker::ProgressReporter;

/// Progress never reaches 100 before the encoder is flushed.
const PRE_FLUSH_CAP: u8 = 99;

/// An encoder fed fixed-size frames of interleaved samples.
#[async_trait]
pub trait FrameEncoder: Send {
    /// Encodes one frame, returning whatever output is ready.
    async fn encode_frame(&mut self, samples: &[f32]) -> Result<Bytes, TranscodeError>;

    /// Signals end of stream and returns the remaining output.
    async fn flush(&mut self) -> Result<Bytes, TranscodeError>;
}

/// Opens frame encoders for the targets it supports.
#[async_trait]
pub trait FrameEncoderFactory: Send + Sync {
    fn supports(&self, target: FormatId) -> bool;

    async fn open(
        &self,
        target: FormatId,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn FrameEncoder>, TranscodeError>;
}

/// Encodes `audio` frame by frame and returns the concatenated output.
///
/// Cancellation is checked at every frame boundary.
pub async fn run_bitstream(
    encoder: &mut dyn FrameEncoder,
    audio: &DecodedAudio,
    frame_size: usize,
    progress: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<Bytes, TranscodeError> {
    let total = audio.frames();
    let frame_size = frame_size.max(1);
    let mut out = BytesMut::new();
    let mut position = 0;
    let mut frames = 0usize;

    while position < total {
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        let end = (position + frame_size).min(total);
        let chunk = encoder
            .encode_frame(&audio.interleaved(position, end))
            .await?;
        out.extend_from_slice(&chunk);
        position = end;
        frames += 1;
        progress.report_fraction(position, total, PRE_FLUSH_CAP);
    }

    if cancel.is_cancelled() {
        return Err(TranscodeError::Cancelled);
    }
    out.extend_from_slice(&encoder.flush().await?);
    debug!(frames, bytes = out.len(), "Bitstream encode finished");
    Ok(out.freeze())
}

/// In-process 16-bit PCM WAV encoder.
///
/// The RIFF header carries the data length, so output is produced on flush.
#[derive(Debug)]
pub struct WavEncoder {
    spec: StreamSpec,
    data: Vec<u8>,
}

impl WavEncoder {
    pub fn new(spec: StreamSpec) -> Self {
        Self {
            spec,
            data: Vec::new(),
        }
    }
}

#[async_trait]
impl FrameEncoder for WavEncoder {
    async fn encode_frame(&mut self, samples: &[f32]) -> Result<Bytes, TranscodeError> {
        self.data.reserve(samples.len() * 2);
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            self.data.extend_from_slice(&value.to_le_bytes());
        }
        Ok(Bytes::new())
    }

    async fn flush(&mut self) -> Result<Bytes, TranscodeError> {
        let data = std::mem::take(&mut self.data);
        let mut out = Vec::with_capacity(44 + data.len());
        out.extend_from_slice(&wav_header(self.spec, data.len() as u32));
        out.extend_from_slice(&data);
        Ok(Bytes::from(out))
    }
}

/// Canonical 44-byte header for 16-bit PCM.
pub fn wav_header(spec: StreamSpec, data_len: u32) -> [u8; 44] {
    let channels = spec.channels as u16;
    let block_align = channels * 2;
    let byte_rate = spec.sample_rate * block_align as u32;

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&spec.sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&16u16.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    header
}

/// WAV in-process, MP3 through ffmpeg when libmp3lame is present.
#[derive(Debug, Clone)]
pub struct BuiltinFrameEncoders {
    ffmpeg_path: PathBuf,
    capabilities: EncoderCapabilities,
}

impl BuiltinFrameEncoders {
    pub fn new(ffmpeg_path: PathBuf, capabilities: EncoderCapabilities) -> Self {
        Self {
            ffmpeg_path,
            capabilities,
        }
    }
}

#[async_trait]
impl FrameEncoderFactory for BuiltinFrameEncoders {
    fn supports(&self, target: FormatId) -> bool {
        match target {
            WAV => true,
            MP3 => self.capabilities.libmp3lame,
            _ => false,
        }
    }

    async fn open(
        &self,
        target: FormatId,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn FrameEncoder>, TranscodeError> {
        match target {
            WAV => Ok(Box::new(WavEncoder::new(spec))),
            MP3 if self.capabilities.libmp3lame => Ok(Box::new(FfmpegMp3Encoder::spawn(
                &self.ffmpeg_path,
                spec,
                bitrate_kbps,
            )?)),
            _ => Err(TranscodeError::encode_failure(
                target,
                "no frame encoder available",
            )),
        }
    }
}
