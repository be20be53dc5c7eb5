//! Mock frame encoders and capture backend for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::format::ids::{MP3, WAV};
use crate::format::FormatId;
use crate::transcode::audio::{
    CaptureBackend, CaptureSession, FrameEncoder, FrameEncoderFactory, WavEncoder,
};
use crate::transcode::{StreamSpec, TranscodeError};

/// Minimal MP3 output: an ID3v2 tag header followed by padding.
fn fake_mp3(samples: usize) -> Bytes {
    let mut out = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    out.resize(64, 0);
    out.extend_from_slice(&(samples as u32).to_le_bytes());
    Bytes::from(out)
}

/// Mock implementation of [`FrameEncoderFactory`].
///
/// WAV goes through the real in-process encoder; any other supported target
/// yields placeholder bytes. Every `open` is recorded.
#[derive(Debug, Clone)]
pub struct MockFrameEncoders {
    supported: Arc<HashSet<FormatId>>,
    opened: Arc<RwLock<Vec<(FormatId, u32)>>>,
}

impl Default for MockFrameEncoders {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFrameEncoders {
    /// Supports WAV and MP3, like a host with libmp3lame.
    pub fn new() -> Self {
        Self::supporting(&[WAV, MP3])
    }

    pub fn supporting(targets: &[FormatId]) -> Self {
        Self {
            supported: Arc::new(targets.iter().copied().collect()),
            opened: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Targets and bitrates opened so far, in order.
    pub async fn opened(&self) -> Vec<(FormatId, u32)> {
        self.opened.read().await.clone()
    }
}

#[async_trait]
impl FrameEncoderFactory for MockFrameEncoders {
    fn supports(&self, target: FormatId) -> bool {
        self.supported.contains(&target)
    }

    async fn open(
        &self,
        target: FormatId,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn FrameEncoder>, TranscodeError> {
        if !self.supports(target) {
            return Err(TranscodeError::encode_failure(target, "not supported by mock"));
        }
        self.opened.write().await.push((target, bitrate_kbps));
        if target == WAV {
            return Ok(Box::new(WavEncoder::new(spec)));
        }
        Ok(Box::new(PlaceholderEncoder { samples: 0 }))
    }
}

struct PlaceholderEncoder {
    samples: usize,
}

#[async_trait]
impl FrameEncoder for PlaceholderEncoder {
    async fn encode_frame(&mut self, samples: &[f32]) -> Result<Bytes, TranscodeError> {
        self.samples += samples.len();
        Ok(Bytes::new())
    }

    async fn flush(&mut self) -> Result<Bytes, TranscodeError> {
        Ok(fake_mp3(self.samples))
    }
}

/// Mock implementation of [`CaptureBackend`].
///
/// Accepts exactly the MIME variants it was built with. Opened sessions and
/// the total number of samples pushed are recorded.
#[derive(Debug, Clone)]
pub struct MockCaptureBackend {
    supported: Arc<HashSet<String>>,
    sessions: Arc<RwLock<Vec<String>>>,
    samples: Arc<RwLock<usize>>,
}

impl MockCaptureBackend {
    pub fn supporting(mimes: &[&str]) -> Self {
        Self {
            supported: Arc::new(mimes.iter().map(|m| m.to_string()).collect()),
            sessions: Arc::new(RwLock::new(Vec::new())),
            samples: Arc::new(RwLock::new(0)),
        }
    }

    /// MIME variants opened so far, in order.
    pub async fn sessions(&self) -> Vec<String> {
        self.sessions.read().await.clone()
    }

    /// Interleaved samples pushed across all sessions.
    pub async fn samples_pushed(&self) -> usize {
        *self.samples.read().await
    }
}

#[async_trait]
impl CaptureBackend for MockCaptureBackend {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.supported.contains(mime)
    }

    async fn open(
        &self,
        mime: &str,
        _spec: StreamSpec,
        _bitrate_kbps: u32,
    ) -> Result<Box<dyn CaptureSession>, TranscodeError> {
        if !self.is_type_supported(mime) {
            return Err(TranscodeError::encode_failure(mime, "not supported by mock"));
        }
        self.sessions.write().await.push(mime.to_string());
        Ok(Box::new(MockCaptureSession {
            mime: mime.to_string(),
            samples: Arc::clone(&self.samples),
        }))
    }
}

struct MockCaptureSession {
    mime: String,
    samples: Arc<RwLock<usize>>,
}

#[async_trait]
impl CaptureSession for MockCaptureSession {
    async fn push(&mut self, samples: &[f32]) -> Result<(), TranscodeError> {
        *self.samples.write().await += samples.len();
        Ok(())
    }

    async fn finish(&mut self) -> Result<Bytes, TranscodeError> {
        Ok(Bytes::from(format!("captured {}", self.mime)))
    }
}
