//! Types for the transcode module.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::format::FormatId;
use crate::naming::{Dimensions, NameSuffix};

/// User-chosen conversion options shared by every task in a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Quality factor in (0, 1] for lossy image targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    /// Explicit output size. Defaults to the source size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// When non-empty, one image output per size.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sizes: Vec<Dimensions>,
    /// Bitrate for fixed-bitrate audio targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
}

impl ConversionOptions {
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some(Dimensions::new(width, height));
        self
    }

    pub fn with_sizes(mut self, sizes: Vec<Dimensions>) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }
}

/// Shape of a PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Decoded PCM audio, one sample buffer per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Splits an interleaved buffer into per-channel buffers.
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    /// Complete frames, bounded by the shortest channel.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn spec(&self) -> StreamSpec {
        StreamSpec {
            sample_rate: self.sample_rate,
            channels: self.channel_count(),
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Interleaves frames `start..end` (clamped) into one buffer.
    pub fn interleaved(&self, start: usize, end: usize) -> Vec<f32> {
        let end = end.min(self.frames());
        let start = start.min(end);
        let mut out = Vec::with_capacity((end - start) * self.channel_count());
        for i in start..end {
            for channel in &self.channels {
                out.push(channel[i]);
            }
        }
        out
    }
}

/// What crosses into a worker: encoded bytes or already-decoded PCM.
#[derive(Debug, Clone)]
pub enum Payload {
    Encoded(Bytes),
    Pcm(DecodedAudio),
}

/// One encoded output of a conversion.
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    pub bytes: Bytes,
    pub suffix: Option<NameSuffix>,
    pub dimensions: Option<Dimensions>,
}

impl EncodedOutput {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            suffix: None,
            dimensions: None,
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct TranscodeOutput {
    /// Format actually produced; differs from the request after a fallback.
    pub format: FormatId,
    pub outputs: Vec<EncodedOutput>,
    pub advisories: Vec<Advisory>,
}

impl TranscodeOutput {
    pub fn single(format: FormatId, output: EncodedOutput) -> Self {
        Self {
            format,
            outputs: vec![output],
            advisories: Vec::new(),
        }
    }

    /// Unchanged source bytes for a source that already is the target.
    pub fn passthrough(format: FormatId, bytes: Bytes) -> Self {
        Self::single(format, EncodedOutput::new(bytes))
    }
}

/// How loud an advisory should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
}

/// Classification of a quality advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityConcern {
    /// Re-encoding between two lossy formats.
    GenerationLoss,
    /// Lossless source compressed to a lossy target.
    ExpectedCompression,
    /// Lossy source stored losslessly.
    NoQualityGain,
}

/// Non-fatal note attached to a conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Advisory {
    Quality {
        severity: Severity,
        concern: QualityConcern,
        message: String,
    },
    FormatSubstituted {
        requested: FormatId,
        substituted: FormatId,
        message: String,
    },
}

impl Advisory {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Quality { severity, .. } => *severity,
            Self::FormatSubstituted { .. } => Severity::Warning,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Quality { message, .. } | Self::FormatSubstituted { message, .. } => message,
        }
    }

    pub fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }
}
