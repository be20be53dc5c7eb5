//! Configuration for the transcoders.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the image transcoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Quality factor for lossy targets when the options carry none.
    #[serde(default = "default_quality")]
    pub default_quality: f32,

    /// Resampling filter used when resizing.
    #[serde(default)]
    pub resize_filter: ResizeFilter,
}

fn default_quality() -> f32 {
    0.92
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default_quality: default_quality(),
            resize_filter: ResizeFilter::default(),
        }
    }
}

/// Resampling filter names accepted in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl ResizeFilter {
    pub fn filter_type(&self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Configuration for the audio transcoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Samples per channel handed to a bitstream encoder at a time.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// Bitrate for fixed-bitrate targets when the options carry none.
    #[serde(default = "default_bitrate")]
    pub default_bitrate_kbps: u32,

    /// Length of each real-time capture chunk (milliseconds).
    #[serde(default = "default_chunk_ms")]
    pub capture_chunk_ms: u64,

    /// Extra time allowed on top of the stream duration before a capture
    /// is abandoned (milliseconds).
    #[serde(default = "default_margin_ms")]
    pub capture_margin_ms: u64,

    /// Minimum spacing between capture progress updates (milliseconds).
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_frame_size() -> usize {
    1152
}

fn default_bitrate() -> u32 {
    192
}

fn default_chunk_ms() -> u64 {
    100
}

fn default_margin_ms() -> u64 {
    5000
}

fn default_progress_interval_ms() -> u64 {
    250
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            frame_size: default_frame_size(),
            default_bitrate_kbps: default_bitrate(),
            capture_chunk_ms: default_chunk_ms(),
            capture_margin_ms: default_margin_ms(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl AudioConfig {
    /// Sets the ffmpeg path.
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn capture_chunk(&self) -> Duration {
        Duration::from_millis(self.capture_chunk_ms)
    }

    pub fn capture_margin(&self) -> Duration {
        Duration::from_millis(self.capture_margin_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
