//! Audio encoder capability detection.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Container muxer and codec encoder ffmpeg uses for a capture MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTarget {
    pub container: &'static str,
    pub codec: &'static str,
}

const CAPTURE_TARGETS: &[(&str, CaptureTarget)] = &[
    (
        "audio/ogg; codecs=vorbis",
        CaptureTarget {
            container: "ogg",
            codec: "libvorbis",
        },
    ),
    (
        "audio/ogg; codecs=opus",
        CaptureTarget {
            container: "ogg",
            codec: "libopus",
        },
    ),
    (
        "audio/webm; codecs=opus",
        CaptureTarget {
            container: "webm",
            codec: "libopus",
        },
    ),
    (
        "audio/webm; codecs=vorbis",
        CaptureTarget {
            container: "webm",
            codec: "libvorbis",
        },
    ),
    (
        "audio/mp4; codecs=mp4a.40.2",
        CaptureTarget {
            container: "ipod",
            codec: "aac",
        },
    ),
    (
        "audio/mp4; codecs=opus",
        CaptureTarget {
            container: "ipod",
            codec: "libopus",
        },
    ),
    (
        "audio/aac",
        CaptureTarget {
            container: "adts",
            codec: "aac",
        },
    ),
    (
        "audio/flac",
        CaptureTarget {
            container: "flac",
            codec: "flac",
        },
    ),
];

/// Maps a capture MIME variant to its ffmpeg container and codec.
pub fn capture_target(mime: &str) -> Option<CaptureTarget> {
    let mime = mime.trim();
    CAPTURE_TARGETS
        .iter()
        .find(|(m, _)| m.eq_ignore_ascii_case(mime))
        .map(|(_, target)| *target)
}

/// Audio encoders detected in the local ffmpeg build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// ffmpeg could be executed at all
    pub ffmpeg: bool,
    /// LAME MP3 encoder available
    pub libmp3lame: bool,
    /// Opus encoder available
    pub libopus: bool,
    /// Vorbis encoder available
    pub libvorbis: bool,
    /// Native AAC encoder available
    pub aac: bool,
    /// FLAC encoder available
    pub flac: bool,
}

impl EncoderCapabilities {
    /// Detect available audio encoders by probing ffmpeg.
    pub async fn detect(ffmpeg_path: &Path) -> Self {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        let stdout = match output {
            Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).to_string(),
            Ok(o) => {
                warn!(status = %o.status, "ffmpeg -encoders failed; audio encoders unavailable");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %ffmpeg_path.display(), error = %e, "ffmpeg not found; audio encoders unavailable");
                return Self::default();
            }
        };

        let caps = Self::from_encoder_list(&stdout);
        debug!(?caps, "Detected audio encoders");
        caps
    }

    /// Parses the output of `ffmpeg -encoders`.
    pub fn from_encoder_list(list: &str) -> Self {
        // Audio encoder lines look like " A....D libmp3lame  libmp3lame MP3 ..."
        let Some(line_regex) = Regex::new(r"(?m)^\s*A[A-Z.]{5}\s+(\S+)").ok() else {
            return Self {
                ffmpeg: true,
                ..Self::default()
            };
        };
        let names: Vec<&str> = line_regex
            .captures_iter(list)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect();
        let has = |encoder: &str| names.contains(&encoder);

        Self {
            ffmpeg: true,
            libmp3lame: has("libmp3lame"),
            libopus: has("libopus"),
            libvorbis: has("libvorbis"),
            aac: has("aac"),
            flac: has("flac"),
        }
    }

    /// Every encoder flag set.
    pub fn all() -> Self {
        Self {
            ffmpeg: true,
            libmp3lame: true,
            libopus: true,
            libvorbis: true,
            aac: true,
            flac: true,
        }
    }

    /// Check if an encoder is available by ffmpeg name.
    pub fn has_encoder(&self, name: &str) -> bool {
        match name {
            "libmp3lame" => self.libmp3lame,
            "libopus" => self.libopus,
            "libvorbis" => self.libvorbis,
            "aac" => self.aac,
            "flac" => self.flac,
            _ => false,
        }
    }

    /// Check if a capture MIME variant can be produced.
    pub fn supports_mime(&self, mime: &str) -> bool {
        capture_target(mime).is_some_and(|target| self.has_encoder(target.codec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODERS: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 A....D aac                  AAC (Advanced Audio Coding)
 A....D flac                 FLAC (Free Lossless Audio Codec)
 A....D libmp3lame           libmp3lame MP3 (MPEG audio layer 3)
 A....D libopus              libopus Opus
";

    #[test]
    fn test_default_capabilities() {
        let caps = EncoderCapabilities::default();
        assert!(!caps.ffmpeg);
        assert!(!caps.supports_mime("audio/flac"));
    }

    #[test]
    fn test_parse_encoder_list() {
        let caps = EncoderCapabilities::from_encoder_list(ENCODERS);
        assert!(caps.ffmpeg);
        assert!(caps.libmp3lame);
        assert!(caps.libopus);
        assert!(caps.aac);
        assert!(caps.flac);
        assert!(!caps.libvorbis);
    }

    #[test]
    fn test_supports_mime() {
        let caps = EncoderCapabilities::from_encoder_list(ENCODERS);
        assert!(caps.supports_mime("audio/ogg; codecs=opus"));
        assert!(caps.supports_mime("AUDIO/AAC"));
        assert!(!caps.supports_mime("audio/ogg; codecs=vorbis"));
        assert!(!caps.supports_mime("audio/x-unknown"));
    }

    #[test]
    fn test_capture_target_lookup() {
        assert_eq!(
            capture_target("audio/webm; codecs=opus"),
            Some(CaptureTarget {
                container: "webm",
                codec: "libopus"
            })
        );
        assert!(capture_target("audio/mpeg").is_none());
    }

    #[tokio::test]
    async fn test_detect_missing_binary() {
        let caps = EncoderCapabilities::detect(Path::new("/nonexistent/ffmpeg")).await;
        assert!(!caps.ffmpeg);
        assert!(!caps.libmp3lame);
    }
}
