//! Encoder negotiation with data-driven fallback.
//!
//! Bitstream targets are encoded frame by frame. Every other target is
//! captured through the first streaming-encoder MIME variant the backend
//! supports; when none is, the target is substituted (lossless targets by
//! WAV, lossy ones by MP3) and the substitution is reported as an advisory.

use tracing::{debug, warn};

use crate::format::ids::{AAC, FLAC, M4A, MP3, OGG, OPUS, WAV, WEBM};
use crate::format::{FormatId, FormatRegistry};
use crate::transcode::error::TranscodeError;
use crate::transcode::quality;
use crate::transcode::types::Advisory;

use super::bitstream::FrameEncoderFactory;
use super::capture::CaptureBackend;

/// Targets encoded by the deterministic frame path.
pub const BITSTREAM_TARGETS: &[FormatId] = &[WAV, MP3];

/// Streaming-encoder MIME variants to probe per target, most preferred first.
const CAPTURE_CANDIDATES: &[(FormatId, &[&str])] = &[
    (OGG, &["audio/ogg; codecs=vorbis", "audio/ogg; codecs=opus"]),
    (OPUS, &["audio/ogg; codecs=opus"]),
    (WEBM, &["audio/webm; codecs=opus", "audio/webm; codecs=vorbis"]),
    (M4A, &["audio/mp4; codecs=mp4a.40.2", "audio/mp4; codecs=opus"]),
    (AAC, &["audio/aac"]),
    (FLAC, &["audio/flac"]),
];

/// Candidate MIME variants for `target`, empty if it has none.
pub fn capture_candidates(target: FormatId) -> &'static [&'static str] {
    CAPTURE_CANDIDATES
        .iter()
        .find(|(id, _)| *id == target)
        .map(|(_, candidates)| *candidates)
        .unwrap_or(&[])
}

/// Returns the first candidate accepted by `is_supported`.
pub fn probe_first<'a>(
    candidates: &[&'a str],
    is_supported: impl Fn(&str) -> bool,
) -> Option<&'a str> {
    candidates.iter().copied().find(|c| is_supported(c))
}

/// Format used when `target` cannot be encoded at all.
pub fn substitute_for(target: FormatId) -> FormatId {
    if quality::is_lossless(target) {
        WAV
    } else {
        MP3
    }
}

/// How a target will be produced.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodePlan {
    Bitstream { format: FormatId },
    Capture { format: FormatId, mime: &'static str },
}

impl EncodePlan {
    /// The format the plan actually produces.
    pub fn format(&self) -> FormatId {
        match self {
            Self::Bitstream { format } | Self::Capture { format, .. } => *format,
        }
    }
}

/// Result of negotiating an encoder for a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Negotiation {
    pub plan: EncodePlan,
    pub substitution: Option<Advisory>,
}

/// Picks an encode strategy for `target`.
pub fn negotiate(
    registry: &FormatRegistry,
    target: FormatId,
    frame_encoders: &dyn FrameEncoderFactory,
    capture: &dyn CaptureBackend,
) -> Result<Negotiation, TranscodeError> {
    if BITSTREAM_TARGETS.contains(&target) {
        if frame_encoders.supports(target) {
            return Ok(Negotiation {
                plan: EncodePlan::Bitstream { format: target },
                substitution: None,
            });
        }
        return Err(TranscodeError::encode_failure(
            target,
            "no encoder available",
        ));
    }

    let candidates = capture_candidates(target);
    if let Some(mime) = probe_first(candidates, |m| capture.is_type_supported(m)) {
        debug!(target = %target, mime, "Using streaming encoder");
        return Ok(Negotiation {
            plan: EncodePlan::Capture {
                format: target,
                mime,
            },
            substitution: None,
        });
    }

    let substitute = substitute_for(target);
    if !frame_encoders.supports(substitute) {
        return Err(TranscodeError::encode_failure(
            target,
            format!("no encoder available and {} fallback unsupported", substitute),
        ));
    }

    let label = |id: FormatId| registry.get(id).map(|d| d.label).unwrap_or(id.as_str());
    let message = format!(
        "{} encoding is unavailable; produced {} instead",
        label(target),
        label(substitute)
    );
    warn!(requested = %target, substituted = %substitute, "Encoder unavailable, substituting");

    Ok(Negotiation {
        plan: EncodePlan::Bitstream { format: substitute },
        substitution: Some(Advisory::FormatSubstituted {
            requested: target,
            substituted: substitute,
            message,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCaptureBackend, MockFrameEncoders};

    fn reg() -> &'static FormatRegistry {
        FormatRegistry::standard()
    }

    #[test]
    fn test_every_capture_target_has_candidates() {
        let registry = reg();
        for id in registry.ids() {
            let audio = registry.get(id).unwrap().family() == crate::format::MediaFamily::Audio;
            if audio && !BITSTREAM_TARGETS.contains(&id) {
                assert!(!capture_candidates(id).is_empty(), "{}", id);
            }
        }
        assert!(capture_candidates(WAV).is_empty());
    }

    #[test]
    fn test_probe_first_respects_order() {
        let candidates = ["a", "b", "c"];
        assert_eq!(probe_first(&candidates, |m| m != "a"), Some("b"));
        assert_eq!(probe_first(&candidates, |_| false), None);
        assert_eq!(probe_first(&[], |_| true), None);
    }

    #[test]
    fn test_bitstream_targets() {
        let encoders = MockFrameEncoders::new();
        let capture = MockCaptureBackend::supporting(&[]);
        let n = negotiate(reg(), MP3, &encoders, &capture).unwrap();
        assert_eq!(n.plan, EncodePlan::Bitstream { format: MP3 });
        assert!(n.substitution.is_none());

        let wav_only = MockFrameEncoders::supporting(&[WAV]);
        let err = negotiate(reg(), MP3, &wav_only, &capture).unwrap_err();
        assert!(matches!(err, TranscodeError::EncodeFailure { .. }));
    }

    #[test]
    fn test_capture_uses_first_supported_variant() {
        let encoders = MockFrameEncoders::new();
        let capture = MockCaptureBackend::supporting(&["audio/ogg; codecs=opus"]);
        let n = negotiate(reg(), OGG, &encoders, &capture).unwrap();
        assert_eq!(
            n.plan,
            EncodePlan::Capture {
                format: OGG,
                mime: "audio/ogg; codecs=opus"
            }
        );
    }

    #[test]
    fn test_unsupported_targets_are_substituted() {
        let encoders = MockFrameEncoders::new();
        let capture = MockCaptureBackend::supporting(&[]);

        let lossy = negotiate(reg(), OGG, &encoders, &capture).unwrap();
        assert_eq!(lossy.plan.format(), MP3);
        let advisory = lossy.substitution.unwrap();
        assert!(advisory.is_warning());
        assert_eq!(
            advisory.message(),
            "Ogg Vorbis encoding is unavailable; produced MP3 instead"
        );

        let lossless = negotiate(reg(), FLAC, &encoders, &capture).unwrap();
        assert_eq!(lossless.plan.format(), WAV);
    }

    #[test]
    fn test_missing_fallback_encoder_fails() {
        let wav_only = MockFrameEncoders::supporting(&[WAV]);
        let capture = MockCaptureBackend::supporting(&[]);
        let err = negotiate(reg(), AAC, &wav_only, &capture).unwrap_err();
        assert!(matches!(err, TranscodeError::EncodeFailure { .. }));
        assert!(negotiate(reg(), FLAC, &wav_only, &capture).is_ok());
    }
}
