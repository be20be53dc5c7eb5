//! Quality advisories for audio conversions.

use crate::format::ids::{AAC, FLAC, M4A, MP3, OGG, OPUS, WAV, WEBM};
use crate::format::{FormatId, FormatRegistry};

use super::types::{Advisory, QualityConcern, Severity};

const LOSSY: &[FormatId] = &[MP3, OGG, OPUS, AAC, M4A, WEBM];
const LOSSLESS: &[FormatId] = &[WAV, FLAC];

pub fn is_lossy(format: FormatId) -> bool {
    LOSSY.contains(&format)
}

pub fn is_lossless(format: FormatId) -> bool {
    LOSSLESS.contains(&format)
}

/// True when both formats are lossy and differ.
pub fn is_lossy_to_lossy_transcode(source: FormatId, target: FormatId) -> bool {
    source != target && is_lossy(source) && is_lossy(target)
}

/// Advisory for converting `source` to `target`, if any.
pub fn assess(registry: &FormatRegistry, source: FormatId, target: FormatId) -> Option<Advisory> {
    if source == target {
        return None;
    }

    let label = |id: FormatId| registry.get(id).map(|d| d.label).unwrap_or(id.as_str());

    let (severity, concern, message) = if is_lossy_to_lossy_transcode(source, target) {
        (
            Severity::Warning,
            QualityConcern::GenerationLoss,
            format!(
                "Converting {} to {} re-encodes lossy audio and may reduce quality",
                label(source),
                label(target)
            ),
        )
    } else if is_lossless(source) && is_lossy(target) {
        (
            Severity::Info,
            QualityConcern::ExpectedCompression,
            format!(
                "{} is a lossy format; some detail from the {} source will be discarded",
                label(target),
                label(source)
            ),
        )
    } else if is_lossy(source) && is_lossless(target) {
        (
            Severity::Info,
            QualityConcern::NoQualityGain,
            format!(
                "Converting {} to {} will not restore lost quality and produces a larger file",
                label(source),
                label(target)
            ),
        )
    } else {
        return None;
    };

    Some(Advisory::Quality {
        severity,
        concern,
        message,
    })
}
