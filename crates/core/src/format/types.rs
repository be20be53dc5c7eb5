//! Types for the format registry.

use serde::{Serialize, Serializer};
use std::fmt;

/// Identifier of a registered format (e.g. `"png"`, `"mp3"`).
///
/// Ids are compared by value, so an id obtained from one registry can be used
/// to look up the same format in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FormatId(&'static str);

impl FormatId {
    /// Creates a format id from a static string.
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    /// Returns the id as a string slice.
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for FormatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Broad category of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCategory {
    /// Raster photo/graphics formats.
    Photo,
    /// Icon containers.
    Icon,
    /// Audio formats.
    Audio,
}

impl FormatCategory {
    /// Returns the media family that handles this category.
    pub fn family(&self) -> MediaFamily {
        match self {
            Self::Photo | Self::Icon => MediaFamily::Image,
            Self::Audio => MediaFamily::Audio,
        }
    }
}

/// Which transcoder family handles a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaFamily {
    Image,
    Audio,
}

impl fmt::Display for MediaFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// A byte pattern expected at a fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub offset: usize,
    pub bytes: &'static [u8],
}

impl Signature {
    pub const fn new(offset: usize, bytes: &'static [u8]) -> Self {
        Self { offset, bytes }
    }

    /// Number of bytes a buffer needs before this signature can match.
    pub fn required_len(&self) -> usize {
        self.offset + self.bytes.len()
    }

    /// Returns true if `buf` is long enough and carries the pattern at the offset.
    pub fn matches(&self, buf: &[u8]) -> bool {
        buf.len() >= self.required_len()
            && &buf[self.offset..self.required_len()] == self.bytes
    }
}

/// Static description of one format.
#[derive(Debug, Clone)]
pub struct FormatDescriptor {
    /// Unique id.
    pub id: FormatId,
    /// Human readable label.
    pub label: &'static str,
    /// MIME aliases. The first one is used as the content type of outputs.
    pub mime_types: &'static [&'static str],
    /// Filename extensions without the dot. The first one is used for outputs.
    pub extensions: &'static [&'static str],
    /// Signatures checked in order; any one matching identifies the format.
    pub signatures: &'static [Signature],
    /// Category of the format.
    pub category: FormatCategory,
    /// Formats this one may be converted to. Never contains `id` itself.
    pub targets: &'static [FormatId],
}

impl FormatDescriptor {
    /// Canonical output extension.
    pub fn extension(&self) -> &'static str {
        self.extensions.first().copied().unwrap_or(self.id.as_str())
    }

    /// Canonical content type.
    pub fn content_type(&self) -> &'static str {
        self.mime_types
            .first()
            .copied()
            .unwrap_or("application/octet-stream")
    }

    pub fn family(&self) -> MediaFamily {
        self.category.family()
    }

    /// Returns true if this format lists `target` as an allowed conversion.
    pub fn can_target(&self, target: FormatId) -> bool {
        self.targets.contains(&target)
    }
}

/// How much a detection result can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Nothing matched.
    Unknown,
    /// Filename extension only; trivially spoofable.
    Low,
    /// Reported MIME type.
    Medium,
    /// Magic bytes matched.
    High,
}

/// Result of format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub format: Option<FormatId>,
    pub confidence: Confidence,
}

impl Detection {
    pub fn unknown() -> Self {
        Self {
            format: None,
            confidence: Confidence::Unknown,
        }
    }

    pub fn found(format: FormatId, confidence: Confidence) -> Self {
        Self {
            format: Some(format),
            confidence,
        }
    }

    pub fn is_known(&self) -> bool {
        self.format.is_some()
    }
}
