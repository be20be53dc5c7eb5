//! The format capability table.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::types::{FormatCategory, FormatDescriptor, FormatId, Signature};

/// Ids of the built-in formats.
pub mod ids {
    use super::FormatId;

    pub const PNG: FormatId = FormatId::new("png");
    pub const JPEG: FormatId = FormatId::new("jpeg");
    pub const GIF: FormatId = FormatId::new("gif");
    pub const WEBP: FormatId = FormatId::new("webp");
    pub const BMP: FormatId = FormatId::new("bmp");
    pub const TIFF: FormatId = FormatId::new("tiff");
    pub const ICO: FormatId = FormatId::new("ico");

    pub const WAV: FormatId = FormatId::new("wav");
    pub const FLAC: FormatId = FormatId::new("flac");
    pub const OPUS: FormatId = FormatId::new("opus");
    pub const OGG: FormatId = FormatId::new("ogg");
    pub const MP3: FormatId = FormatId::new("mp3");
    pub const AAC: FormatId = FormatId::new("aac");
    pub const M4A: FormatId = FormatId::new("m4a");
    pub const WEBM: FormatId = FormatId::new("webm");
}

use ids::*;

/// Errors raised when building a registry from custom entries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate format id: {0}")]
    DuplicateId(FormatId),

    #[error("format {0} lists itself as a target")]
    IdentityTarget(FormatId),

    #[error("format {format} targets unknown format {target}")]
    UnknownTarget { format: FormatId, target: FormatId },
}

/// Ordered collection of format descriptors.
///
/// Registration order is significant: signature detection scans entries in
/// this order and the first match wins.
#[derive(Debug)]
pub struct FormatRegistry {
    entries: Vec<FormatDescriptor>,
    index: HashMap<&'static str, usize>,
}

static STANDARD: Lazy<FormatRegistry> = Lazy::new(|| {
    FormatRegistry::new(standard_entries()).expect("built-in format table is consistent")
});

impl FormatRegistry {
    /// Builds a registry, validating ids and target references.
    pub fn new(entries: Vec<FormatDescriptor>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.id.as_str(), i).is_some() {
                return Err(RegistryError::DuplicateId(entry.id));
            }
        }

        for entry in &entries {
            for target in entry.targets {
                if *target == entry.id {
                    return Err(RegistryError::IdentityTarget(entry.id));
                }
                if !index.contains_key(target.as_str()) {
                    return Err(RegistryError::UnknownTarget {
                        format: entry.id,
                        target: *target,
                    });
                }
            }
        }

        Ok(Self { entries, index })
    }

    /// The built-in registry.
    pub fn standard() -> &'static FormatRegistry {
        &STANDARD
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[FormatDescriptor] {
        &self.entries
    }

    pub fn get(&self, id: FormatId) -> Option<&FormatDescriptor> {
        self.lookup(id.as_str())
    }

    /// Looks up a format by its id string (case-insensitive), falling back to
    /// the extension lists so that `"jpg"` resolves to `jpeg`.
    pub fn lookup(&self, name: &str) -> Option<&FormatDescriptor> {
        let name = name.trim().trim_start_matches('.').to_ascii_lowercase();
        if let Some(&i) = self.index.get(name.as_str()) {
            return Some(&self.entries[i]);
        }
        self.entries
            .iter()
            .find(|e| e.extensions.iter().any(|ext| *ext == name))
    }

    /// Position of a format in registration order.
    pub fn position(&self, id: FormatId) -> Option<usize> {
        self.index.get(id.as_str()).copied()
    }

    /// Longest prefix a buffer needs for every signature to be checkable.
    pub fn max_signature_len(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|e| e.signatures.iter())
            .map(Signature::required_len)
            .max()
            .unwrap_or(0)
    }

    /// All ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = FormatId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Ids that appear as a target of at least one format.
    pub fn all_targets(&self) -> HashSet<FormatId> {
        self.entries
            .iter()
            .flat_map(|e| e.targets.iter().copied())
            .collect()
    }
}

const AUDIO_FROM_WAV: &[FormatId] = &[MP3, OGG, OPUS, FLAC, M4A, AAC, WEBM];
const AUDIO_FROM_FLAC: &[FormatId] = &[MP3, WAV, OGG, OPUS, M4A, AAC, WEBM];
const AUDIO_FROM_OPUS: &[FormatId] = &[MP3, WAV, OGG, FLAC, M4A, AAC, WEBM];
const AUDIO_FROM_OGG: &[FormatId] = &[MP3, WAV, OPUS, FLAC, M4A, AAC, WEBM];
const AUDIO_FROM_MP3: &[FormatId] = &[WAV, OGG, OPUS, FLAC, M4A, AAC, WEBM];
const AUDIO_FROM_AAC: &[FormatId] = &[MP3, WAV, OGG, OPUS, FLAC, M4A, WEBM];
const AUDIO_FROM_M4A: &[FormatId] = &[MP3, WAV, OGG, OPUS, FLAC, AAC, WEBM];
const AUDIO_FROM_WEBM: &[FormatId] = &[MP3, WAV, OGG, OPUS, FLAC, M4A, AAC];

/// Signature literal usable inside promoted `&[...]` tables.
macro_rules! sig {
    ($offset:expr, $bytes:expr) => {
        Signature {
            offset: $offset,
            bytes: $bytes,
        }
    };
}

fn standard_entries() -> Vec<FormatDescriptor> {
    vec![
        FormatDescriptor {
            id: PNG,
            label: "PNG",
            mime_types: &["image/png", "image/x-png", "image/apng"],
            extensions: &["png", "apng"],
            signatures: &[sig!(0, b"\x89PNG\r\n\x1a\n")],
            category: FormatCategory::Photo,
            targets: &[JPEG, WEBP, GIF, BMP, TIFF, ICO],
        },
        FormatDescriptor {
            id: JPEG,
            label: "JPEG",
            mime_types: &["image/jpeg", "image/jpg", "image/pjpeg"],
            extensions: &["jpg", "jpeg", "jpe", "jfif"],
            signatures: &[sig!(0, b"\xff\xd8\xff")],
            category: FormatCategory::Photo,
            targets: &[PNG, WEBP, GIF, BMP, TIFF, ICO],
        },
        FormatDescriptor {
            id: GIF,
            label: "GIF",
            mime_types: &["image/gif"],
            extensions: &["gif"],
            signatures: &[sig!(0, b"GIF87a"), sig!(0, b"GIF89a")],
            category: FormatCategory::Photo,
            targets: &[PNG, JPEG, WEBP, BMP, TIFF],
        },
        FormatDescriptor {
            id: WEBP,
            label: "WebP",
            mime_types: &["image/webp"],
            extensions: &["webp"],
            signatures: &[sig!(8, b"WEBP")],
            category: FormatCategory::Photo,
            targets: &[PNG, JPEG, GIF, BMP, TIFF, ICO],
        },
        FormatDescriptor {
            id: BMP,
            label: "BMP",
            mime_types: &["image/bmp", "image/x-bmp", "image/x-ms-bmp"],
            extensions: &["bmp", "dib"],
            signatures: &[sig!(0, b"BM")],
            category: FormatCategory::Photo,
            targets: &[PNG, JPEG, WEBP, GIF, TIFF, ICO],
        },
        FormatDescriptor {
            id: TIFF,
            label: "TIFF",
            mime_types: &["image/tiff", "image/tiff-fx"],
            extensions: &["tiff", "tif"],
            signatures: &[sig!(0, b"II*\0"), sig!(0, b"MM\0*")],
            category: FormatCategory::Photo,
            targets: &[PNG, JPEG, WEBP, GIF, BMP],
        },
        FormatDescriptor {
            id: ICO,
            label: "ICO",
            mime_types: &["image/x-icon", "image/vnd.microsoft.icon", "image/ico"],
            extensions: &["ico"],
            signatures: &[sig!(0, b"\0\0\x01\0")],
            category: FormatCategory::Icon,
            targets: &[PNG],
        },
        FormatDescriptor {
            id: WAV,
            label: "WAV",
            mime_types: &["audio/wav", "audio/x-wav", "audio/wave", "audio/vnd.wave"],
            extensions: &["wav", "wave"],
            signatures: &[sig!(8, b"WAVE")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_WAV,
        },
        FormatDescriptor {
            id: FLAC,
            label: "FLAC",
            mime_types: &["audio/flac", "audio/x-flac"],
            extensions: &["flac"],
            signatures: &[sig!(0, b"fLaC")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_FLAC,
        },
        // Must precede `ogg`: Opus streams are Ogg pages with an OpusHead packet.
        FormatDescriptor {
            id: OPUS,
            label: "Opus",
            mime_types: &["audio/opus"],
            extensions: &["opus"],
            signatures: &[sig!(28, b"OpusHead")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_OPUS,
        },
        FormatDescriptor {
            id: OGG,
            label: "Ogg Vorbis",
            mime_types: &["audio/ogg", "audio/vorbis", "application/ogg"],
            extensions: &["ogg", "oga"],
            signatures: &[sig!(0, b"OggS")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_OGG,
        },
        FormatDescriptor {
            id: MP3,
            label: "MP3",
            mime_types: &["audio/mpeg", "audio/mp3", "audio/x-mp3", "audio/mpeg3"],
            extensions: &["mp3"],
            signatures: &[
                sig!(0, b"ID3"),
                sig!(0, b"\xff\xfb"),
                sig!(0, b"\xff\xf3"),
                sig!(0, b"\xff\xf2"),
            ],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_MP3,
        },
        FormatDescriptor {
            id: AAC,
            label: "AAC (ADTS)",
            mime_types: &["audio/aac", "audio/x-aac", "audio/aacp"],
            extensions: &["aac"],
            signatures: &[sig!(0, b"\xff\xf1"), sig!(0, b"\xff\xf9")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_AAC,
        },
        FormatDescriptor {
            id: M4A,
            label: "M4A",
            mime_types: &["audio/mp4", "audio/x-m4a", "audio/m4a"],
            extensions: &["m4a", "m4b", "mp4a"],
            signatures: &[sig!(4, b"ftypM4A "), sig!(4, b"ftypM4B ")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_M4A,
        },
        FormatDescriptor {
            id: WEBM,
            label: "WebM audio",
            mime_types: &["audio/webm"],
            extensions: &["webm", "weba"],
            signatures: &[sig!(0, b"\x1a\x45\xdf\xa3")],
            category: FormatCategory::Audio,
            targets: AUDIO_FROM_WEBM,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const X: FormatId = FormatId::new("x");
    const Y: FormatId = FormatId::new("y");

    fn registry() -> &'static FormatRegistry {
        FormatRegistry::standard()
    }

    #[test]
    fn test_identity_is_never_a_target() {
        for entry in registry().entries() {
            assert!(
                !entry.targets.contains(&entry.id),
                "{} lists itself as a target",
                entry.id
            );
        }
    }

    #[test]
    fn test_targets_are_registered_and_same_family() {
        let reg = registry();
        for entry in reg.entries() {
            for target in entry.targets {
                let desc = reg.get(*target).expect("target registered");
                assert_eq!(desc.family(), entry.family(), "{} -> {}", entry.id, target);
            }
        }
    }

    #[test]
    fn test_lookup_by_id_and_extension() {
        let reg = registry();
        assert_eq!(reg.lookup("PNG").map(|d| d.id), Some(PNG));
        assert_eq!(reg.lookup("jpg").map(|d| d.id), Some(JPEG));
        assert_eq!(reg.lookup(".jpeg").map(|d| d.id), Some(JPEG));
        assert_eq!(reg.lookup("tif").map(|d| d.id), Some(TIFF));
        assert!(reg.lookup("docx").is_none());
    }

    #[test]
    fn test_canonical_output_naming_data() {
        let reg = registry();
        let mp3 = reg.get(MP3).unwrap();
        assert_eq!(mp3.extension(), "mp3");
        assert_eq!(mp3.content_type(), "audio/mpeg");
        assert_eq!(reg.get(JPEG).unwrap().extension(), "jpg");
    }

    #[test]
    fn test_opus_registered_before_ogg() {
        let reg = registry();
        assert!(reg.position(OPUS).unwrap() < reg.position(OGG).unwrap());
    }

    #[test]
    fn test_custom_registry_rejects_identity_target() {
        let entries = vec![FormatDescriptor {
            id: X,
            label: "X",
            mime_types: &[],
            extensions: &["x"],
            signatures: &[],
            category: FormatCategory::Photo,
            targets: &[X],
        }];
        assert_eq!(
            FormatRegistry::new(entries).unwrap_err(),
            RegistryError::IdentityTarget(X)
        );
    }

    #[test]
    fn test_custom_registry_rejects_unknown_target_and_duplicates() {
        let unknown = vec![FormatDescriptor {
            id: X,
            label: "X",
            mime_types: &[],
            extensions: &[],
            signatures: &[],
            category: FormatCategory::Photo,
            targets: &[Y],
        }];
        assert!(matches!(
            FormatRegistry::new(unknown),
            Err(RegistryError::UnknownTarget { .. })
        ));

        let entry = FormatDescriptor {
            id: X,
            label: "X",
            mime_types: &[],
            extensions: &[],
            signatures: &[],
            category: FormatCategory::Photo,
            targets: &[],
        };
        assert_eq!(
            FormatRegistry::new(vec![entry.clone(), entry]).unwrap_err(),
            RegistryError::DuplicateId(X)
        );
    }

    #[test]
    fn test_max_signature_len_covers_opus_head() {
        assert_eq!(registry().max_signature_len(), 36);
    }
}
