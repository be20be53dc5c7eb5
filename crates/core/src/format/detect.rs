//! Three-tier format detection: magic bytes, reported MIME, filename extension.

use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::registry::FormatRegistry;
use super::types::{Confidence, Detection, FormatId};
use crate::transcode::TranscodeError;

/// Format sniffer backed by a registry.
#[derive(Debug, Clone, Copy)]
pub struct Detector<'r> {
    registry: &'r FormatRegistry,
}

impl Detector<'static> {
    /// Detector over the built-in registry.
    pub fn standard() -> Self {
        Self::new(FormatRegistry::standard())
    }
}

impl<'r> Detector<'r> {
    pub fn new(registry: &'r FormatRegistry) -> Self {
        Self { registry }
    }

    /// Runs the full cascade. Magic bytes beat the reported MIME type, which
    /// beats the filename extension.
    pub fn detect(
        &self,
        bytes: &[u8],
        reported_mime: Option<&str>,
        file_name: Option<&str>,
    ) -> Detection {
        if let Some(id) = self.by_signature(bytes) {
            return Detection::found(id, Confidence::High);
        }
        if let Some(id) = reported_mime.and_then(|m| self.by_mime(m)) {
            debug!(mime = ?reported_mime, format = %id, "Format detected from reported MIME type");
            return Detection::found(id, Confidence::Medium);
        }
        if let Some(id) = file_name.and_then(|n| self.by_extension(n)) {
            debug!(file_name = ?file_name, format = %id, "Format detected from filename extension only");
            return Detection::found(id, Confidence::Low);
        }
        Detection::unknown()
    }

    /// Reads the head of a file and detects its format.
    ///
    /// I/O errors are returned as [`TranscodeError::ReadFailure`]; they never
    /// degrade to an unknown detection.
    pub async fn detect_path(
        &self,
        path: &Path,
        reported_mime: Option<&str>,
    ) -> Result<Detection, TranscodeError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TranscodeError::read_failure(path.display(), e))?;

        let wanted = self.registry.max_signature_len();
        let mut head = Vec::with_capacity(wanted);
        (&mut file)
            .take(wanted as u64)
            .read_to_end(&mut head)
            .await
            .map_err(|e| TranscodeError::read_failure(path.display(), e))?;

        let name = path.file_name().and_then(|n| n.to_str());
        Ok(self.detect(&head, reported_mime, name))
    }

    /// First registered format with a matching signature.
    pub fn by_signature(&self, bytes: &[u8]) -> Option<FormatId> {
        self.registry
            .entries()
            .iter()
            .find(|entry| entry.signatures.iter().any(|sig| sig.matches(bytes)))
            .map(|entry| entry.id)
    }

    /// Exact, case-insensitive MIME match. A parameterised type
    /// (`audio/ogg; codecs=vorbis`) is retried without its parameters.
    pub fn by_mime(&self, mime: &str) -> Option<FormatId> {
        let exact = mime.trim();
        if exact.is_empty() {
            return None;
        }
        self.find_mime(exact).or_else(|| {
            let essence = exact.split(';').next().unwrap_or_default().trim();
            if essence.len() < exact.len() {
                self.find_mime(essence)
            } else {
                None
            }
        })
    }

    fn find_mime(&self, mime: &str) -> Option<FormatId> {
        self.registry
            .entries()
            .iter()
            .find(|e| e.mime_types.iter().any(|m| m.eq_ignore_ascii_case(mime)))
            .map(|e| e.id)
    }

    /// Case-insensitive extension match.
    pub fn by_extension(&self, file_name: &str) -> Option<FormatId> {
        let (_, ext) = file_name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        self.registry
            .entries()
            .iter()
            .find(|e| e.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)))
            .map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn buffer_for(offset: usize, pattern: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; offset];
        buf.extend_from_slice(pattern);
        buf
    }

    #[test]
    fn test_every_signature_detected_with_high_confidence() {
        let detector = Detector::standard();
        for entry in FormatRegistry::standard().entries() {
            for sig in entry.signatures {
                let buf = buffer_for(sig.offset, sig.bytes);
                let detection = detector.detect(&buf, None, None);
                assert_eq!(detection.format, Some(entry.id), "signature {:?}", sig);
                assert_eq!(detection.confidence, Confidence::High);
            }
        }
    }

    #[test]
    fn test_truncated_signature_is_unknown() {
        let detector = Detector::standard();
        for entry in FormatRegistry::standard().entries() {
            for sig in entry.signatures {
                let mut buf = buffer_for(sig.offset, sig.bytes);
                buf.pop();
                assert_eq!(detector.detect(&buf, None, None), Detection::unknown());
            }
        }
    }

    #[test]
    fn test_all_ff_buffer_is_unknown() {
        let detector = Detector::standard();
        let buf = vec![0xFFu8; 64];
        assert_eq!(detector.detect(&buf, None, None), Detection::unknown());
    }

    #[test]
    fn test_magic_bytes_beat_reported_mime_and_extension() {
        let detector = Detector::standard();
        let png = b"\x89PNG\r\n\x1a\n rest of file";
        let detection = detector.detect(png, Some("image/jpeg"), Some("photo.jpg"));
        assert_eq!(detection, Detection::found(ids::PNG, Confidence::High));
    }

    #[test]
    fn test_mime_tier_is_case_insensitive() {
        let detector = Detector::standard();
        let detection = detector.detect(b"garbage", Some("Audio/MPEG"), Some("x.wav"));
        assert_eq!(detection, Detection::found(ids::MP3, Confidence::Medium));
    }

    #[test]
    fn test_mime_parameters_are_retried_without_them() {
        let detector = Detector::standard();
        assert_eq!(detector.by_mime("audio/ogg; codecs=vorbis"), Some(ids::OGG));
        assert_eq!(detector.by_mime("text/plain"), None);
        assert_eq!(detector.by_mime(""), None);
    }

    #[test]
    fn test_extension_tier_is_low_confidence() {
        let detector = Detector::standard();
        let detection = detector.detect(b"", None, Some("Holiday.JPEG"));
        assert_eq!(detection, Detection::found(ids::JPEG, Confidence::Low));
        assert_eq!(detector.detect(b"", None, Some("README")), Detection::unknown());
        assert_eq!(detector.detect(b"", None, Some("trailing.")), Detection::unknown());
    }

    #[test]
    fn test_opus_is_not_shadowed_by_ogg() {
        let detector = Detector::standard();
        let mut page = b"OggS".to_vec();
        page.resize(28, 0);
        page.extend_from_slice(b"OpusHead");
        assert_eq!(detector.by_signature(&page), Some(ids::OPUS));
        assert_eq!(detector.by_signature(b"OggS\0\0\0\0"), Some(ids::OGG));
    }

    #[tokio::test]
    async fn test_detect_path_reads_head() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"fLaC\0\0\0\x22more").unwrap();
        let detection = Detector::standard()
            .detect_path(file.path(), None)
            .await
            .unwrap();
        assert_eq!(detection, Detection::found(ids::FLAC, Confidence::High));
    }

    #[tokio::test]
    async fn test_detect_path_missing_file_is_read_failure() {
        let result = Detector::standard()
            .detect_path(Path::new("/nonexistent/clip.wav"), None)
            .await;
        assert!(matches!(result, Err(TranscodeError::ReadFailure { .. })));
    }
}
