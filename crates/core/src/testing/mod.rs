//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the codec seams (transcoders, frame encoders,
//! capture backends) and the packaging sink, so the orchestrator can be
//! exercised without ffmpeg or a filesystem.
//!
//! # Example
//!
//! ```rust,ignore
//! use transmute_core::testing::{fixtures, MockBehavior, MockTranscoder};
//!
//! let transcoder = MockTranscoder::audio()
//!     .with_rule(fixtures::wav_bytes(8000, 1, 0.1), MockBehavior::Hang);
//!
//! // Register with an Orchestrator, run a batch...
//! let calls = transcoder.calls().await;
//! ```

mod mock_encoders;
mod mock_sink;
mod mock_transcoder;

pub use mock_encoders::{MockCaptureBackend, MockFrameEncoders};
pub use mock_sink::MemorySink;
pub use mock_transcoder::{MockBehavior, MockTranscoder, RecordedJob};

/// Test fixtures: small, valid media files built in memory.
pub mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    use crate::transcode::audio::wav_header;
    use crate::transcode::StreamSpec;

    /// A 16-bit PCM WAV file holding a 440 Hz tone.
    pub fn wav_bytes(sample_rate: u32, channels: usize, seconds: f32) -> Vec<u8> {
        let frames = (sample_rate as f32 * seconds).round() as usize;
        let mut data = Vec::with_capacity(frames * channels * 2);
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                data.extend_from_slice(&value.to_le_bytes());
            }
        }

        let spec = StreamSpec {
            sample_rate,
            channels,
        };
        let mut out = wav_header(spec, data.len() as u32).to_vec();
        out.extend_from_slice(&data);
        out
    }

    /// A solid-color PNG.
    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode_png(RgbaImage::from_pixel(width, height, Rgba([200, 80, 40, 255])))
    }

    /// A PNG with a diagonal gradient, so lossy encoders have detail to lose.
    pub fn gradient_png_bytes(width: u32, height: u32) -> Vec<u8> {
        encode_png(RgbaImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgba([r, g, r ^ g, 255])
        }))
    }

    /// An ICO container with one PNG-encoded entry per size.
    pub fn ico_bytes(sizes: &[(u32, u32)]) -> Vec<u8> {
        let images: Vec<Vec<u8>> = sizes.iter().map(|(w, h)| png_bytes(*w, *h)).collect();

        let mut out = vec![0, 0, 1, 0];
        out.extend_from_slice(&(sizes.len() as u16).to_le_bytes());

        let mut offset = 6 + 16 * sizes.len();
        for ((width, height), image) in sizes.iter().zip(&images) {
            // A zero byte means 256.
            out.push(if *width >= 256 { 0 } else { *width as u8 });
            out.push(if *height >= 256 { 0 } else { *height as u8 });
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&32u16.to_le_bytes());
            out.extend_from_slice(&(image.len() as u32).to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += image.len();
        }
        for image in images {
            out.extend_from_slice(&image);
        }
        out
    }

    fn encode_png(image: RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encoding a PNG into memory cannot fail");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures;
    use crate::format::ids::{ICO, PNG, WAV};
    use crate::format::Detector;

    #[test]
    fn test_fixtures_are_detected() {
        let detector = Detector::standard();
        assert_eq!(detector.detect(&fixtures::png_bytes(3, 3), None, None).format, Some(PNG));
        assert_eq!(
            detector.detect(&fixtures::ico_bytes(&[(16, 16)]), None, None).format,
            Some(ICO)
        );
        assert_eq!(
            detector.detect(&fixtures::wav_bytes(8000, 1, 0.1), None, None).format,
            Some(WAV)
        );
    }

    #[test]
    fn test_wav_length() {
        let wav = fixtures::wav_bytes(8000, 2, 0.25);
        assert_eq!(wav.len(), 44 + 2000 * 2 * 2);
    }

    #[test]
    fn test_ico_decodes() {
        let ico = fixtures::ico_bytes(&[(16, 16), (256, 256)]);
        let image = image::load_from_memory_with_format(&ico, image::ImageFormat::Ico).unwrap();
        assert_eq!(image.width(), 256);
    }
}
