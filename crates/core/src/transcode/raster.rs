//! Raster image transcoder backed by the `image` crate.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::format::ids::{BMP, GIF, ICO, JPEG, PNG, TIFF, WEBP};
use crate::format::{FormatId, MediaFamily};
use crate::naming::{Dimensions, NameSuffix};

use super::config::ImageConfig;
use super::error::TranscodeError;
use super::protocol::TranscodeJob;
use super::traits::Transcoder;
use super::types::{ConversionOptions, EncodedOutput, Payload, TranscodeOutput};
use super::worker::ProgressReporter;

/// Largest edge an ICO image may have.
pub const MAX_ICON_EDGE: u32 = 256;

const ICONDIR_LEN: usize = 6;
const ICONDIRENTRY_LEN: usize = 16;

/// Decodes, optionally resizes and re-encodes raster images.
pub struct ImageTranscoder {
    config: ImageConfig,
}

impl ImageTranscoder {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ImageConfig::default())
    }
}

#[async_trait]
impl Transcoder for ImageTranscoder {
    fn name(&self) -> &str {
        "image"
    }

    fn family(&self) -> MediaFamily {
        MediaFamily::Image
    }

    async fn prepare(
        &self,
        source: Bytes,
        _source_format: FormatId,
    ) -> Result<Payload, TranscodeError> {
        Ok(Payload::Encoded(source))
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<TranscodeOutput, TranscodeError> {
        let bytes = match job.payload {
            Payload::Encoded(bytes) => bytes,
            Payload::Pcm(_) => {
                return Err(TranscodeError::decode_failure(
                    job.source_format,
                    "expected encoded image bytes",
                ))
            }
        };
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        progress.report(10);

        let config = self.config.clone();
        let (source, target, options) = (job.source_format, job.target_format, job.options);
        let outputs = tokio::task::spawn_blocking(move || {
            convert_image(&config, &bytes, source, target, &options)
        })
        .await
        .map_err(|e| TranscodeError::worker_lost(e.to_string()))??;

        progress.report(100);
        Ok(TranscodeOutput {
            format: target,
            outputs,
            advisories: Vec::new(),
        })
    }
}

/// Maps a registry id to the codec's format enum.
pub fn image_format(id: FormatId) -> Option<ImageFormat> {
    match id {
        PNG => Some(ImageFormat::Png),
        JPEG => Some(ImageFormat::Jpeg),
        GIF => Some(ImageFormat::Gif),
        WEBP => Some(ImageFormat::WebP),
        BMP => Some(ImageFormat::Bmp),
        TIFF => Some(ImageFormat::Tiff),
        ICO => Some(ImageFormat::Ico),
        _ => None,
    }
}

/// Converts one source image into one or more encoded outputs.
pub fn convert_image(
    config: &ImageConfig,
    bytes: &[u8],
    source: FormatId,
    target: FormatId,
    options: &ConversionOptions,
) -> Result<Vec<EncodedOutput>, TranscodeError> {
    let source_format = image_format(source)
        .ok_or_else(|| TranscodeError::decode_failure(source, "not an image format"))?;
    let target_format = image_format(target)
        .filter(ImageFormat::writing_enabled)
        .ok_or_else(|| TranscodeError::encode_failure(target, "no encoder available"))?;

    // Only the JPEG encoder is lossy; the others ignore quality.
    let quality = options.quality.unwrap_or(config.default_quality);
    if target_format == ImageFormat::Jpeg && !(quality > 0.0 && quality <= 1.0) {
        return Err(TranscodeError::encode_failure(
            target,
            format!("quality {} is outside (0, 1]", quality),
        ));
    }

    let icon_entries = if source == ICO {
        split_icon(bytes).filter(|entries| entries.len() > 1)
    } else {
        None
    };

    let mut outputs = Vec::new();
    match icon_entries {
        Some(entries) => {
            debug!(count = entries.len(), "Extracting icon entries");
            for (i, entry) in entries.iter().enumerate() {
                let image = decode(entry, source_format, source)?;
                let (bytes, dims) =
                    render(config, &image, target, target_format, options.dimensions, quality)?;
                outputs.push(EncodedOutput {
                    bytes,
                    suffix: Some(NameSuffix::Index(i + 1)),
                    dimensions: Some(dims),
                });
            }
        }
        None => {
            let image = decode(bytes, source_format, source)?;
            if options.sizes.is_empty() {
                let (bytes, dims) =
                    render(config, &image, target, target_format, options.dimensions, quality)?;
                outputs.push(EncodedOutput {
                    bytes,
                    suffix: None,
                    dimensions: Some(dims),
                });
            } else {
                for size in &options.sizes {
                    let (bytes, dims) =
                        render(config, &image, target, target_format, Some(*size), quality)?;
                    outputs.push(EncodedOutput {
                        bytes,
                        suffix: Some(NameSuffix::Dimensions(dims)),
                        dimensions: Some(dims),
                    });
                }
            }
        }
    }

    Ok(outputs)
}

fn decode(bytes: &[u8], format: ImageFormat, id: FormatId) -> Result<DynamicImage, TranscodeError> {
    image::load_from_memory_with_format(bytes, format)
        .map_err(|e| TranscodeError::decode_failure(id, e))
}

fn render(
    config: &ImageConfig,
    image: &DynamicImage,
    target: FormatId,
    target_format: ImageFormat,
    size: Option<Dimensions>,
    quality: f32,
) -> Result<(Bytes, Dimensions), TranscodeError> {
    let filter = config.resize_filter.filter_type();
    let (width, height) = image.dimensions();

    let resized;
    let image = match size {
        Some(d) if d.width == 0 || d.height == 0 => {
            return Err(TranscodeError::encode_failure(
                target,
                format!("invalid dimensions {}", d),
            ))
        }
        Some(d) if target == ICO && (d.width > MAX_ICON_EDGE || d.height > MAX_ICON_EDGE) => {
            return Err(TranscodeError::encode_failure(
                target,
                format!("{} exceeds the {}x{} icon limit", d, MAX_ICON_EDGE, MAX_ICON_EDGE),
            ))
        }
        Some(d) if (d.width, d.height) != (width, height) => {
            resized = image.resize_exact(d.width, d.height, filter);
            &resized
        }
        None if target == ICO && (width > MAX_ICON_EDGE || height > MAX_ICON_EDGE) => {
            resized = image.resize(MAX_ICON_EDGE, MAX_ICON_EDGE, filter);
            &resized
        }
        _ => image,
    };

    let (out_width, out_height) = image.dimensions();
    let bytes = encode(image, target, target_format, quality)?;
    Ok((Bytes::from(bytes), Dimensions::new(out_width, out_height)))
}

fn encode(
    image: &DynamicImage,
    target: FormatId,
    format: ImageFormat,
    quality: f32,
) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::new();
    if format == ImageFormat::Jpeg {
        let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|e| TranscodeError::encode_failure(target, e))?;
    } else {
        DynamicImage::ImageRgba8(image.to_rgba8())
            .write_to(&mut Cursor::new(&mut buf), format)
            .map_err(|e| TranscodeError::encode_failure(target, e))?;
    }
    Ok(buf)
}

/// Splits an ICO container into standalone single-image ICO files.
///
/// Returns `None` when the directory is malformed or points outside the
/// buffer.
pub fn split_icon(bytes: &[u8]) -> Option<Vec<Vec<u8>>> {
    let header = bytes.get(..ICONDIR_LEN)?;
    if header[0..4] != [0, 0, 1, 0] {
        return None;
    }
    let count = u16::from_le_bytes([header[4], header[5]]) as usize;

    (0..count)
        .map(|i| {
            let start = ICONDIR_LEN + i * ICONDIRENTRY_LEN;
            let entry = bytes.get(start..start + ICONDIRENTRY_LEN)?;
            let size = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]) as usize;
            let offset = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]) as usize;
            let data = bytes.get(offset..offset.checked_add(size)?)?;

            let mut icon = Vec::with_capacity(ICONDIR_LEN + ICONDIRENTRY_LEN + size);
            icon.extend_from_slice(&[0, 0, 1, 0, 1, 0]);
            icon.extend_from_slice(&entry[..12]);
            icon.extend_from_slice(&((ICONDIR_LEN + ICONDIRENTRY_LEN) as u32).to_le_bytes());
            icon.extend_from_slice(data);
            Some(icon)
        })
        .collect()
}
