//! Audio transcoder: decode once, then bitstream-encode or capture.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::format::{FormatId, FormatRegistry, MediaFamily};
use crate::transcode::capabilities::EncoderCapabilities;
use crate::transcode::config::AudioConfig;
use crate::transcode::error::TranscodeError;
use crate::transcode::ffmpeg::{FfmpegCaptureBackend, FfmpegDecoder};
use crate::transcode::protocol::TranscodeJob;
use crate::transcode::quality;
use crate::transcode::traits::Transcoder;
use crate::transcode::types::{EncodedOutput, Payload, TranscodeOutput};
use crate::transcode::worker::ProgressReporter;

use super::bitstream::{run_bitstream, BuiltinFrameEncoders, FrameEncoderFactory};
use super::capture::{run_capture, CaptureBackend};
use super::decode::{DecoderChain, SymphoniaDecoder};
use super::fallback::{negotiate, EncodePlan};

/// Transcoder for the audio family.
pub struct AudioTranscoder {
    config: AudioConfig,
    registry: &'static FormatRegistry,
    decoders: DecoderChain,
    frame_encoders: Arc<dyn FrameEncoderFactory>,
    capture: Arc<dyn CaptureBackend>,
}

impl AudioTranscoder {
    pub fn new(
        config: AudioConfig,
        decoders: DecoderChain,
        frame_encoders: Arc<dyn FrameEncoderFactory>,
        capture: Arc<dyn CaptureBackend>,
    ) -> Self {
        Self {
            config,
            registry: FormatRegistry::standard(),
            decoders,
            frame_encoders,
            capture,
        }
    }

    /// Builds the standard stack: symphonia then ffmpeg for decoding, WAV
    /// in-process, everything else through the detected ffmpeg encoders.
    pub fn from_capabilities(config: AudioConfig, capabilities: EncoderCapabilities) -> Self {
        let ffmpeg_path = config.ffmpeg_path.clone();
        let decoders = DecoderChain::new(vec![
            Arc::new(SymphoniaDecoder),
            Arc::new(FfmpegDecoder::new(ffmpeg_path.clone(), capabilities.ffmpeg)),
        ]);
        let frame_encoders = Arc::new(BuiltinFrameEncoders::new(
            ffmpeg_path.clone(),
            capabilities.clone(),
        ));
        let capture = Arc::new(FfmpegCaptureBackend::new(ffmpeg_path, capabilities));
        Self::new(config, decoders, frame_encoders, capture)
    }

    /// Probes ffmpeg and builds the standard stack.
    pub async fn detect(config: AudioConfig) -> Self {
        let capabilities = EncoderCapabilities::detect(&config.ffmpeg_path).await;
        info!(?capabilities, "Audio encoders detected");
        Self::from_capabilities(config, capabilities)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

#[async_trait]
impl Transcoder for AudioTranscoder {
    fn name(&self) -> &str {
        "audio"
    }

    fn family(&self) -> MediaFamily {
        MediaFamily::Audio
    }

    async fn prepare(&self, source: Bytes, source_format: FormatId) -> Result<Payload, TranscodeError> {
        let audio = self.decoders.decode(source, source_format).await?;
        Ok(Payload::Pcm(audio))
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<TranscodeOutput, TranscodeError> {
        let audio = match job.payload {
            Payload::Pcm(audio) => audio,
            Payload::Encoded(bytes) => self.decoders.decode(bytes, job.source_format).await?,
        };
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }

        let bitrate = job
            .options
            .bitrate_kbps
            .unwrap_or(self.config.default_bitrate_kbps);
        if bitrate == 0 {
            return Err(TranscodeError::encode_failure(
                job.target_format,
                "bitrate must be positive",
            ));
        }

        let negotiation = negotiate(
            self.registry,
            job.target_format,
            self.frame_encoders.as_ref(),
            self.capture.as_ref(),
        )?;
        let format = negotiation.plan.format();
        debug!(
            source = %job.source_format,
            target = %format,
            plan = ?negotiation.plan,
            frames = audio.frames(),
            "Encoding audio"
        );

        let bytes = match negotiation.plan {
            EncodePlan::Bitstream { format } => {
                let mut encoder = self.frame_encoders.open(format, audio.spec(), bitrate).await?;
                run_bitstream(
                    encoder.as_mut(),
                    &audio,
                    self.config.frame_size,
                    progress,
                    cancel,
                )
                .await?
            }
            EncodePlan::Capture { mime, .. } => {
                let mut session = self.capture.open(mime, audio.spec(), bitrate).await?;
                run_capture(session.as_mut(), &audio, &self.config, progress, cancel).await?
            }
        };

        let mut advisories = Vec::new();
        advisories.extend(quality::assess(self.registry, job.source_format, format));
        advisories.extend(negotiation.substitution);

        Ok(TranscodeOutput {
            format,
            outputs: vec![EncodedOutput::new(bytes)],
            advisories,
        })
    }
}
