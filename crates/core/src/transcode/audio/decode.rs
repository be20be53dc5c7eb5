//! PCM extraction.

use async_trait::async_trait;
use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::format::ids::OPUS;
use crate::format::{FormatId, FormatRegistry, MediaFamily};
use crate::transcode::error::TranscodeError;
use crate::transcode::types::DecodedAudio;

/// Something that turns encoded audio into PCM.
#[async_trait]
pub trait PcmDecoder: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this decoder should be tried for `format`.
    fn can_decode(&self, format: FormatId) -> bool;

    async fn decode(&self, source: Bytes, format: FormatId) -> Result<DecodedAudio, TranscodeError>;
}

/// In-process decoder built on symphonia.
#[derive(Debug, Default)]
pub struct SymphoniaDecoder;

#[async_trait]
impl PcmDecoder for SymphoniaDecoder {
    fn name(&self) -> &str {
        "symphonia"
    }

    fn can_decode(&self, format: FormatId) -> bool {
        // symphonia has no Opus codec.
        format != OPUS
            && FormatRegistry::standard()
                .get(format)
                .is_some_and(|d| d.family() == MediaFamily::Audio)
    }

    async fn decode(&self, source: Bytes, format: FormatId) -> Result<DecodedAudio, TranscodeError> {
        let extension = FormatRegistry::standard()
            .get(format)
            .map(|d| d.extension());
        tokio::task::spawn_blocking(move || decode_with_symphonia(source, extension))
            .await
            .map_err(|e| TranscodeError::worker_lost(e.to_string()))?
            .map_err(|e| TranscodeError::decode_failure(format, e))
    }
}

/// Decodes a complete in-memory file with symphonia's probe and codec
/// registries.
pub fn decode_with_symphonia(
    source: Bytes,
    extension: Option<&str>,
) -> Result<DecodedAudio, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(source)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| e.to_string())?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_string())?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| e.to_string())?;

    let mut channels: Vec<Vec<f32>> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.to_string()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let count = spec.channels.count();
                if channels.is_empty() {
                    channels = vec![Vec::new(); count];
                }
                sample_rate = Some(spec.rate);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                for frame in buf.samples().chunks_exact(count) {
                    for (channel, sample) in channels.iter_mut().zip(frame) {
                        channel.push(*sample);
                    }
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.to_string()),
        }
    }

    match sample_rate {
        Some(rate) if !channels.is_empty() => Ok(DecodedAudio::new(rate, channels)),
        _ => Err("no audio decoded".to_string()),
    }
}

/// Ordered list of decoders tried until one succeeds.
#[derive(Clone, Default)]
pub struct DecoderChain {
    decoders: Vec<Arc<dyn PcmDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Arc<dyn PcmDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn push(&mut self, decoder: Arc<dyn PcmDecoder>) {
        self.decoders.push(decoder);
    }

    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Decodes with the first decoder that accepts `format` and succeeds.
    pub async fn decode(
        &self,
        source: Bytes,
        format: FormatId,
    ) -> Result<DecodedAudio, TranscodeError> {
        let mut last_error = None;
        for decoder in self.decoders.iter().filter(|d| d.can_decode(format)) {
            match decoder.decode(source.clone(), format).await {
                Ok(audio) => {
                    debug!(
                        decoder = decoder.name(),
                        format = %format,
                        frames = audio.frames(),
                        channels = audio.channel_count(),
                        "Decoded audio"
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    debug!(decoder = decoder.name(), error = %e, "Decoder failed, trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| TranscodeError::decode_failure(format, "no decoder available")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids::{FLAC, MP3, PNG, WAV};
    use crate::testing::fixtures;

    #[tokio::test]
    async fn test_symphonia_decodes_wav() {
        let wav = fixtures::wav_bytes(8000, 2, 0.5);
        let audio = SymphoniaDecoder.decode(Bytes::from(wav), WAV).await.unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channel_count(), 2);
        assert_eq!(audio.frames(), 4000);
    }

    #[tokio::test]
    async fn test_garbage_is_decode_failure() {
        let err = SymphoniaDecoder
            .decode(Bytes::from_static(b"RIFF\0\0\0\0WAVEjunk"), WAV)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::DecodeFailure { .. }));
    }

    #[test]
    fn test_symphonia_scope() {
        assert!(SymphoniaDecoder.can_decode(WAV));
        assert!(SymphoniaDecoder.can_decode(MP3));
        assert!(!SymphoniaDecoder.can_decode(OPUS));
        assert!(!SymphoniaDecoder.can_decode(PNG));
    }

    struct Failing;

    #[async_trait]
    impl PcmDecoder for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn can_decode(&self, _format: FormatId) -> bool {
            true
        }

        async fn decode(
            &self,
            _source: Bytes,
            format: FormatId,
        ) -> Result<DecodedAudio, TranscodeError> {
            Err(TranscodeError::decode_failure(format, "unsupported codec"))
        }
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_decoder() {
        let chain = DecoderChain::new(vec![Arc::new(Failing), Arc::new(SymphoniaDecoder)]);
        assert_eq!(chain.names(), vec!["failing", "symphonia"]);
        let wav = fixtures::wav_bytes(8000, 1, 0.1);
        let audio = chain.decode(Bytes::from(wav), WAV).await.unwrap();
        assert_eq!(audio.frames(), 800);
    }

    #[tokio::test]
    async fn test_chain_reports_last_error() {
        let chain = DecoderChain::new(vec![Arc::new(Failing)]);
        let err = chain.decode(Bytes::new(), FLAC).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to decode flac: unsupported codec");

        let empty = DecoderChain::default();
        let err = empty.decode(Bytes::new(), FLAC).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to decode flac: no decoder available");
    }
}
