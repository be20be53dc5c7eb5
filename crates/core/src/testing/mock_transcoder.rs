//! Mock transcoder for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cancel::CancelToken;
use crate::format::{FormatId, MediaFamily};
use crate::transcode::{
    ConversionOptions, EncodedOutput, Payload, ProgressReporter, TranscodeError, TranscodeJob,
    TranscodeOutput, Transcoder,
};

/// What the mock does with a job.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Reports 50% and returns the source bytes as the output.
    Succeed,
    /// Returns a decode failure.
    Fail,
    /// Never finishes; only cancellation ends the job.
    Hang,
    /// Panics inside the worker.
    Panic,
}

/// A recorded transcode call.
#[derive(Debug, Clone)]
pub struct RecordedJob {
    pub source_format: FormatId,
    pub target_format: FormatId,
    pub options: ConversionOptions,
}

/// Mock implementation of [`Transcoder`].
///
/// Behavior is chosen per source: the first rule whose bytes equal the
/// job's source wins, otherwise the default applies.
///
/// # Example
///
/// ```rust,ignore
/// let transcoder = MockTranscoder::image().with_rule(png.clone(), MockBehavior::Fail);
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    family: MediaFamily,
    default: MockBehavior,
    rules: Vec<(Bytes, MockBehavior)>,
    calls: Arc<RwLock<Vec<RecordedJob>>>,
}

impl MockTranscoder {
    pub fn new(family: MediaFamily) -> Self {
        Self {
            family,
            default: MockBehavior::Succeed,
            rules: Vec::new(),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn image() -> Self {
        Self::new(MediaFamily::Image)
    }

    pub fn audio() -> Self {
        Self::new(MediaFamily::Audio)
    }

    /// Sets the behavior for sources without a matching rule.
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default = behavior;
        self
    }

    /// Uses `behavior` for jobs whose source equals `source`.
    pub fn with_rule(mut self, source: impl Into<Bytes>, behavior: MockBehavior) -> Self {
        self.rules.push((source.into(), behavior));
        self
    }

    /// Jobs that reached the transcode step, in order.
    pub async fn calls(&self) -> Vec<RecordedJob> {
        self.calls.read().await.clone()
    }

    fn behavior_for(&self, source: &[u8]) -> MockBehavior {
        self.rules
            .iter()
            .find(|(bytes, _)| bytes.as_ref() == source)
            .map(|(_, behavior)| behavior.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    fn family(&self) -> MediaFamily {
        self.family
    }

    async fn prepare(&self, source: Bytes, _source_format: FormatId) -> Result<Payload, TranscodeError> {
        Ok(Payload::Encoded(source))
    }

    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<TranscodeOutput, TranscodeError> {
        let source = match job.payload {
            Payload::Encoded(bytes) => bytes,
            Payload::Pcm(_) => Bytes::new(),
        };
        self.calls.write().await.push(RecordedJob {
            source_format: job.source_format,
            target_format: job.target_format,
            options: job.options,
        });

        match self.behavior_for(&source) {
            MockBehavior::Succeed => {
                progress.report(50);
                Ok(TranscodeOutput::single(
                    job.target_format,
                    EncodedOutput::new(source),
                ))
            }
            MockBehavior::Fail => Err(TranscodeError::decode_failure(
                job.source_format,
                "mock failure",
            )),
            MockBehavior::Hang => {
                cancel.cancelled().await;
                Err(TranscodeError::Cancelled)
            }
            MockBehavior::Panic => panic!("mock transcoder panic"),
        }
    }
}
