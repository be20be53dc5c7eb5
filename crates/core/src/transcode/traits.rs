//! Trait definitions for the transcode module.

use async_trait::async_trait;
use bytes::Bytes;

use crate::cancel::CancelToken;
use crate::format::{FormatId, MediaFamily};

use super::error::TranscodeError;
use super::protocol::TranscodeJob;
use super::types::{Payload, TranscodeOutput};
use super::worker::ProgressReporter;

/// A codec driver for one media family.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// The media family this transcoder handles.
    fn family(&self) -> MediaFamily;

    /// Turns source bytes into the payload shipped to a worker.
    ///
    /// Runs on the control side before the worker starts. Audio decodes to
    /// PCM here; images pass the bytes through untouched.
    async fn prepare(&self, source: Bytes, source_format: FormatId)
        -> Result<Payload, TranscodeError>;

    /// Encodes a prepared payload to the job's target format.
    ///
    /// Runs inside the worker. Implementations check `cancel` at their own
    /// suspension points and report progress in percent.
    async fn transcode(
        &self,
        job: TranscodeJob,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<TranscodeOutput, TranscodeError>;
}
