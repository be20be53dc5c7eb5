//! Messages exchanged with an isolated transcode worker.
//!
//! A worker receives exactly one [`WorkerRequest`] and answers with zero or
//! more [`WorkerResponse::Progress`] messages followed by exactly one
//! terminal response.

use crate::format::FormatId;

use super::error::{FailureKind, TaskFailure};
use super::types::{ConversionOptions, Payload, TranscodeOutput};

/// Request sent from the control task to a worker.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Convert {
        payload: Payload,
        source_format: FormatId,
        target_format: FormatId,
        options: ConversionOptions,
    },
}

/// Response sent from a worker to the control task.
#[derive(Debug, Clone)]
pub enum WorkerResponse {
    Progress { percent: u8 },
    Success { output: TranscodeOutput },
    Error { kind: FailureKind, message: String },
}

impl WorkerResponse {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

impl From<TaskFailure> for WorkerResponse {
    fn from(failure: TaskFailure) -> Self {
        Self::Error {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

/// Unpacked [`WorkerRequest::Convert`], as handed to a transcoder.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub payload: Payload,
    pub source_format: FormatId,
    pub target_format: FormatId,
    pub options: ConversionOptions,
}

impl From<WorkerRequest> for TranscodeJob {
    fn from(request: WorkerRequest) -> Self {
        match request {
            WorkerRequest::Convert {
                payload,
                source_format,
                target_format,
                options,
            } => Self {
                payload,
                source_format,
                target_format,
                options,
            },
        }
    }
}
