//! Error types for the transcode module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while converting a single file.
#[derive(Debug, Error)]
pub enum TranscodeError {
    /// No signature, MIME type or extension matched.
    #[error("Unrecognized format: {file_name}")]
    UnrecognizedFormat { file_name: String },

    /// The source bytes could not be obtained.
    #[error("Failed to read {source_name}: {reason}")]
    ReadFailure { source_name: String, reason: String },

    /// The bytes matched a format but the codec rejected them.
    #[error("Failed to decode {format}: {reason}")]
    DecodeFailure { format: String, reason: String },

    /// The target has no usable encoder and no fallback.
    #[error("Failed to encode {format}: {reason}")]
    EncodeFailure { format: String, reason: String },

    /// The batch was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,

    /// Real-time capture did not finish within its bound.
    #[error("Capture did not finish within {limit_ms} ms")]
    SafetyTimeout { limit_ms: u64 },

    /// The isolated worker stopped without a terminal message.
    #[error("Worker lost: {reason}")]
    WorkerLost { reason: String },
}

impl TranscodeError {
    pub fn read_failure(source_name: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::ReadFailure {
            source_name: source_name.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn decode_failure(format: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::DecodeFailure {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn encode_failure(format: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::EncodeFailure {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn worker_lost(reason: impl Into<String>) -> Self {
        Self::WorkerLost {
            reason: reason.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UnrecognizedFormat { .. } => FailureKind::UnrecognizedFormat,
            Self::ReadFailure { .. } => FailureKind::ReadFailure,
            Self::DecodeFailure { .. } => FailureKind::DecodeFailure,
            Self::EncodeFailure { .. } => FailureKind::EncodeFailure,
            Self::Cancelled => FailureKind::Cancelled,
            Self::SafetyTimeout { .. } => FailureKind::SafetyTimeout,
            Self::WorkerLost { .. } => FailureKind::WorkerLost,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Serializable failure category attached to failed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnrecognizedFormat,
    ReadFailure,
    DecodeFailure,
    EncodeFailure,
    Cancelled,
    SafetyTimeout,
    WorkerLost,
}

impl FailureKind {
    /// Whether failures of this kind should be shown to the user.
    ///
    /// Cancellation is an expected, user-initiated outcome.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnrecognizedFormat => "unrecognized_format",
            Self::ReadFailure => "read_failure",
            Self::DecodeFailure => "decode_failure",
            Self::EncodeFailure => "encode_failure",
            Self::Cancelled => "cancelled",
            Self::SafetyTimeout => "safety_timeout",
            Self::WorkerLost => "worker_lost",
        };
        f.write_str(s)
    }
}

/// A failure as recorded on a task and carried across the worker boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        TranscodeError::Cancelled.into()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == FailureKind::Cancelled
    }

    pub fn is_user_facing(&self) -> bool {
        self.kind.is_user_facing()
    }
}

impl From<TranscodeError> for TaskFailure {
    fn from(err: TranscodeError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_from_error() {
        let failure = TaskFailure::from(TranscodeError::worker_lost("panicked"));
        assert_eq!(failure.kind, FailureKind::WorkerLost);
        assert_eq!(failure.message, "Worker lost: panicked");
        assert!(failure.is_user_facing());
        assert!(TaskFailure::cancelled().is_cancelled());
        assert!(!TaskFailure::cancelled().is_user_facing());
    }

    #[test]
    fn test_error_display() {
        let err = TranscodeError::decode_failure("png", "bad crc");
        assert_eq!(err.to_string(), "Failed to decode png: bad crc");

        let err = TranscodeError::SafetyTimeout { limit_ms: 15000 };
        assert_eq!(err.to_string(), "Capture did not finish within 15000 ms");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(TranscodeError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            TranscodeError::encode_failure("ico", "too large").kind(),
            FailureKind::EncodeFailure
        );
        assert!(TranscodeError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_not_user_facing() {
        assert!(!FailureKind::Cancelled.is_user_facing());
        assert!(FailureKind::DecodeFailure.is_user_facing());
        assert!(FailureKind::SafetyTimeout.is_user_facing());
    }
}
