//! Types for the conversion orchestrator.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::format::{Detection, FormatId};
use crate::naming::Dimensions;
use crate::transcode::{Advisory, TaskFailure, TranscodeError};

/// Errors from misusing a session or the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A batch was started before a target was selected.
    #[error("no target format selected")]
    NoTargetSelected,

    /// Task not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Invalid task state for operation.
    #[error("invalid task state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The target is not reachable from every file in the session.
    #[error("cannot convert to {target}: {reason}")]
    TargetNotAllowed { target: FormatId, reason: String },

    /// Ingestion failed before a task could be created.
    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}

impl OrchestratorError {
    pub(crate) fn invalid_state(expected: &str, actual: &TaskState) -> Self {
        Self::InvalidState {
            expected: expected.to_string(),
            actual: actual.state_type().to_string(),
        }
    }
}

/// A finished output of a task.
#[derive(Debug, Clone, Serialize)]
pub struct ResultArtifact {
    #[serde(skip)]
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
    pub format: FormatId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
}

impl ResultArtifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Lifecycle state of a file task.
///
/// Results and failures live inside the variant that owns them, so a task
/// cannot carry artifacts unless it is completed.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Processing {
        started_at: DateTime<Utc>,
    },
    Completed {
        artifacts: Vec<ResultArtifact>,
        completed_at: DateTime<Utc>,
    },
    Error {
        failure: TaskFailure,
        failed_at: DateTime<Utc>,
    },
}

impl TaskState {
    /// Returns the state type as a string for logging and events.
    pub fn state_type(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Processing { .. } => "processing",
            TaskState::Completed { .. } => "completed",
            TaskState::Error { .. } => "error",
        }
    }

    /// Whether a conversion pass may pick this task up.
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Error { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskState::Completed { .. })
    }

    pub fn artifacts(&self) -> &[ResultArtifact] {
        match self {
            TaskState::Completed { artifacts, .. } => artifacts,
            _ => &[],
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskState::Error { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// A source replaced by "convert again".
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRecord {
    pub previous_format: Option<FormatId>,
    pub previous_filename: String,
    /// Hex SHA-256 of the replaced source bytes.
    pub sha256: String,
    pub replaced_at: DateTime<Utc>,
}

/// One file in a conversion session.
#[derive(Debug, Clone, Serialize)]
pub struct FileTask {
    pub id: String,
    pub file_name: String,
    #[serde(skip)]
    pub source: Bytes,
    pub reported_mime: Option<String>,
    pub detection: Detection,
    pub state: TaskState,
    pub progress: u8,
    pub advisories: Vec<Advisory>,
    pub history: Vec<GenerationRecord>,
    pub created_at: DateTime<Utc>,
}

impl FileTask {
    pub fn new(
        file_name: impl Into<String>,
        source: Bytes,
        reported_mime: Option<String>,
        detection: Detection,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file_name.into(),
            source,
            reported_mime,
            detection,
            state: TaskState::Queued,
            progress: 0,
            advisories: Vec::new(),
            history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Detected source format, if any.
    pub fn format(&self) -> Option<FormatId> {
        self.detection.format
    }

    /// Progress this task adds to the batch mean.
    pub fn contributed_progress(&self) -> u8 {
        if self.state.is_completed() {
            100
        } else {
            self.progress
        }
    }
}

/// Observer notifications emitted while a batch runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    BatchStarted {
        target: FormatId,
        tasks: usize,
    },
    TaskStateChanged {
        task_id: String,
        state: &'static str,
    },
    TaskProgress {
        task_id: String,
        progress: u8,
        aggregate: u8,
    },
    BatchFinished {
        report: BatchReport,
    },
}

/// Outcome counts of one conversion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Tasks that finished successfully in this pass.
    pub completed: usize,
    /// Tasks that failed for a user-facing reason.
    pub failed: usize,
    pub cancelled: usize,
    /// Tasks already completed before the pass started.
    pub skipped: usize,
}

impl BatchReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}
