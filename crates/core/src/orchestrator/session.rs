//! Conversion session: the batch of file tasks and its named transitions.

use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::format::{
    compatibility_message, find_common_targets, incompatibility_message, Detector, FormatId,
    FormatRegistry,
};
use crate::naming::UsedNames;
use crate::transcode::{Advisory, ConversionOptions, TaskFailure, TranscodeError};

use super::types::{FileTask, GenerationRecord, OrchestratorError, ResultArtifact, TaskState};

/// A batch of files converted to one common target.
///
/// The session is owned by the caller. Tasks change state only through the
/// methods below, which reject transitions the lifecycle does not allow.
pub struct ConversionSession {
    registry: &'static FormatRegistry,
    tasks: Vec<FileTask>,
    target: Option<FormatId>,
    options: ConversionOptions,
    cancel: CancelToken,
    used_names: Arc<UsedNames>,
}

impl Default for ConversionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionSession {
    pub fn new() -> Self {
        Self::with_registry(FormatRegistry::standard())
    }

    pub fn with_registry(registry: &'static FormatRegistry) -> Self {
        Self {
            registry,
            tasks: Vec::new(),
            target: None,
            options: ConversionOptions::default(),
            cancel: CancelToken::new(),
            used_names: Arc::new(UsedNames::new()),
        }
    }

    pub fn registry(&self) -> &'static FormatRegistry {
        self.registry
    }

    /// Ingests a file and returns its task id.
    ///
    /// Detection runs once, here. If a target is selected and the new file
    /// cannot reach it, the selection is cleared.
    pub fn add_file(
        &mut self,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
        reported_mime: Option<&str>,
    ) -> String {
        let file_name = file_name.into();
        let bytes = bytes.into();
        let detection =
            Detector::new(self.registry).detect(&bytes, reported_mime, Some(file_name.as_str()));
        debug!(
            file_name = %file_name,
            format = ?detection.format,
            confidence = ?detection.confidence,
            "File added"
        );

        let task = FileTask::new(file_name, bytes, reported_mime.map(String::from), detection);
        let id = task.id.clone();

        if let Some(target) = self.target {
            let reachable = detection
                .format
                .map(|f| crate::format::targets_of(self.registry, f).contains(&target))
                .unwrap_or(false);
            if !reachable {
                info!(target = %target, "Selected target no longer reachable, clearing");
                self.target = None;
            }
        }

        self.tasks.push(task);
        id
    }

    /// Reads a file from disk and ingests it.
    pub async fn add_path(&mut self, path: &Path) -> Result<String, OrchestratorError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TranscodeError::read_failure(path.display(), e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(self.add_file(file_name, bytes, None))
    }

    /// Removes a task. Tasks that are mid-conversion cannot be removed.
    pub fn remove(&mut self, id: &str) -> Result<FileTask, OrchestratorError> {
        let index = self.index_of(id)?;
        if let TaskState::Processing { .. } = self.tasks[index].state {
            return Err(OrchestratorError::invalid_state(
                "not processing",
                &self.tasks[index].state,
            ));
        }
        let task = self.tasks.remove(index);
        debug!(task_id = %id, "Task removed");
        Ok(task)
    }

    pub fn tasks(&self) -> &[FileTask] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&FileTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Detected formats in task order. Undetected tasks are skipped.
    pub fn source_formats(&self) -> Vec<FormatId> {
        self.tasks.iter().filter_map(|t| t.format()).collect()
    }

    fn all_detected(&self) -> bool {
        self.tasks.iter().all(|t| t.detection.is_known())
    }

    /// Targets every task can reach. Empty while any task is undetected.
    pub fn common_targets(&self) -> Vec<FormatId> {
        if !self.all_detected() {
            return Vec::new();
        }
        find_common_targets(self.registry, &self.source_formats())
    }

    pub fn compatibility_message(&self) -> String {
        let unknown = self.tasks.iter().filter(|t| !t.detection.is_known()).count();
        if unknown > 0 {
            return format!("{} file(s) have an unrecognized format", unknown);
        }
        compatibility_message(self.registry, &self.source_formats())
    }

    /// Selects the batch target. Only members of [`Self::common_targets`]
    /// are accepted.
    pub fn select_target(&mut self, target: FormatId) -> Result<(), OrchestratorError> {
        let not_allowed = |reason: String| OrchestratorError::TargetNotAllowed { target, reason };

        if self.tasks.is_empty() {
            return Err(not_allowed("no files in session".to_string()));
        }
        if !self.all_detected() {
            return Err(not_allowed(self.compatibility_message()));
        }
        if !self.common_targets().contains(&target) {
            let reason = incompatibility_message(self.registry, &self.source_formats(), target)
                .unwrap_or_else(|| "not a known target".to_string());
            return Err(not_allowed(reason));
        }

        info!(target = %target, "Target selected");
        self.target = Some(target);
        Ok(())
    }

    pub fn clear_target(&mut self) {
        self.target = None;
    }

    pub fn target(&self) -> Option<FormatId> {
        self.target
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ConversionOptions) {
        self.options = options;
    }

    /// Token shared by every task of the current pass.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels the running pass.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn used_names(&self) -> Arc<UsedNames> {
        Arc::clone(&self.used_names)
    }

    /// Readies the session for a new pass: a cancelled token is replaced and
    /// the name set is reseeded from artifacts that survive into this pass.
    pub(crate) fn prepare_run(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancelToken::new();
        }
        let kept = self
            .tasks
            .iter()
            .flat_map(|t| t.state.artifacts())
            .map(|a| a.filename.clone());
        self.used_names = Arc::new(UsedNames::with_names(kept));
    }

    /// Queued or Error to Processing.
    pub fn begin(&mut self, id: &str) -> Result<(), OrchestratorError> {
        let task = self.task_mut(id)?;
        if !task.state.is_runnable() {
            return Err(OrchestratorError::invalid_state("queued or error", &task.state));
        }
        task.state = TaskState::Processing {
            started_at: Utc::now(),
        };
        task.progress = 0;
        task.advisories.clear();
        Ok(())
    }

    /// Raises a processing task's progress. Lower values and updates for
    /// tasks that are not processing are ignored. Returns the current value.
    pub fn record_progress(&mut self, id: &str, percent: u8) -> Result<u8, OrchestratorError> {
        let task = self.task_mut(id)?;
        if let TaskState::Processing { .. } = task.state {
            task.progress = task.progress.max(percent.min(100));
        }
        Ok(task.progress)
    }

    /// Processing to Completed.
    pub fn complete(
        &mut self,
        id: &str,
        artifacts: Vec<ResultArtifact>,
        advisories: Vec<Advisory>,
    ) -> Result<(), OrchestratorError> {
        let task = self.task_mut(id)?;
        if !matches!(task.state, TaskState::Processing { .. }) {
            return Err(OrchestratorError::invalid_state("processing", &task.state));
        }
        task.state = TaskState::Completed {
            artifacts,
            completed_at: Utc::now(),
        };
        task.progress = 100;
        task.advisories = advisories;
        Ok(())
    }

    /// Processing to Error.
    pub fn fail(&mut self, id: &str, failure: TaskFailure) -> Result<(), OrchestratorError> {
        let task = self.task_mut(id)?;
        if !matches!(task.state, TaskState::Processing { .. }) {
            return Err(OrchestratorError::invalid_state("processing", &task.state));
        }
        task.state = TaskState::Error {
            failure,
            failed_at: Utc::now(),
        };
        Ok(())
    }

    /// Completed to Queued, with the first artifact as the new source.
    ///
    /// The replaced source is recorded in the task's history and the result,
    /// progress and advisories are cleared. A target that the new source
    /// cannot reach is deselected.
    pub fn convert_again(&mut self, id: &str) -> Result<(), OrchestratorError> {
        let registry = self.registry;
        let task = self.task_mut(id)?;
        let first = match &task.state {
            TaskState::Completed { artifacts, .. } => artifacts.first().cloned(),
            other => return Err(OrchestratorError::invalid_state("completed", other)),
        };
        let Some(first) = first else {
            return Err(OrchestratorError::invalid_state("completed with a result", &task.state));
        };

        task.history.push(GenerationRecord {
            previous_format: task.format(),
            previous_filename: task.file_name.clone(),
            sha256: format!("{:x}", Sha256::digest(&task.source)),
            replaced_at: Utc::now(),
        });
        let detection = Detector::new(registry).detect(
            &first.bytes,
            Some(first.content_type.as_str()),
            Some(first.filename.as_str()),
        );
        task.source = first.bytes;
        task.file_name = first.filename;
        task.reported_mime = Some(first.content_type);
        task.detection = detection;
        task.state = TaskState::Queued;
        task.progress = 0;
        task.advisories.clear();
        debug!(task_id = %id, generation = task.history.len(), "Task requeued from its result");

        let new_format = detection.format;
        if let Some(target) = self.target {
            let reachable = new_format
                .map(|f| crate::format::targets_of(registry, f).contains(&target))
                .unwrap_or(false);
            if !reachable {
                self.target = None;
            }
        }
        Ok(())
    }

    /// Mean progress over all tasks; completed tasks count as 100.
    pub fn aggregate_progress(&self) -> u8 {
        if self.tasks.is_empty() {
            return 0;
        }
        let sum: u32 = self
            .tasks
            .iter()
            .map(|t| t.contributed_progress() as u32)
            .sum();
        (sum / self.tasks.len() as u32) as u8
    }

    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.state.is_completed())
    }

    /// Failed tasks worth reporting; cancellations are left out.
    pub fn user_facing_failures(&self) -> Vec<(&FileTask, &TaskFailure)> {
        self.tasks
            .iter()
            .filter_map(|t| t.state.failure().map(|f| (t, f)))
            .filter(|(_, f)| f.is_user_facing())
            .collect()
    }

    /// Artifacts of every completed task, in task order.
    pub fn artifacts(&self) -> Vec<ResultArtifact> {
        self.tasks
            .iter()
            .flat_map(|t| t.state.artifacts().iter().cloned())
            .collect()
    }

    fn index_of(&self, id: &str) -> Result<usize, OrchestratorError> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| OrchestratorError::TaskNotFound(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> Result<&mut FileTask, OrchestratorError> {
        let index = self.index_of(id)?;
        Ok(&mut self.tasks[index])
    }
}
