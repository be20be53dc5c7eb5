//! Conversion orchestrator implementation.
//!
//! Drives every runnable task of a session through its transcoder:
//! - Dispatch: all tasks at once, no concurrency cap
//! - Isolation: each encode runs in its own worker task
//! - Completion: settle-all; one failure never stops the others

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::format::{FormatId, FormatRegistry, MediaFamily};
use crate::naming::output_filename;
use crate::transcode::{
    AudioTranscoder, ConversionOptions, ImageTranscoder, TaskFailure, TranscodeError,
    TranscodeOutput, Transcoder, WorkerHandle, WorkerRequest,
};

use super::config::OrchestratorConfig;
use super::session::ConversionSession;
use super::types::{BatchReport, OrchestratorError, ResultArtifact, SessionEvent};

/// Drives conversion passes over a [`ConversionSession`].
pub struct Orchestrator {
    registry: &'static FormatRegistry,
    transcoders: HashMap<MediaFamily, Arc<dyn Transcoder>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Orchestrator {
    /// Creates an orchestrator with no transcoders registered.
    pub fn new(config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            registry: FormatRegistry::standard(),
            transcoders: HashMap::new(),
            events,
        }
    }

    /// Creates an orchestrator with the image transcoder and the audio
    /// transcoder for whatever encoders ffmpeg provides.
    pub async fn standard(config: &Config) -> Self {
        let audio = AudioTranscoder::detect(config.audio.clone()).await;
        Self::new(config.orchestrator.clone())
            .with_transcoder(Arc::new(ImageTranscoder::new(config.image.clone())))
            .with_transcoder(Arc::new(audio))
    }

    /// Registers `transcoder` for its media family, replacing any previous one.
    pub fn with_transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoders.insert(transcoder.family(), transcoder);
        self
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    /// Runs one conversion pass over every task that is not completed.
    ///
    /// Per-task failures are recorded on the tasks and counted in the
    /// report; only misuse of the session is returned as an error.
    pub async fn run(&self, session: &mut ConversionSession) -> Result<BatchReport, OrchestratorError> {
        let target = session.target().ok_or(OrchestratorError::NoTargetSelected)?;
        session.prepare_run();
        let cancel = session.cancel_token();
        let options = session.options().clone();
        let used_names = session.used_names();

        let mut report = BatchReport::default();
        let mut jobs = Vec::new();
        for task in session.tasks() {
            if task.state.is_completed() {
                report.skipped += 1;
            } else {
                jobs.push((
                    task.id.clone(),
                    task.file_name.clone(),
                    task.source.clone(),
                    task.format(),
                ));
            }
        }

        info!(target = %target, tasks = jobs.len(), skipped = report.skipped, "Starting batch");
        self.emit(SessionEvent::BatchStarted {
            target,
            tasks: jobs.len(),
        });

        for (id, ..) in &jobs {
            session.begin(id)?;
            self.emit(SessionEvent::TaskStateChanged {
                task_id: id.clone(),
                state: "processing",
            });
        }

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<(String, u8)>();
        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|(id, file_name, source, format)| {
                let cancel = cancel.clone();
                let options = options.clone();
                let progress_tx = progress_tx.clone();
                async move {
                    let Some(format) = format else {
                        let failure: TaskFailure = TranscodeError::UnrecognizedFormat { file_name }.into();
                        return (id, Err(failure));
                    };
                    let result = self
                        .convert(source, format, target, options, &cancel, |percent| {
                            let _ = progress_tx.send((id.clone(), percent));
                        })
                        .await;
                    (id, result)
                }
            })
            .collect();
        drop(progress_tx);

        loop {
            tokio::select! {
                Some((id, percent)) = progress_rx.recv() => {
                    let progress = session.record_progress(&id, percent)?;
                    self.emit(SessionEvent::TaskProgress {
                        task_id: id,
                        progress,
                        aggregate: session.aggregate_progress(),
                    });
                }
                Some((id, result)) = pending.next() => {
                    match result {
                        Ok(output) => {
                            let file_name = session
                                .task(&id)
                                .map(|t| t.file_name.clone())
                                .ok_or_else(|| OrchestratorError::TaskNotFound(id.clone()))?;
                            let artifacts = self.artifacts(&file_name, &output, &used_names);
                            debug!(task_id = %id, outputs = artifacts.len(), "Task completed");
                            session.complete(&id, artifacts, output.advisories)?;
                            report.completed += 1;
                        }
                        Err(failure) => {
                            if failure.is_cancelled() {
                                debug!(task_id = %id, "Task cancelled");
                                report.cancelled += 1;
                            } else {
                                warn!(task_id = %id, kind = %failure.kind, error = %failure, "Task failed");
                                report.failed += 1;
                            }
                            session.fail(&id, failure)?;
                        }
                    }
                    let state = session
                        .task(&id)
                        .map(|t| t.state.state_type())
                        .unwrap_or("unknown");
                    self.emit(SessionEvent::TaskStateChanged {
                        task_id: id.clone(),
                        state,
                    });
                    self.emit(SessionEvent::TaskProgress {
                        progress: session.task(&id).map(|t| t.progress).unwrap_or(0),
                        task_id: id,
                        aggregate: session.aggregate_progress(),
                    });
                }
                else => break,
            }
        }

        info!(
            target = %target,
            completed = report.completed,
            failed = report.failed,
            cancelled = report.cancelled,
            "Batch finished"
        );
        self.emit(SessionEvent::BatchFinished {
            report: report.clone(),
        });
        Ok(report)
    }

    /// Converts one source to `target`.
    ///
    /// The token is checked before starting and while the source is prepared;
    /// once a worker runs, cancelling aborts it.
    pub async fn convert(
        &self,
        source: Bytes,
        source_format: FormatId,
        target: FormatId,
        options: ConversionOptions,
        cancel: &CancelToken,
        on_progress: impl FnMut(u8) + Send,
    ) -> Result<TranscodeOutput, TaskFailure> {
        if cancel.is_cancelled() {
            return Err(TaskFailure::cancelled());
        }
        if source_format == target {
            return Ok(TranscodeOutput::passthrough(target, source));
        }

        let family = self
            .registry
            .get(target)
            .map(|d| d.family())
            .ok_or_else(|| TranscodeError::encode_failure(target, "unknown target format"))?;
        let transcoder = self
            .transcoders
            .get(&family)
            .cloned()
            .ok_or_else(|| TranscodeError::encode_failure(target, "no transcoder registered"))?;

        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TaskFailure::cancelled()),
            payload = transcoder.prepare(source, source_format) => payload?,
        };

        let worker = WorkerHandle::spawn(transcoder, cancel.clone());
        worker
            .run(
                WorkerRequest::Convert {
                    payload,
                    source_format,
                    target_format: target,
                    options,
                },
                cancel,
                on_progress,
            )
            .await
    }

    fn artifacts(
        &self,
        file_name: &str,
        output: &TranscodeOutput,
        used_names: &crate::naming::UsedNames,
    ) -> Vec<ResultArtifact> {
        let descriptor = self.registry.get(output.format);
        let extension = descriptor.map(|d| d.extension()).unwrap_or(output.format.as_str());
        let content_type = descriptor
            .map(|d| d.content_type())
            .unwrap_or("application/octet-stream");

        output
            .outputs
            .iter()
            .map(|encoded| {
                let name = output_filename(file_name, encoded.suffix, extension);
                ResultArtifact {
                    bytes: encoded.bytes.clone(),
                    filename: used_names.claim(&name),
                    content_type: content_type.to_string(),
                    format: output.format,
                    dimensions: encoded.dimensions,
                }
            })
            .collect()
    }
}
