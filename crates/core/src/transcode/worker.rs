//! Isolated transcode workers.
//!
//! Each conversion runs in its own spawned tokio task and talks to the
//! control side only through [`WorkerRequest`] / [`WorkerResponse`]
//! messages. A panic inside a worker ends that task alone and surfaces as
//! [`TranscodeError::WorkerLost`].

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::cancel::CancelToken;

use super::error::{TaskFailure, TranscodeError};
use super::protocol::{TranscodeJob, WorkerRequest, WorkerResponse};
use super::traits::Transcoder;
use super::types::TranscodeOutput;

/// Responses buffered between a worker and the control task.
const RESPONSE_BUFFER: usize = 32;

/// Sends progress updates from inside a worker.
///
/// Updates never block the encoder: if the channel is full the update is
/// dropped. Only strictly increasing values are sent.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: mpsc::Sender<WorkerResponse>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<WorkerResponse>) -> Self {
        Self {
            tx,
            last: AtomicU8::new(0),
        }
    }

    /// A reporter paired with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WorkerResponse>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// A reporter whose updates go nowhere.
    pub fn detached() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self::new(tx)
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        if self.last.fetch_max(percent, Ordering::Relaxed) >= percent {
            return;
        }
        let _ = self.tx.try_send(WorkerResponse::Progress { percent });
    }

    /// Reports `done / total` as a percentage, capped at `cap`.
    pub fn report_fraction(&self, done: usize, total: usize, cap: u8) {
        let percent = if total == 0 {
            cap
        } else {
            ((done.min(total) * 100) / total).min(cap as usize) as u8
        };
        self.report(percent);
    }

    pub fn last(&self) -> u8 {
        self.last.load(Ordering::Relaxed)
    }
}

/// Handle to a running worker task.
///
/// Dropping the handle aborts the worker.
pub struct WorkerHandle {
    requests: mpsc::Sender<WorkerRequest>,
    responses: mpsc::Receiver<WorkerResponse>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawns a worker that serves one request with `transcoder`.
    pub fn spawn(transcoder: Arc<dyn Transcoder>, cancel: CancelToken) -> Self {
        let (request_tx, mut request_rx) = mpsc::channel::<WorkerRequest>(1);
        let (response_tx, response_rx) = mpsc::channel(RESPONSE_BUFFER);

        let task = tokio::spawn(async move {
            let Some(request) = request_rx.recv().await else {
                return;
            };
            let job = TranscodeJob::from(request);
            let reporter = ProgressReporter::new(response_tx.clone());

            debug!(
                transcoder = transcoder.name(),
                source = %job.source_format,
                target = %job.target_format,
                "Worker started"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TranscodeError::Cancelled),
                result = transcoder.transcode(job, &reporter, &cancel) => result,
            };

            let response = match result {
                Ok(output) => WorkerResponse::Success { output },
                Err(e) => TaskFailure::from(e).into(),
            };
            let _ = response_tx.send(response).await;
        });

        Self {
            requests: request_tx,
            responses: response_rx,
            task,
        }
    }

    /// Sends the request to the worker.
    pub async fn send(&self, request: WorkerRequest) -> Result<(), TranscodeError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| TranscodeError::worker_lost("worker stopped before accepting the request"))
    }

    /// Receives the next response. A closed channel means the worker died.
    pub async fn recv(&mut self) -> Result<WorkerResponse, TranscodeError> {
        match self.responses.recv().await {
            Some(response) => Ok(response),
            None => Err(self.lost().await),
        }
    }

    /// Aborts the worker immediately, without draining it.
    pub fn terminate(self) {
        self.task.abort();
    }

    /// Sends `request` and waits for the terminal response, forwarding
    /// progress to `on_progress`. Cancellation aborts the worker.
    pub async fn run(
        mut self,
        request: WorkerRequest,
        cancel: &CancelToken,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> Result<TranscodeOutput, TaskFailure> {
        self.send(request).await?;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                response = self.recv() => Some(response),
            };

            match next {
                None => {
                    self.terminate();
                    return Err(TaskFailure::cancelled());
                }
                Some(Ok(WorkerResponse::Progress { percent })) => on_progress(percent),
                Some(Ok(WorkerResponse::Success { output })) => return Ok(output),
                Some(Ok(WorkerResponse::Error { kind, message })) => {
                    return Err(TaskFailure::new(kind, message))
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    async fn lost(&mut self) -> TranscodeError {
        let reason = match (&mut self.task).await {
            Ok(()) => "worker exited without a result".to_string(),
            Err(e) if e.is_panic() => format!("worker panicked: {}", panic_message(e.into_panic())),
            Err(e) => e.to_string(),
        };
        error!(reason = %reason, "Transcode worker lost");
        TranscodeError::worker_lost(reason)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids::{PNG, WEBP};
    use crate::format::MediaFamily;
    use crate::transcode::error::FailureKind;
    use crate::transcode::types::{ConversionOptions, EncodedOutput, Payload};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::time::Duration;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
    }

    struct ScriptedTranscoder(Behavior);

    #[async_trait]
    impl Transcoder for ScriptedTranscoder {
        fn name(&self) -> &str {
            "scripted"
        }

        fn family(&self) -> MediaFamily {
            MediaFamily::Image
        }

        async fn prepare(
            &self,
            source: Bytes,
            _source_format: crate::format::FormatId,
        ) -> Result<Payload, TranscodeError> {
            Ok(Payload::Encoded(source))
        }

        async fn transcode(
            &self,
            job: TranscodeJob,
            progress: &ProgressReporter,
            _cancel: &CancelToken,
        ) -> Result<TranscodeOutput, TranscodeError> {
            progress.report(50);
            match self.0 {
                Behavior::Succeed => Ok(TranscodeOutput::single(
                    job.target_format,
                    EncodedOutput::new(Bytes::from_static(b"out")),
                )),
                Behavior::Fail => Err(TranscodeError::decode_failure("png", "truncated")),
                Behavior::Panic => panic!("codec blew up"),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn request() -> WorkerRequest {
        WorkerRequest::Convert {
            payload: Payload::Encoded(Bytes::from_static(b"in")),
            source_format: PNG,
            target_format: WEBP,
            options: ConversionOptions::default(),
        }
    }

    fn worker(behavior: Behavior, cancel: &CancelToken) -> WorkerHandle {
        WorkerHandle::spawn(Arc::new(ScriptedTranscoder(behavior)), cancel.clone())
    }

    #[tokio::test]
    async fn test_success_after_progress() {
        let cancel = CancelToken::new();
        let mut seen = Vec::new();
        let output = worker(Behavior::Succeed, &cancel)
            .run(request(), &cancel, |p| seen.push(p))
            .await
            .unwrap();
        assert_eq!(output.format, WEBP);
        assert_eq!(output.outputs[0].bytes, Bytes::from_static(b"out"));
        assert_eq!(seen, vec![50]);
    }

    #[tokio::test]
    async fn test_error_is_forwarded() {
        let cancel = CancelToken::new();
        let failure = worker(Behavior::Fail, &cancel)
            .run(request(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::DecodeFailure);
        assert_eq!(failure.message, "Failed to decode png: truncated");
    }

    #[tokio::test]
    async fn test_panic_becomes_worker_lost() {
        let cancel = CancelToken::new();
        let failure = worker(Behavior::Panic, &cancel)
            .run(request(), &cancel, |_| {})
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::WorkerLost);
        assert!(failure.message.contains("codec blew up"));
    }

    #[tokio::test]
    async fn test_cancel_aborts_hung_worker() {
        let cancel = CancelToken::new();
        let handle = worker(Behavior::Hang, &cancel);
        let run = handle.run(request(), &cancel, |_| {});
        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                cancel.cancel();
            }
        };
        let (result, ()) = tokio::time::timeout(Duration::from_secs(1), async {
            tokio::join!(run, canceller)
        })
        .await
        .expect("cancellation ends the run");
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_reporter_only_sends_increasing_values() {
        let (reporter, mut rx) = ProgressReporter::channel(8);
        reporter.report(10);
        reporter.report(5);
        reporter.report(10);
        reporter.report(250);
        drop(reporter);

        let mut values = Vec::new();
        while let Some(WorkerResponse::Progress { percent }) = rx.recv().await {
            values.push(percent);
        }
        assert_eq!(values, vec![10, 100]);
    }

    #[test]
    fn test_report_fraction_caps() {
        let reporter = ProgressReporter::detached();
        reporter.report_fraction(5, 10, 99);
        assert_eq!(reporter.last(), 50);
        reporter.report_fraction(10, 10, 89);
        assert_eq!(reporter.last(), 89);
    }
}
