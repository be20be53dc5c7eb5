//! Real-time capture through a streaming encoder.
//!
//! Samples are pushed at 1x playback speed in fixed-size chunks, the way a
//! media recorder attached to a playing stream would receive them. A safety
//! timer bounds the whole capture at the stream duration plus a margin.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::transcode::config::AudioConfig;
use crate::transcode::error::TranscodeError;
use crate::transcode::types::{DecodedAudio, StreamSpec};
use crate::transcode::worker::ProgressReporter;

/// Simulated progress stays below this until the encoder is finalized.
pub const CAPTURE_PROGRESS_CAP: u8 = 89;
/// Progress reported once the stream has ended and finalization starts.
pub const FINALIZE_PROGRESS: u8 = 90;

/// A source of streaming encoders keyed by MIME variant.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    fn is_type_supported(&self, mime: &str) -> bool;

    async fn open(
        &self,
        mime: &str,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn CaptureSession>, TranscodeError>;
}

/// One streaming encode in progress.
#[async_trait]
pub trait CaptureSession: Send {
    /// Feeds one chunk of interleaved samples.
    async fn push(&mut self, samples: &[f32]) -> Result<(), TranscodeError>;

    /// Ends the stream and returns the encoded file.
    async fn finish(&mut self) -> Result<Bytes, TranscodeError>;
}

/// Plays `audio` into `session` in real time and returns the recording.
pub async fn run_capture(
    session: &mut dyn CaptureSession,
    audio: &DecodedAudio,
    config: &AudioConfig,
    progress: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<Bytes, TranscodeError> {
    let duration = audio.duration();
    let limit = duration + config.capture_margin();

    match tokio::time::timeout(limit, capture(session, audio, config, progress, cancel)).await {
        Ok(result) => result,
        Err(_) => {
            let limit_ms = limit.as_millis() as u64;
            warn!(limit_ms, "Capture exceeded its safety timeout");
            Err(TranscodeError::SafetyTimeout { limit_ms })
        }
    }
}

async fn capture(
    session: &mut dyn CaptureSession,
    audio: &DecodedAudio,
    config: &AudioConfig,
    progress: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<Bytes, TranscodeError> {
    let chunk = config.capture_chunk().max(Duration::from_millis(1));
    let chunk_frames = ((audio.sample_rate as u128 * chunk.as_millis()) / 1000).max(1) as usize;
    let total = audio.frames();
    let duration = audio.duration();

    let mut ticker = tokio::time::interval(chunk);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started = Instant::now();
    let mut last_report: Option<Instant> = None;
    let mut position = 0;
    let mut chunks = 0usize;

    while position < total {
        ticker.tick().await;
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }

        let end = (position + chunk_frames).min(total);
        session.push(&audio.interleaved(position, end)).await?;
        position = end;
        chunks += 1;

        let now = Instant::now();
        if last_report.map_or(true, |t| now - t >= config.progress_interval()) {
            progress.report(simulated_progress(now - started, duration));
            last_report = Some(now);
        }
    }

    if cancel.is_cancelled() {
        return Err(TranscodeError::Cancelled);
    }
    progress.report(FINALIZE_PROGRESS);
    debug!(chunks, "Capture stream ended, finalizing");
    session.finish().await
}

/// Elapsed playback time over duration, capped below the finalize step.
pub fn simulated_progress(elapsed: Duration, duration: Duration) -> u8 {
    if duration.is_zero() {
        return CAPTURE_PROGRESS_CAP;
    }
    let percent = (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).floor();
    (percent.max(0.0) as u64).min(CAPTURE_PROGRESS_CAP as u64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::protocol::WorkerResponse;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        pushes: Arc<Mutex<Vec<(Instant, usize)>>>,
        hang_on_finish: bool,
    }

    #[async_trait]
    impl CaptureSession for Recorder {
        async fn push(&mut self, samples: &[f32]) -> Result<(), TranscodeError> {
            self.pushes.lock().unwrap().push((Instant::now(), samples.len()));
            Ok(())
        }

        async fn finish(&mut self) -> Result<Bytes, TranscodeError> {
            if self.hang_on_finish {
                std::future::pending::<()>().await;
            }
            Ok(Bytes::from_static(b"recorded"))
        }
    }

    fn silence(seconds: u32) -> DecodedAudio {
        DecodedAudio::new(1000, vec![vec![0.0; 1000 * seconds as usize]])
    }

    #[test]
    fn test_simulated_progress() {
        let d = Duration::from_secs(10);
        assert_eq!(simulated_progress(Duration::ZERO, d), 0);
        assert_eq!(simulated_progress(Duration::from_secs(5), d), 50);
        assert_eq!(simulated_progress(Duration::from_secs(10), d), 89);
        assert_eq!(simulated_progress(Duration::from_secs(30), d), 89);
        assert_eq!(simulated_progress(Duration::from_secs(1), Duration::ZERO), 89);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_is_paced_in_real_time() {
        let audio = silence(2);
        let mut session = Recorder::default();
        let pushes = Arc::clone(&session.pushes);
        let started = Instant::now();

        let bytes = run_capture(
            &mut session,
            &audio,
            &AudioConfig::default(),
            &ProgressReporter::detached(),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(bytes, Bytes::from_static(b"recorded"));
        let pushes = pushes.lock().unwrap();
        assert_eq!(pushes.len(), 20);
        assert!(pushes.iter().all(|(_, len)| *len == 100));
        // The first chunk goes out immediately, the last one 1.9 s later.
        assert_eq!(pushes[19].0 - started, Duration::from_millis(1900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_capped_until_finalize() {
        let audio = silence(1);
        let (reporter, mut rx) = ProgressReporter::channel(64);
        let config = AudioConfig {
            progress_interval_ms: 0,
            ..AudioConfig::default()
        };
        run_capture(
            &mut Recorder::default(),
            &audio,
            &config,
            &reporter,
            &CancelToken::new(),
        )
        .await
        .unwrap();
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(WorkerResponse::Progress { percent }) = rx.recv().await {
            seen.push(percent);
        }
        assert_eq!(seen.last(), Some(&FINALIZE_PROGRESS));
        assert!(seen[..seen.len() - 1].iter().all(|p| *p <= CAPTURE_PROGRESS_CAP));
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_stream_hits_safety_timeout() {
        let audio = silence(1);
        let mut session = Recorder {
            hang_on_finish: true,
            ..Recorder::default()
        };
        let config = AudioConfig::default();
        let progress = ProgressReporter::detached();
        let cancel = CancelToken::new();
        let started = Instant::now();
        let err = run_capture(&mut session, &audio, &config, &progress, &cancel)
        .await
        .unwrap_err();

        assert!(matches!(err, TranscodeError::SafetyTimeout { limit_ms: 6000 }));
        assert_eq!(Instant::now() - started, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_at_chunk_boundary() {
        let audio = silence(10);
        let mut session = Recorder::default();
        let pushes = Arc::clone(&session.pushes);
        let cancel = CancelToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(450)).await;
                cancel.cancel();
            }
        };
        let config = AudioConfig::default();
        let progress = ProgressReporter::detached();
        let (result, ()) = tokio::join!(
            run_capture(&mut session, &audio, &config, &progress, &cancel),
            canceller
        );

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(pushes.lock().unwrap().len(), 5);
    }
}
