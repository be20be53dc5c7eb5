//! ffmpeg-backed decoder and encoders.
//!
//! Every use pipes raw data through a child process: encoded bytes or
//! `f32le` PCM go in on stdin, the result is read from stdout.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::format::{FormatId, FormatRegistry, MediaFamily};

use super::audio::{CaptureBackend, CaptureSession, FrameEncoder, PcmDecoder};
use super::capabilities::{capture_target, EncoderCapabilities};
use super::error::TranscodeError;
use super::types::{DecodedAudio, StreamSpec};

/// Rate and layout ffmpeg decodes to. 48 kHz is native for Opus.
const DECODE_SAMPLE_RATE: u32 = 48_000;
const DECODE_CHANNELS: usize = 2;

/// A child process with piped stdin/stdout, drained concurrently.
pub struct PipedProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<JoinHandle<io::Result<Vec<u8>>>>,
    stderr: Option<JoinHandle<io::Result<String>>>,
}

impl PipedProcess {
    pub fn spawn(program: &Path, args: &[String]) -> io::Result<Self> {
        debug!(program = %program.display(), ?args, "Spawning ffmpeg");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("stderr not captured"))?;

        let stdout = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            Ok(buf)
        });
        let stderr = tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await?;
            Ok(buf)
        });

        Ok(Self {
            child,
            stdin,
            stdout: Some(stdout),
            stderr: Some(stderr),
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(bytes).await,
            None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin closed")),
        }
    }

    pub async fn write_samples(&mut self, samples: &[f32]) -> io::Result<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.write(&bytes).await
    }

    /// Closes stdin and collects stdout once the process exits.
    pub async fn finish(&mut self) -> io::Result<Vec<u8>> {
        drop(self.stdin.take());

        let stdout = self
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("process already finished"))?;
        let output = stdout.await.map_err(io::Error::other)??;
        let status = self.child.wait().await?;

        if !status.success() {
            let stderr = match self.stderr.take() {
                Some(handle) => handle.await.ok().and_then(Result::ok).unwrap_or_default(),
                None => String::new(),
            };
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no diagnostic output");
            return Err(io::Error::other(format!("ffmpeg exited with {}: {}", status, detail)));
        }
        Ok(output)
    }
}

fn base_args() -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

fn pcm_input_args(spec: StreamSpec) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "f32le".to_string(),
        "-ar".to_string(),
        spec.sample_rate.to_string(),
        "-ac".to_string(),
        spec.channels.to_string(),
        "-i".to_string(),
        "pipe:0".to_string(),
    ]);
    args
}

/// Arguments for decoding any input on stdin to interleaved `f32le`.
pub fn decode_args() -> Vec<String> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        "pipe:0".to_string(),
        "-vn".to_string(),
        "-f".to_string(),
        "f32le".to_string(),
        "-ac".to_string(),
        DECODE_CHANNELS.to_string(),
        "-ar".to_string(),
        DECODE_SAMPLE_RATE.to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Arguments for encoding PCM on stdin to MP3 at a fixed bitrate.
pub fn mp3_args(spec: StreamSpec, bitrate_kbps: u32) -> Vec<String> {
    let mut args = pcm_input_args(spec);
    args.extend([
        "-c:a".to_string(),
        "libmp3lame".to_string(),
        "-b:a".to_string(),
        format!("{}k", bitrate_kbps),
        "-f".to_string(),
        "mp3".to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Arguments for a streaming encode to `container` with `codec`.
pub fn capture_args(container: &str, codec: &str, spec: StreamSpec, bitrate_kbps: u32) -> Vec<String> {
    let mut args = pcm_input_args(spec);
    args.extend(["-c:a".to_string(), codec.to_string()]);

    // Bitrate only applies to lossy codecs
    if codec != "flac" {
        args.extend(["-b:a".to_string(), format!("{}k", bitrate_kbps)]);
    }

    // MP4 needs a fragmented layout to be written to a pipe
    if container == "ipod" {
        args.extend([
            "-movflags".to_string(),
            "frag_keyframe+empty_moov".to_string(),
        ]);
    }

    args.extend([
        "-f".to_string(),
        container.to_string(),
        "pipe:1".to_string(),
    ]);
    args
}

/// Decoder of last resort for codecs symphonia lacks.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    ffmpeg_path: PathBuf,
    available: bool,
}

impl FfmpegDecoder {
    pub fn new(ffmpeg_path: PathBuf, available: bool) -> Self {
        Self {
            ffmpeg_path,
            available,
        }
    }
}

#[async_trait]
impl PcmDecoder for FfmpegDecoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn can_decode(&self, format: FormatId) -> bool {
        self.available
            && FormatRegistry::standard()
                .get(format)
                .is_some_and(|d| d.family() == MediaFamily::Audio)
    }

    async fn decode(&self, source: Bytes, format: FormatId) -> Result<DecodedAudio, TranscodeError> {
        let mut process = PipedProcess::spawn(&self.ffmpeg_path, &decode_args())
            .map_err(|e| TranscodeError::decode_failure(format, e))?;

        // A decoder that rejects its input may close stdin early; the exit
        // status below carries the real error.
        let _ = process.write(&source).await;
        let output = process
            .finish()
            .await
            .map_err(|e| TranscodeError::decode_failure(format, e))?;

        let samples: Vec<f32> = output
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        if samples.is_empty() {
            return Err(TranscodeError::decode_failure(format, "no audio decoded"));
        }
        Ok(DecodedAudio::from_interleaved(
            DECODE_SAMPLE_RATE,
            DECODE_CHANNELS,
            &samples,
        ))
    }
}

/// MP3 frame encoder piping PCM through libmp3lame.
pub struct FfmpegMp3Encoder {
    process: PipedProcess,
}

impl FfmpegMp3Encoder {
    pub fn spawn(
        ffmpeg_path: &Path,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Self, TranscodeError> {
        let process = PipedProcess::spawn(ffmpeg_path, &mp3_args(spec, bitrate_kbps))
            .map_err(|e| TranscodeError::encode_failure("mp3", e))?;
        Ok(Self { process })
    }
}

#[async_trait]
impl FrameEncoder for FfmpegMp3Encoder {
    async fn encode_frame(&mut self, samples: &[f32]) -> Result<Bytes, TranscodeError> {
        self.process
            .write_samples(samples)
            .await
            .map_err(|e| TranscodeError::encode_failure("mp3", e))?;
        Ok(Bytes::new())
    }

    async fn flush(&mut self) -> Result<Bytes, TranscodeError> {
        self.process
            .finish()
            .await
            .map(Bytes::from)
            .map_err(|e| TranscodeError::encode_failure("mp3", e))
    }
}

/// Streaming encoders provided by ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegCaptureBackend {
    ffmpeg_path: PathBuf,
    capabilities: EncoderCapabilities,
}

impl FfmpegCaptureBackend {
    pub fn new(ffmpeg_path: PathBuf, capabilities: EncoderCapabilities) -> Self {
        Self {
            ffmpeg_path,
            capabilities,
        }
    }
}

#[async_trait]
impl CaptureBackend for FfmpegCaptureBackend {
    fn is_type_supported(&self, mime: &str) -> bool {
        self.capabilities.supports_mime(mime)
    }

    async fn open(
        &self,
        mime: &str,
        spec: StreamSpec,
        bitrate_kbps: u32,
    ) -> Result<Box<dyn CaptureSession>, TranscodeError> {
        let target = capture_target(mime)
            .ok_or_else(|| TranscodeError::encode_failure(mime, "unknown capture type"))?;
        let args = capture_args(target.container, target.codec, spec, bitrate_kbps);
        let process = PipedProcess::spawn(&self.ffmpeg_path, &args)
            .map_err(|e| TranscodeError::encode_failure(mime, e))?;
        Ok(Box::new(FfmpegCaptureSession {
            mime: mime.to_string(),
            process,
        }))
    }
}

struct FfmpegCaptureSession {
    mime: String,
    process: PipedProcess,
}

#[async_trait]
impl CaptureSession for FfmpegCaptureSession {
    async fn push(&mut self, samples: &[f32]) -> Result<(), TranscodeError> {
        self.process
            .write_samples(samples)
            .await
            .map_err(|e| TranscodeError::encode_failure(&self.mime, e))
    }

    async fn finish(&mut self) -> Result<Bytes, TranscodeError> {
        self.process
            .finish()
            .await
            .map(Bytes::from)
            .map_err(|e| TranscodeError::encode_failure(&self.mime, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ids::{OPUS, PNG};

    const STEREO: StreamSpec = StreamSpec {
        sample_rate: 44_100,
        channels: 2,
    };

    #[test]
    fn test_mp3_args() {
        let args = mp3_args(STEREO, 192);
        let joined = args.join(" ");
        assert!(joined.contains("-f f32le -ar 44100 -ac 2 -i pipe:0"));
        assert!(joined.contains("-c:a libmp3lame -b:a 192k -f mp3 pipe:1"));
    }

    #[test]
    fn test_capture_args() {
        let flac = capture_args("flac", "flac", STEREO, 192).join(" ");
        assert!(!flac.contains("-b:a"));
        assert!(flac.ends_with("-f flac pipe:1"));

        let m4a = capture_args("ipod", "aac", STEREO, 128).join(" ");
        assert!(m4a.contains("-b:a 128k"));
        assert!(m4a.contains("-movflags frag_keyframe+empty_moov"));
    }

    #[test]
    fn test_decoder_availability() {
        let unavailable = FfmpegDecoder::new(PathBuf::from("ffmpeg"), false);
        assert!(!unavailable.can_decode(OPUS));

        let available = FfmpegDecoder::new(PathBuf::from("ffmpeg"), true);
        assert!(available.can_decode(OPUS));
        assert!(!available.can_decode(PNG));
    }

    #[tokio::test]
    async fn test_missing_binary_is_encode_failure() {
        let result = FfmpegMp3Encoder::spawn(Path::new("/nonexistent/ffmpeg"), STEREO, 192);
        assert!(matches!(result, Err(TranscodeError::EncodeFailure { .. })));
    }

    #[tokio::test]
    async fn test_piped_process_collects_stdout() {
        let mut process = match PipedProcess::spawn(Path::new("cat"), &[]) {
            Ok(p) => p,
            Err(_) => return,
        };
        process.write(b"hello").await.unwrap();
        assert_eq!(process.finish().await.unwrap(), b"hello");
    }
}
