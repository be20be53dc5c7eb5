//! Audio transcoding.
//!
//! PCM is extracted once on the control side by a [`DecoderChain`]. The
//! worker then encodes it one of two ways, chosen by [`negotiate`]:
//!
//! - **Bitstream** (`wav`, `mp3`): fixed-size frames through a
//!   [`FrameEncoder`], with an explicit flush at end of stream.
//! - **Capture** (everything else): real-time playback into a streaming
//!   encoder opened from a [`CaptureBackend`], bounded by a safety timer.
//!
//! When no encoder can produce the target, a WAV or MP3 substitute is
//! encoded instead and reported through an advisory.

mod bitstream;
mod capture;
mod decode;
mod fallback;
mod transcoder;

pub use bitstream::{
    run_bitstream, wav_header, BuiltinFrameEncoders, FrameEncoder, FrameEncoderFactory,
    WavEncoder,
};
pub use capture::{
    run_capture, simulated_progress, CaptureBackend, CaptureSession, CAPTURE_PROGRESS_CAP,
    FINALIZE_PROGRESS,
};
pub use decode::{decode_with_symphonia, DecoderChain, PcmDecoder, SymphoniaDecoder};
pub use fallback::{
    capture_candidates, negotiate, probe_first, substitute_for, EncodePlan, Negotiation,
    BITSTREAM_TARGETS,
};
pub use transcoder::AudioTranscoder;
