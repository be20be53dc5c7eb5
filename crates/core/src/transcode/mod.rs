//! Transcoders for the image and audio families.
//!
//! A [`Transcoder`] prepares source bytes on the control side and encodes
//! them inside an isolated worker spawned through [`WorkerHandle`]. Workers
//! speak the closed [`WorkerRequest`] / [`WorkerResponse`] protocol.
//!
//! # Example
//!
//! ```ignore
//! use transmute_core::transcode::{ImageTranscoder, Transcoder, WorkerHandle, WorkerRequest};
//!
//! let transcoder = Arc::new(ImageTranscoder::with_defaults());
//! let payload = transcoder.prepare(bytes, ids::PNG).await?;
//!
//! let output = WorkerHandle::spawn(transcoder, cancel.clone())
//!     .run(
//!         WorkerRequest::Convert {
//!             payload,
//!             source_format: ids::PNG,
//!             target_format: ids::WEBP,
//!             options: ConversionOptions::default(),
//!         },
//!         &cancel,
//!         |percent| println!("{}%", percent),
//!     )
//!     .await?;
//! ```

pub mod audio;
mod capabilities;
mod config;
mod error;
pub mod ffmpeg;
mod protocol;
pub mod quality;
mod raster;
mod traits;
mod types;
mod worker;

pub use audio::AudioTranscoder;
pub use capabilities::{capture_target, CaptureTarget, EncoderCapabilities};
pub use config::{AudioConfig, ImageConfig, ResizeFilter};
pub use error::{FailureKind, TaskFailure, TranscodeError};
pub use protocol::{TranscodeJob, WorkerRequest, WorkerResponse};
pub use raster::{convert_image, image_format, split_icon, ImageTranscoder, MAX_ICON_EDGE};
pub use traits::Transcoder;
pub use types::{
    Advisory, ConversionOptions, DecodedAudio, EncodedOutput, Payload, QualityConcern, Severity,
    StreamSpec, TranscodeOutput,
};
pub use worker::{ProgressReporter, WorkerHandle};
