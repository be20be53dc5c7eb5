pub mod cancel;
pub mod config;
pub mod format;
pub mod naming;
pub mod orchestrator;
pub mod packaging;
pub mod testing;
pub mod transcode;

pub use cancel::CancelToken;
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use format::{
    compatibility_message, find_common_targets, targets_of, Confidence, Detection, Detector,
    FormatId, FormatRegistry, MediaFamily,
};
pub use naming::{make_unique_filename, output_filename, Dimensions, NameSuffix, UsedNames};
pub use orchestrator::{
    BatchReport, ConversionSession, FileTask, Orchestrator, OrchestratorConfig,
    OrchestratorError, ResultArtifact, SessionEvent, TaskState,
};
pub use packaging::{
    archive, ArtifactSink, DirectorySink, PackageSummary, Packager, PackagingConfig,
    PackagingError, PackagingStrategy,
};
pub use transcode::{
    Advisory, AudioTranscoder, ConversionOptions, EncoderCapabilities, FailureKind,
    ImageTranscoder, Severity, TaskFailure, TranscodeError, Transcoder,
};
