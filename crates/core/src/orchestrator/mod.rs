//! Conversion orchestrator.
//!
//! A [`ConversionSession`] holds the batch: its file tasks, the selected
//! target, options and the batch cancellation token. The [`Orchestrator`]
//! runs conversion passes over a session:
//! - **Detection** happens once, when a file is added
//! - **Resolution** gates which target may be selected
//! - **Transcoding** runs every runnable task concurrently in isolated workers
//! - **Naming** assigns collision-free output names on completion
//!
//! Task lifecycle: `Queued -> Processing -> Completed | Error`. Failed tasks
//! are picked up again by the next pass; completed tasks only return to
//! `Queued` through [`ConversionSession::convert_again`].

mod config;
mod runner;
mod session;
mod types;

pub use config::OrchestratorConfig;
pub use runner::Orchestrator;
pub use session::ConversionSession;
pub use types::{
    BatchReport, FileTask, GenerationRecord, OrchestratorError, ResultArtifact, SessionEvent,
    TaskState,
};
