//! Packaging of completed results.
//!
//! One artifact is saved directly. Several are either saved one by one with
//! a configurable stagger or, by default, bundled into a zip archive whose
//! entry names are made unique.

mod archive;
mod config;
mod packager;
mod sink;
mod types;

pub use archive::archive;
pub use config::PackagingConfig;
pub use packager::Packager;
pub use sink::{ArtifactSink, DirectorySink};
pub use types::{PackageSummary, PackagingError, PackagingStrategy};
