use serde::{Deserialize, Serialize};

pub use crate::orchestrator::OrchestratorConfig;
pub use crate::packaging::PackagingConfig;
pub use crate::transcode::{AudioConfig, ImageConfig, ResizeFilter};

/// Root configuration. Every section is optional and defaulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub image: ImageConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub packaging: PackagingConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}
