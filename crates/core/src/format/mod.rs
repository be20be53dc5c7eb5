//! Format registry, signature detection and target resolution.
//!
//! The registry is the single source of truth for what the engine knows about
//! a format: its byte signatures, MIME aliases, extensions and the formats it
//! may be converted to. Detection and resolution only read it, so supporting a
//! new format means adding one [`FormatDescriptor`] entry.
//!
//! # Example
//!
//! ```ignore
//! use transmute_core::format::{Detector, FormatRegistry, find_common_targets, ids};
//!
//! let detection = Detector::standard().detect(&bytes, Some("image/png"), Some("logo.png"));
//! let common = find_common_targets(FormatRegistry::standard(), &[ids::PNG, ids::JPEG]);
//! ```

mod detect;
mod registry;
mod resolve;
mod types;

pub use detect::Detector;
pub use registry::{ids, FormatRegistry, RegistryError};
pub use resolve::{
    can_convert_to_target, compatibility_message, find_common_targets, incompatibility_message,
    incompatible_formats, targets_of,
};
pub use types::{
    Confidence, Detection, FormatCategory, FormatDescriptor, FormatId, MediaFamily, Signature,
};
