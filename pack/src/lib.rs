//! Methodology Pack interface: a read-only provider of phase prompts,
//! constraint rules, and templates, keyed by task type (§4.C). The core
//! orchestrator depends only on the [`MethodologyPack`] trait; this crate's
//! [`FilesystemPack`] is one illustrative implementation.

mod error;
mod fs_pack;
mod pack;
mod types;

pub use error::{PackError, Result};
pub use fs_pack::FilesystemPack;
pub use pack::MethodologyPack;
pub use types::{ConstraintRule, ConstraintSeverity, PhaseDescriptor};
