//! Filesystem primitives shared across pipeline stages.

pub mod manifest;
pub mod staging;

pub use manifest::{FileDigest, TreeManifest};
pub use staging::StagingArea;
