//! High-level commands for hoist operations.
//!
//! Each command takes a [`CommandContext`] and returns a serializable report
//! for the CLI to render.

pub mod audit;
pub mod classify;
pub mod context;
pub mod matrix;
pub mod promote;

pub use audit::AuditCommand;
pub use classify::{ClassifyCommand, ClassifyReport};
pub use context::{CommandContext, Overrides};
pub use matrix::{MatrixAsset, MatrixCommand, MatrixReport};
pub use promote::{PromoteCommand, PromoteOptions};

pub use crate::audit::AuditReport;
