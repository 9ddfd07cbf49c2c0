//! Hoist Core Library
//!
//! Promotes a validated pre-release to a versioned draft release: classifies
//! the triggering tag, locates the newest pre-release, fetches the fixed
//! artifact matrix, repackages every archive under the new tag, and publishes
//! the result as a single release record.

pub mod archive;
pub mod audit;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod job;
pub mod locate;
pub mod matrix;
pub mod publish;
pub mod release;
pub mod repackage;
pub mod retry;
pub mod tag;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, HoistConfig, RepositoryConfig};

    // Tags
    pub use crate::tag::{Classification, Tag, TagRules};

    // Matrix
    pub use crate::matrix::{ArchiveFormat, MATRIX, MatrixEntry, Network, Platform};

    // Release host
    pub use crate::release::{
        GitHubHost, HostError, MemoryHost, ReleaseFilter, ReleaseHandle, ReleaseHost,
        ReleaseRecord,
    };

    // Pipeline
    pub use crate::error::{ExtractionError, PromotionError, PublishError};
    pub use crate::fetch::{AssetFetcher, FetchedAsset};
    pub use crate::job::{CancelFlag, JobOptions, JobOutcome, JobState, PromotionJob, TagEvent};
    pub use crate::locate::SourceReleaseLocator;
    pub use crate::publish::{ReleasePublisher, TargetRelease};
    pub use crate::repackage::{RepackagedAsset, Repackager};
    pub use crate::retry::RetryPolicy;
}
