//! Error taxonomy of the promotion pipeline.

use crate::matrix::MatrixEntry;
use crate::release::HostError;

/// Why a single matrix entry could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFailure {
    pub entry: MatrixEntry,
    pub asset_name: String,
    pub reason: String,
}

impl std::fmt::Display for EntryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}: {})", self.entry, self.asset_name, self.reason)
    }
}

fn join_failures(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure while turning a fetched archive into its repackaged form.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("archive is corrupt: {0}")]
    Corrupt(String),

    #[error("archive contains no files")]
    Empty,

    #[error("repackaged archive does not match extracted tree: {0}")]
    Mismatch(String),

    #[error("staging I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while creating or populating the target release.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("release {tag} already exists with an incompatible state: {detail}")]
    Incompatible { tag: String, detail: String },

    #[error("could not create or look up release {tag}: {source}")]
    Create {
        tag: String,
        #[source]
        source: HostError,
    },

    #[error("failed to upload {} asset(s) to {tag}: {}", failures.len(), failures.join(", "))]
    Upload {
        tag: String,
        failures: Vec<String>,
        partial_publish: bool,
    },
}

impl PublishError {
    /// Whether the release host may hold a record with a subset of the assets.
    pub fn partial_publish(&self) -> bool {
        match self {
            Self::Upload {
                partial_publish, ..
            } => *partial_publish,
            Self::Incompatible { .. } | Self::Create { .. } => false,
        }
    }
}

/// Terminal failure of a promotion job.
#[derive(Debug, thiserror::Error)]
pub enum PromotionError {
    #[error("no pre-release found to promote")]
    SourceNotFound,

    #[error("failed to query pre-releases: {0}")]
    Locate(#[source] HostError),

    #[error("failed to fetch {} asset(s): {}", failures.len(), join_failures(failures))]
    FetchFailure { failures: Vec<EntryFailure> },

    #[error("failed to repackage {entry}: {source}")]
    Extraction {
        entry: MatrixEntry,
        #[source]
        source: ExtractionError,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("failed to prepare staging area: {0}")]
    Staging(#[source] std::io::Error),

    #[error("promotion cancelled")]
    Cancelled,
}

impl PromotionError {
    pub fn partial_publish(&self) -> bool {
        match self {
            Self::Publish(err) => err.partial_publish(),
            _ => false,
        }
    }
}
