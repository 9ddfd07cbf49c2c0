//! Release host interface.
//!
//! The pipeline never talks to a forge directly; it goes through
//! [`ReleaseHost`], implemented by [`GitHubHost`] for real runs and by
//! [`MemoryHost`] for tests.

pub mod github;
pub mod memory;

pub use github::GitHubHost;
pub use memory::MemoryHost;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A release record as seen on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRecord {
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub prerelease: bool,
    pub draft: bool,
    /// Attached asset names, in host order
    pub assets: Vec<String>,
}

/// Filter applied when listing releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseFilter {
    /// Keep only releases whose pre-release flag equals this value
    pub prerelease: Option<bool>,
}

impl ReleaseFilter {
    pub fn prereleases() -> Self {
        Self {
            prerelease: Some(true),
        }
    }

    pub fn matches(&self, record: &ReleaseRecord) -> bool {
        self.prerelease.is_none_or(|flag| record.prerelease == flag)
    }
}

/// Handle to a release record the pipeline is writing to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseHandle {
    pub id: u64,
    pub tag: String,
    pub draft: bool,
    pub prerelease: bool,
    /// Asset names attached when the handle was obtained
    pub assets: Vec<String>,
    /// True if the record did not exist before this call
    pub created: bool,
    /// Host-specific upload endpoint
    pub upload_url: Option<String>,
}

/// Errors reported by a release host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::Decode { .. } | Self::Other(_) => false,
        }
    }
}

/// Operations the pipeline needs from a release host.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// List releases matching `filter`.
    async fn list_releases(&self, filter: ReleaseFilter) -> Result<Vec<ReleaseRecord>, HostError>;

    /// Names of the assets currently attached to the release tagged `tag`.
    async fn release_assets(&self, tag: &str) -> Result<Vec<String>, HostError>;

    /// Download one asset of the release tagged `tag`.
    async fn download_asset(&self, tag: &str, asset: &str) -> Result<Vec<u8>, HostError>;

    /// Return the release tagged `tag`, creating it with the given flags if absent.
    ///
    /// Flags of an existing record are reported as found, not modified.
    async fn create_or_get_release(
        &self,
        tag: &str,
        draft: bool,
        prerelease: bool,
    ) -> Result<ReleaseHandle, HostError>;

    async fn upload_asset(
        &self,
        release: &ReleaseHandle,
        name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), HostError>;

    async fn delete_release(&self, release: &ReleaseHandle) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(prerelease: bool) -> ReleaseRecord {
        ReleaseRecord {
            tag: "v1.0.0".to_string(),
            created_at: Utc::now(),
            prerelease,
            draft: false,
            assets: Vec::new(),
        }
    }

    #[test]
    fn filter_matches_prerelease_flag() {
        let filter = ReleaseFilter::prereleases();
        assert!(filter.matches(&record(true)));
        assert!(!filter.matches(&record(false)));
        assert!(ReleaseFilter::default().matches(&record(false)));
    }

    #[test]
    fn transient_errors_are_classified() {
        let server = HostError::Status {
            status: 502,
            url: "u".to_string(),
        };
        let limited = HostError::Status {
            status: 429,
            url: "u".to_string(),
        };
        let forbidden = HostError::Status {
            status: 403,
            url: "u".to_string(),
        };
        assert!(server.is_transient());
        assert!(limited.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!HostError::NotFound("x".to_string()).is_transient());
    }
}
