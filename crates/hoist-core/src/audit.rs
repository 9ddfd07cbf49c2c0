//! Reconciling a published release against the artifact matrix.
//!
//! Used to confirm a promotion landed completely, or to see what a
//! partially published record still lacks before re-running the job.

use serde::Serialize;

use crate::matrix::{ArchiveFormat, expected_asset_names};
use crate::release::{HostError, ReleaseFilter, ReleaseHost};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub tag: String,
    pub draft: bool,
    pub prerelease: bool,
    /// Expected names that are not attached
    pub missing: Vec<String>,
    /// Attached names outside the matrix
    pub unexpected: Vec<String>,
    pub complete: bool,
}

/// Compare the assets attached to `tag` with the names the matrix requires.
pub async fn audit_release<H: ReleaseHost + ?Sized>(
    host: &H,
    tag: &str,
    format: ArchiveFormat,
    retry: RetryPolicy,
) -> Result<AuditReport, HostError> {
    let releases = retry
        .run("list releases", || host.list_releases(ReleaseFilter::default()))
        .await?;
    let record = releases
        .into_iter()
        .find(|r| r.tag == tag)
        .ok_or_else(|| HostError::NotFound(format!("release {}", tag)))?;

    let expected = expected_asset_names(tag, format);
    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !record.assets.contains(name))
        .cloned()
        .collect();
    let unexpected: Vec<String> = record
        .assets
        .iter()
        .filter(|name| !expected.contains(name))
        .cloned()
        .collect();

    let complete = missing.is_empty() && unexpected.is_empty();
    if complete {
        tracing::info!(tag, "release holds exactly the expected assets");
    } else {
        tracing::warn!(
            tag,
            missing = missing.len(),
            unexpected = unexpected.len(),
            "release does not match the artifact matrix"
        );
    }

    Ok(AuditReport {
        tag: record.tag,
        draft: record.draft,
        prerelease: record.prerelease,
        missing,
        unexpected,
        complete,
    })
}
