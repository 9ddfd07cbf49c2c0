//! Publishing repackaged assets as the target release.

use std::collections::{BTreeMap, BTreeSet};

use futures_util::future::join_all;
use serde::Serialize;

use crate::error::PublishError;
use crate::matrix::{self, MatrixEntry};
use crate::release::{ReleaseHandle, ReleaseHost};
use crate::repackage::RepackagedAsset;
use crate::retry::RetryPolicy;

/// The published release record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRelease {
    pub tag: String,
    pub draft: bool,
    pub prerelease: bool,
    /// Every asset now attached, in matrix order
    pub assets: Vec<String>,
    /// Assets uploaded by this run
    pub uploaded: Vec<String>,
    /// The record already held every asset before this run
    pub already_published: bool,
}

#[derive(Debug)]
pub struct ReleasePublisher<'a, H: ReleaseHost + ?Sized> {
    host: &'a H,
    retry: RetryPolicy,
    rollback_partial: bool,
}

impl<'a, H: ReleaseHost + ?Sized> ReleasePublisher<'a, H> {
    pub fn new(host: &'a H, retry: RetryPolicy) -> Self {
        Self {
            host,
            retry,
            rollback_partial: false,
        }
    }

    /// Delete a record this run created when its uploads fail.
    pub fn with_rollback(mut self, rollback_partial: bool) -> Self {
        self.rollback_partial = rollback_partial;
        self
    }

    /// Create (or resume) the draft release `target_tag` holding exactly `assets`.
    pub async fn publish(
        &self,
        target_tag: &str,
        is_forced: bool,
        assets: &BTreeMap<MatrixEntry, RepackagedAsset>,
    ) -> Result<TargetRelease, PublishError> {
        matrix::ensure_complete(assets).map_err(|e| PublishError::Incompatible {
            tag: target_tag.to_string(),
            detail: e.to_string(),
        })?;

        let expected: Vec<String> = assets.values().map(|a| a.name.clone()).collect();

        let handle = self
            .retry
            .run("create release", || {
                self.host.create_or_get_release(target_tag, true, is_forced)
            })
            .await
            .map_err(|source| PublishError::Create {
                tag: target_tag.to_string(),
                source,
            })?;

        if handle.created {
            tracing::info!(tag = target_tag, prerelease = is_forced, "created draft release");
        } else {
            check_existing(&handle, is_forced, &expected)?;
        }

        let existing: BTreeSet<&str> = handle.assets.iter().map(String::as_str).collect();
        let pending: Vec<&RepackagedAsset> = assets
            .values()
            .filter(|a| !existing.contains(a.name.as_str()))
            .collect();

        if pending.is_empty() {
            tracing::info!(tag = target_tag, "release already holds every asset, nothing to upload");
            return Ok(TargetRelease {
                tag: handle.tag.clone(),
                draft: handle.draft,
                prerelease: handle.prerelease,
                assets: expected,
                uploaded: Vec::new(),
                already_published: true,
            });
        }
        if !handle.created {
            tracing::warn!(
                tag = target_tag,
                present = existing.len(),
                missing = pending.len(),
                "resuming partially published release"
            );
        }

        let results = join_all(pending.iter().map(|asset| self.upload(&handle, asset))).await;

        let mut uploaded = Vec::new();
        let mut failures = Vec::new();
        for (asset, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => uploaded.push(asset.name.clone()),
                Err(reason) => {
                    tracing::error!(asset = %asset.name, reason = %reason, "upload failed");
                    failures.push(format!("{} ({})", asset.name, reason));
                }
            }
        }

        if !failures.is_empty() {
            let partial_publish = !self.roll_back(&handle).await;
            return Err(PublishError::Upload {
                tag: target_tag.to_string(),
                failures,
                partial_publish,
            });
        }

        tracing::info!(tag = target_tag, uploaded = uploaded.len(), "published release");
        Ok(TargetRelease {
            tag: handle.tag.clone(),
            draft: handle.draft,
            prerelease: handle.prerelease,
            assets: expected,
            uploaded,
            already_published: false,
        })
    }

    async fn upload(&self, handle: &ReleaseHandle, asset: &RepackagedAsset) -> Result<(), String> {
        let bytes = tokio::fs::read(&asset.path)
            .await
            .map_err(|e| format!("could not read {}: {}", asset.path.display(), e))?;
        let what = format!("upload {}", asset.name);
        self.retry
            .run(&what, || self.host.upload_asset(handle, &asset.name, bytes.clone()))
            .await
            .map_err(|e| e.to_string())
    }

    /// Try to delete a record this run created. Returns true if it is gone.
    async fn roll_back(&self, handle: &ReleaseHandle) -> bool {
        if !self.rollback_partial || !handle.created {
            return false;
        }
        match self
            .retry
            .run("delete release", || self.host.delete_release(handle))
            .await
        {
            Ok(()) => {
                tracing::warn!(tag = %handle.tag, "rolled back partially published release");
                true
            }
            Err(err) => {
                tracing::error!(tag = %handle.tag, error = %err, "rollback failed");
                false
            }
        }
    }
}

/// An existing record may only hold a subset of the expected assets.
fn check_existing(
    handle: &ReleaseHandle,
    is_forced: bool,
    expected: &[String],
) -> Result<(), PublishError> {
    if handle.prerelease != is_forced {
        return Err(PublishError::Incompatible {
            tag: handle.tag.clone(),
            detail: format!(
                "prerelease flag is {}, expected {}",
                handle.prerelease, is_forced
            ),
        });
    }

    let unexpected: Vec<&str> = handle
        .assets
        .iter()
        .filter(|name| !expected.contains(name))
        .map(String::as_str)
        .collect();
    if !unexpected.is_empty() {
        return Err(PublishError::Incompatible {
            tag: handle.tag.clone(),
            detail: format!("unexpected assets: {}", unexpected.join(", ")),
        });
    }
    Ok(())
}
