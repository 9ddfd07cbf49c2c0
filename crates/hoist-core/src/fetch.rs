//! Downloading the artifact matrix from the source pre-release.

use std::collections::BTreeMap;
use std::path::PathBuf;

use futures_util::future::join_all;

use crate::error::{EntryFailure, PromotionError};
use crate::fs::StagingArea;
use crate::matrix::{ArchiveFormat, MATRIX, MatrixEntry, asset_name};
use crate::release::{ReleaseHost, ReleaseRecord};
use crate::retry::RetryPolicy;

/// Staging subdirectory holding downloaded archives.
pub const DOWNLOAD_PHASE: &str = "download";

/// One downloaded source archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedAsset {
    pub entry: MatrixEntry,
    /// Location of the downloaded bytes inside the staging area
    pub path: PathBuf,
    pub source_tag: String,
    pub source_name: String,
    pub size: u64,
}

/// Fetches every matrix entry of a source release, all or nothing.
#[derive(Debug)]
pub struct AssetFetcher<'a, H: ReleaseHost + ?Sized> {
    host: &'a H,
    retry: RetryPolicy,
    format: ArchiveFormat,
}

impl<'a, H: ReleaseHost + ?Sized> AssetFetcher<'a, H> {
    pub fn new(host: &'a H, retry: RetryPolicy, format: ArchiveFormat) -> Self {
        Self {
            host,
            retry,
            format,
        }
    }

    /// Download one asset per matrix entry into `staging`.
    ///
    /// Entries are fetched concurrently. If any entry fails, everything that
    /// was downloaded is removed and the error lists every failed entry.
    pub async fn fetch(
        &self,
        source: &ReleaseRecord,
        staging: &StagingArea,
    ) -> Result<BTreeMap<MatrixEntry, FetchedAsset>, PromotionError> {
        let attached = match self
            .retry
            .run("list source assets", || self.host.release_assets(&source.tag))
            .await
        {
            Ok(names) => names,
            Err(err) => {
                let failures = MATRIX
                    .iter()
                    .map(|entry| EntryFailure {
                        entry: *entry,
                        asset_name: asset_name(&source.tag, *entry, self.format),
                        reason: format!("could not list assets: {}", err),
                    })
                    .collect();
                return Err(PromotionError::FetchFailure { failures });
            }
        };

        let results = join_all(
            MATRIX
                .iter()
                .map(|entry| self.fetch_entry(source, *entry, &attached, staging)),
        )
        .await;

        let mut fetched = BTreeMap::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(asset) => {
                    fetched.insert(asset.entry, asset);
                }
                Err(failure) => failures.push(failure),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                tracing::error!(entry = %failure.entry, asset = %failure.asset_name, reason = %failure.reason, "asset fetch failed");
            }
            if let Err(err) = staging.discard_phase(DOWNLOAD_PHASE) {
                tracing::warn!(error = %err, "failed to discard partial downloads");
            }
            return Err(PromotionError::FetchFailure { failures });
        }

        tracing::info!(source = %source.tag, count = fetched.len(), "fetched all assets");
        Ok(fetched)
    }

    async fn fetch_entry(
        &self,
        source: &ReleaseRecord,
        entry: MatrixEntry,
        attached: &[String],
        staging: &StagingArea,
    ) -> Result<FetchedAsset, EntryFailure> {
        let name = asset_name(&source.tag, entry, self.format);
        let failure = |reason: String| EntryFailure {
            entry,
            asset_name: name.clone(),
            reason,
        };

        if !attached.iter().any(|a| a == &name) {
            return Err(failure(format!("missing from release {}", source.tag)));
        }

        let what = format!("download {}", name);
        let bytes = self
            .retry
            .run(&what, || self.host.download_asset(&source.tag, &name))
            .await
            .map_err(|e| failure(e.to_string()))?;

        let dir = staging
            .entry_dir(entry, DOWNLOAD_PHASE)
            .map_err(|e| failure(format!("could not create staging directory: {}", e)))?;
        let path = dir.join(&name);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| failure(format!("could not write {}: {}", path.display(), e)))?;

        tracing::debug!(entry = %entry, asset = %name, bytes = bytes.len(), "downloaded asset");

        Ok(FetchedAsset {
            entry,
            path,
            source_tag: source.tag.clone(),
            source_name: name.clone(),
            size: bytes.len() as u64,
        })
    }
}
