//! Re-archiving fetched assets under the target tag.
//!
//! Repackaging changes the container name and nothing else: the output is
//! read back and its manifest must equal the manifest of the extracted tree
//! before the asset is handed to the publisher.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures_util::future::join_all;

use crate::archive;
use crate::error::{ExtractionError, PromotionError};
use crate::fetch::FetchedAsset;
use crate::fs::{StagingArea, TreeManifest};
use crate::matrix::{ArchiveFormat, MatrixEntry, asset_name};

/// Staging subdirectory an archive is extracted into.
pub const EXTRACT_PHASE: &str = "extract";
/// Staging subdirectory holding the re-archived output.
pub const OUTPUT_PHASE: &str = "output";

/// A verified archive ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackagedAsset {
    pub entry: MatrixEntry,
    /// `<targetTag>-<platform>-<network>.<ext>`
    pub name: String,
    pub path: PathBuf,
    pub source_name: String,
    pub file_count: usize,
    /// Digest of the archived tree, identical for source and output
    pub tree_digest: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Repackager {
    format: ArchiveFormat,
}

impl Repackager {
    pub fn new(format: ArchiveFormat) -> Self {
        Self { format }
    }

    /// Repackage a single asset on the current thread.
    pub fn repackage(
        &self,
        fetched: &FetchedAsset,
        target_tag: &str,
        staging: &StagingArea,
    ) -> Result<RepackagedAsset, ExtractionError> {
        let extract_dir = staging.entry_dir(fetched.entry, EXTRACT_PHASE)?;
        let output_dir = staging.entry_dir(fetched.entry, OUTPUT_PHASE)?;
        repackage_in(self.format, fetched, target_tag, &extract_dir, &output_dir)
    }

    /// Repackage every fetched asset concurrently on blocking threads.
    ///
    /// On any failure all extraction and output directories are removed and
    /// the first failing entry (in matrix order) is reported.
    pub async fn repackage_all(
        &self,
        fetched: &BTreeMap<MatrixEntry, FetchedAsset>,
        target_tag: &str,
        staging: &StagingArea,
    ) -> Result<BTreeMap<MatrixEntry, RepackagedAsset>, PromotionError> {
        let mut tasks = Vec::with_capacity(fetched.len());
        for (entry, asset) in fetched {
            let dirs = staging
                .entry_dir(*entry, EXTRACT_PHASE)
                .and_then(|extract| Ok((extract, staging.entry_dir(*entry, OUTPUT_PHASE)?)));
            let (extract_dir, output_dir) = match dirs {
                Ok(dirs) => dirs,
                Err(err) => {
                    discard(staging);
                    return Err(PromotionError::Extraction {
                        entry: *entry,
                        source: err.into(),
                    });
                }
            };

            let format = self.format;
            let asset = asset.clone();
            let target_tag = target_tag.to_string();
            let entry = *entry;
            tasks.push(async move {
                let result = tokio::task::spawn_blocking(move || {
                    repackage_in(format, &asset, &target_tag, &extract_dir, &output_dir)
                })
                .await
                .unwrap_or_else(|join| Err(ExtractionError::Io(std::io::Error::other(join))));
                (entry, result)
            });
        }

        let mut repackaged = BTreeMap::new();
        let mut first_failure = None;
        for (entry, result) in join_all(tasks).await {
            match result {
                Ok(asset) => {
                    repackaged.insert(entry, asset);
                }
                Err(err) => {
                    tracing::error!(entry = %entry, error = %err, "repackaging failed");
                    if first_failure.is_none() {
                        first_failure = Some((entry, err));
                    }
                }
            }
        }

        if let Some((entry, source)) = first_failure {
            discard(staging);
            return Err(PromotionError::Extraction { entry, source });
        }

        Ok(repackaged)
    }
}

fn discard(staging: &StagingArea) {
    for phase in [EXTRACT_PHASE, OUTPUT_PHASE] {
        if let Err(err) = staging.discard_phase(phase) {
            tracing::warn!(phase, error = %err, "failed to discard staging data");
        }
    }
}

fn repackage_in(
    format: ArchiveFormat,
    fetched: &FetchedAsset,
    target_tag: &str,
    extract_dir: &Path,
    output_dir: &Path,
) -> Result<RepackagedAsset, ExtractionError> {
    archive::extract(format, &fetched.path, extract_dir)?;

    let extracted = TreeManifest::from_dir(extract_dir)
        .map_err(|e| ExtractionError::Corrupt(format!("{:#}", e)))?;
    if extracted.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let name = asset_name(target_tag, fetched.entry, format);
    let path = output_dir.join(&name);
    archive::create(format, extract_dir, &path)?;

    let stored = archive::read_manifest(format, &path)?;
    let differences = extracted.differences(&stored);
    if !differences.is_empty() {
        return Err(ExtractionError::Mismatch(differences.join("; ")));
    }

    tracing::info!(
        entry = %fetched.entry,
        from = %fetched.source_name,
        to = %name,
        files = extracted.file_count(),
        "repackaged asset"
    );

    Ok(RepackagedAsset {
        entry: fetched.entry,
        name,
        path,
        source_name: fetched.source_name.clone(),
        file_count: extracted.file_count(),
        tree_digest: extracted.digest(),
    })
}
