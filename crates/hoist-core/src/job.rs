//! The promotion job state machine.
//!
//! ```text
//! Triggered -> Classified -> Located -> Fetched -> Repackaged -> Published -> Done
//!                  |            \__________\___________\____________\_____> Failed
//!                  +--(not eligible)--> Done
//! ```
//!
//! Every failure is turned into a [`JobOutcome::Failed`] at this boundary and
//! the staging area is removed whatever the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::Instrument;

use crate::error::PromotionError;
use crate::fetch::{AssetFetcher, DOWNLOAD_PHASE};
use crate::fs::StagingArea;
use crate::locate::SourceReleaseLocator;
use crate::matrix::ArchiveFormat;
use crate::publish::{ReleasePublisher, TargetRelease};
use crate::release::{ReleaseHost, ReleaseRecord};
use crate::repackage::{EXTRACT_PHASE, Repackager};
use crate::retry::RetryPolicy;
use crate::tag::{Tag, TagRules};

/// A tag-creation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagEvent {
    pub tag: String,
    /// Commit or ref the tag points at, when known
    pub reference: Option<String>,
}

impl TagEvent {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Triggered,
    Classified,
    Located,
    Fetched,
    Repackaged,
    Published,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Skipped {
        tag: String,
        reason: String,
    },
    Succeeded {
        source: String,
        release: TargetRelease,
    },
    Failed {
        /// Last state reached before failing
        state: JobState,
        reason: String,
        partial_publish: bool,
    },
}

impl JobOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Shared flag for cancelling a running job between states.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tunables of a job run.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub retry: RetryPolicy,
    pub format: ArchiveFormat,
    pub rollback_partial: bool,
    /// Parent directory for the staging area; system temp dir when unset
    pub staging_dir: Option<PathBuf>,
}

/// One promotion run for one tag event.
#[derive(Debug)]
pub struct PromotionJob<'a, H: ReleaseHost + ?Sized> {
    host: &'a H,
    rules: TagRules,
    options: JobOptions,
    cancel: CancelFlag,
    history: Vec<JobState>,
}

impl<'a, H: ReleaseHost + ?Sized> PromotionJob<'a, H> {
    pub fn new(host: &'a H, rules: TagRules, options: JobOptions) -> Self {
        Self {
            host,
            rules,
            options,
            cancel: CancelFlag::new(),
            history: Vec::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// States visited so far, in order.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn state(&self) -> Option<JobState> {
        self.history.last().copied()
    }

    fn enter(&mut self, state: JobState) {
        tracing::info!(state = ?state, "promotion state");
        self.history.push(state);
    }

    fn checkpoint(&self) -> Result<(), PromotionError> {
        if self.cancel.is_cancelled() {
            return Err(PromotionError::Cancelled);
        }
        Ok(())
    }

    /// Drive the job to a terminal state.
    pub async fn run(&mut self, event: &TagEvent) -> JobOutcome {
        let span = tracing::info_span!("promote", tag = %event.tag);
        self.drive(event).instrument(span).await
    }

    async fn drive(&mut self, event: &TagEvent) -> JobOutcome {
        if let Some(reference) = &event.reference {
            tracing::debug!(reference = %reference, "tag event received");
        }

        self.enter(JobState::Triggered);
        let tag = self.rules.parse(&event.tag);
        let classification = tag.classification();
        self.enter(JobState::Classified);

        if !classification.should_promote {
            let reason = skip_reason(&tag);
            tracing::info!(reason = %reason, "tag not eligible for promotion");
            self.enter(JobState::Done);
            return JobOutcome::Skipped {
                tag: tag.raw,
                reason,
            };
        }

        match self.promote(&tag, classification.is_forced).await {
            Ok((source, release)) => {
                self.enter(JobState::Done);
                JobOutcome::Succeeded {
                    source: source.tag,
                    release,
                }
            }
            Err(err) => {
                let state = self.state().unwrap_or(JobState::Triggered);
                let partial_publish = err.partial_publish();
                tracing::error!(state = ?state, partial_publish, error = %err, "promotion failed");
                self.enter(JobState::Failed);
                JobOutcome::Failed {
                    state,
                    reason: err.to_string(),
                    partial_publish,
                }
            }
        }
    }

    async fn promote(
        &mut self,
        tag: &Tag,
        is_forced: bool,
    ) -> Result<(ReleaseRecord, TargetRelease), PromotionError> {
        let host = self.host;
        let retry = self.options.retry;

        self.checkpoint()?;
        let source = SourceReleaseLocator::new(host, retry).locate().await?;
        self.enter(JobState::Located);

        self.checkpoint()?;
        let staging = StagingArea::new(self.options.staging_dir.as_deref())
            .map_err(PromotionError::Staging)?;
        tracing::debug!(path = %staging.path().display(), "staging area ready");

        let result = self.stage_and_publish(&source, tag, is_forced, &staging).await;

        if let Err(err) = staging.close() {
            tracing::warn!(error = %err, "failed to remove staging area");
        }
        result.map(|release| (source, release))
    }

    async fn stage_and_publish(
        &mut self,
        source: &ReleaseRecord,
        tag: &Tag,
        is_forced: bool,
        staging: &StagingArea,
    ) -> Result<TargetRelease, PromotionError> {
        let host = self.host;
        let retry = self.options.retry;
        let format = self.options.format;

        let fetched = AssetFetcher::new(host, retry, format)
            .fetch(source, staging)
            .await?;
        self.enter(JobState::Fetched);

        self.checkpoint()?;
        let repackaged = Repackager::new(format)
            .repackage_all(&fetched, &tag.raw, staging)
            .await?;
        drop(fetched);
        for phase in [DOWNLOAD_PHASE, EXTRACT_PHASE] {
            if let Err(err) = staging.discard_phase(phase) {
                tracing::warn!(phase, error = %err, "failed to discard staging data");
            }
        }
        self.enter(JobState::Repackaged);

        self.checkpoint()?;
        let release = ReleasePublisher::new(host, retry)
            .with_rollback(self.options.rollback_partial)
            .publish(&tag.raw, is_forced, &repackaged)
            .await?;
        self.enter(JobState::Published);
        Ok(release)
    }
}

fn skip_reason(tag: &Tag) -> String {
    if !tag.matches_release {
        format!("{} does not match the release tag pattern", tag.raw)
    } else {
        format!("{} is a pre-release tag without a force marker", tag.raw)
    }
}
