//! Selecting the pre-release to promote.

use std::cmp::Ordering;

use crate::error::PromotionError;
use crate::release::{ReleaseFilter, ReleaseHost, ReleaseRecord};
use crate::retry::RetryPolicy;
use crate::tag::parse_version;

/// Finds the most recent published pre-release on the host.
#[derive(Debug)]
pub struct SourceReleaseLocator<'a, H: ReleaseHost + ?Sized> {
    host: &'a H,
    retry: RetryPolicy,
}

impl<'a, H: ReleaseHost + ?Sized> SourceReleaseLocator<'a, H> {
    pub fn new(host: &'a H, retry: RetryPolicy) -> Self {
        Self { host, retry }
    }

    pub async fn locate(&self) -> Result<ReleaseRecord, PromotionError> {
        let releases = self
            .retry
            .run("list pre-releases", || {
                self.host.list_releases(ReleaseFilter::prereleases())
            })
            .await
            .map_err(PromotionError::Locate)?;

        tracing::debug!(candidates = releases.len(), "listed pre-releases");

        let selected = select_latest(&releases).ok_or(PromotionError::SourceNotFound)?;
        tracing::info!(
            source = %selected.tag,
            created_at = %selected.created_at,
            "selected source pre-release"
        );
        Ok(selected.clone())
    }
}

/// Pick the newest non-draft pre-release from `releases`.
///
/// Order of `releases` is irrelevant. Ties on `created_at` go to the tag
/// that sorts later: by semver when both tags parse, otherwise bytewise.
pub fn select_latest(releases: &[ReleaseRecord]) -> Option<&ReleaseRecord> {
    releases
        .iter()
        .filter(|r| r.prerelease && !r.draft)
        .max_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| compare_tags(&a.tag, &b.tag))
        })
}

/// Total order over tag names used to break timestamp ties.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn release(tag: &str, created_at: DateTime<Utc>, prerelease: bool, draft: bool) -> ReleaseRecord {
        ReleaseRecord {
            tag: tag.to_string(),
            created_at,
            prerelease,
            draft,
            assets: Vec::new(),
        }
    }

    #[test]
    fn picks_most_recent_regardless_of_order() {
        let releases = vec![
            release("v1.2.0-pre3", at(30), true, false),
            release("v1.2.0-pre1", at(10), true, false),
            release("v1.2.0-pre2", at(20), true, false),
        ];
        assert_eq!(select_latest(&releases).unwrap().tag, "v1.2.0-pre3");

        let mut reversed = releases.clone();
        reversed.reverse();
        assert_eq!(select_latest(&reversed).unwrap().tag, "v1.2.0-pre3");
    }

    #[test]
    fn ties_break_on_later_tag() {
        let releases = vec![
            release("v1.2.0-pre4", at(5), true, false),
            release("v1.2.0-pre5", at(5), true, false),
            release("v1.1.9-pre9", at(5), true, false),
        ];
        assert_eq!(select_latest(&releases).unwrap().tag, "v1.2.0-pre5");
    }

    #[test]
    fn semver_beats_lexicographic_on_ties() {
        // Lexicographically "v1.10.0" < "v1.9.0", by semver it is later
        let releases = vec![
            release("v1.9.0-pre1", at(0), true, false),
            release("v1.10.0-pre1", at(0), true, false),
        ];
        assert_eq!(select_latest(&releases).unwrap().tag, "v1.10.0-pre1");
    }

    #[test]
    fn non_semver_tags_tie_break_lexicographically() {
        let releases = vec![
            release("nightly-b", at(0), true, false),
            release("nightly-a", at(0), true, false),
        ];
        assert_eq!(select_latest(&releases).unwrap().tag, "nightly-b");
    }

    #[test]
    fn drafts_and_full_releases_are_ignored() {
        let releases = vec![
            release("v1.2.0", at(50), false, false),
            release("v1.3.0-force-release", at(40), true, true),
            release("v1.2.0-pre1", at(10), true, false),
        ];
        assert_eq!(select_latest(&releases).unwrap().tag, "v1.2.0-pre1");
    }

    #[test]
    fn empty_set_has_no_selection() {
        assert!(select_latest(&[]).is_none());
        assert!(select_latest(&[release("v1.0.0", at(0), false, false)]).is_none());
    }
}
