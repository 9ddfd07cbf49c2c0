//! Tag classification.
//!
//! Decides from the tag text alone whether a tag triggers promotion and
//! whether it is a forced release. Classification never fails: a tag that
//! matches nothing simply does not promote.

use anyhow::Context;
use regex::Regex;
use serde::Serialize;

/// Default pattern every release tag must match.
pub const DEFAULT_RELEASE_PATTERN: &str = r"^v[0-9]+\.[0-9]+\.[0-9]+";
/// Default pre-release suffix, e.g. `v1.2.0-pre3`.
pub const DEFAULT_PRE_RELEASE_PATTERN: &str = r"-pre[0-9]*([-.+]|$)";
/// Default override marker, e.g. `v1.2.0-force-release`.
pub const DEFAULT_FORCED_PATTERN: &str = r"force-release";

/// Result of classifying a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub should_promote: bool,
    pub is_forced: bool,
}

/// A classified tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub raw: String,
    /// Semantic version, if the text (minus one leading `v`) parses as one
    pub version: Option<semver::Version>,
    pub is_pre_release: bool,
    pub is_forced: bool,
    pub matches_release: bool,
}

impl Tag {
    pub fn classification(&self) -> Classification {
        Classification {
            should_promote: self.matches_release && (!self.is_pre_release || self.is_forced),
            is_forced: self.is_forced,
        }
    }
}

/// Compiled tag patterns.
#[derive(Debug, Clone)]
pub struct TagRules {
    release: Regex,
    pre_release: Regex,
    forced: Regex,
}

impl TagRules {
    /// Compile the three patterns, failing on invalid regex syntax.
    pub fn new(release: &str, pre_release: &str, forced: &str) -> anyhow::Result<Self> {
        Ok(Self {
            release: Regex::new(release)
                .with_context(|| format!("Invalid release tag pattern: {}", release))?,
            pre_release: Regex::new(pre_release)
                .with_context(|| format!("Invalid pre-release tag pattern: {}", pre_release))?,
            forced: Regex::new(forced)
                .with_context(|| format!("Invalid forced-release tag pattern: {}", forced))?,
        })
    }

    /// Parse and classify `text`.
    pub fn parse(&self, text: &str) -> Tag {
        Tag {
            raw: text.to_string(),
            version: parse_version(text),
            is_pre_release: self.pre_release.is_match(text),
            is_forced: self.forced.is_match(text),
            matches_release: self.release.is_match(text),
        }
    }

    pub fn classify(&self, text: &str) -> Classification {
        self.parse(text).classification()
    }
}

impl Default for TagRules {
    fn default() -> Self {
        Self {
            release: Regex::new(DEFAULT_RELEASE_PATTERN).expect("default release pattern"),
            pre_release: Regex::new(DEFAULT_PRE_RELEASE_PATTERN)
                .expect("default pre-release pattern"),
            forced: Regex::new(DEFAULT_FORCED_PATTERN).expect("default forced pattern"),
        }
    }
}

/// Parse a tag as semver, tolerating a single leading `v`.
pub fn parse_version(text: &str) -> Option<semver::Version> {
    let trimmed = text.strip_prefix('v').unwrap_or(text);
    semver::Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_release_promotes() {
        let rules = TagRules::default();
        let c = rules.classify("v1.2.0");
        assert!(c.should_promote);
        assert!(!c.is_forced);
    }

    #[test]
    fn pre_release_does_not_promote() {
        let rules = TagRules::default();
        for tag in ["v1.2.0-pre4", "v1.2.0-pre", "v0.9.1-pre12.build"] {
            let c = rules.classify(tag);
            assert!(!c.should_promote, "{} should not promote", tag);
            assert!(!c.is_forced);
        }
    }

    #[test]
    fn forced_pre_release_promotes() {
        let rules = TagRules::default();
        let c = rules.classify("v1.2.0-pre2-force-release");
        assert!(c.should_promote);
        assert!(c.is_forced);
    }

    #[test]
    fn forced_without_pre_release_promotes() {
        let rules = TagRules::default();
        let c = rules.classify("v1.2.0-force-release");
        assert!(c.should_promote);
        assert!(c.is_forced);
    }

    #[test]
    fn malformed_tags_do_not_promote() {
        let rules = TagRules::default();
        for tag in ["", "latest", "1.2.0", "v1.2", "release-force-release", "v\u{0}"] {
            assert!(!rules.classify(tag).should_promote, "{:?}", tag);
        }
        // Forced marker is reported even when the tag is not a release tag
        assert!(rules.classify("nightly-force-release").is_forced);
    }

    #[test]
    fn preview_suffix_is_not_pre_release() {
        let rules = TagRules::default();
        let tag = rules.parse("v1.2.0-preview");
        assert!(!tag.is_pre_release);
        assert!(tag.classification().should_promote);
    }

    #[test]
    fn parses_semver_when_possible() {
        let rules = TagRules::default();
        let tag = rules.parse("v1.2.0-pre3");
        assert_eq!(tag.version, Some(semver::Version::parse("1.2.0-pre3").unwrap()));
        assert!(rules.parse("v1.2.0-pre3-Linux").version.is_some());
        assert!(rules.parse("v1.2").version.is_none());
    }

    #[test]
    fn classification_is_deterministic() {
        let rules = TagRules::default();
        assert_eq!(rules.classify("v3.0.0-pre1"), rules.classify("v3.0.0-pre1"));
    }

    #[test]
    fn custom_patterns_are_honored() {
        let rules = TagRules::new(r"^release/", r"-rc", r"-ship-it$").unwrap();
        assert!(rules.classify("release/2024").should_promote);
        assert!(!rules.classify("release/2024-rc").should_promote);
        assert!(rules.classify("release/2024-rc-ship-it").should_promote);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(TagRules::new("(", "-pre", "force").is_err());
    }
}
