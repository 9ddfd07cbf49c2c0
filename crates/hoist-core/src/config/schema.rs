//! Configuration schema for hoist.toml
//!
//! Every section is optional; a missing file is equivalent to an empty one.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::job::JobOptions;
use crate::matrix::ArchiveFormat;
use crate::retry::RetryPolicy;
use crate::tag::{
    DEFAULT_FORCED_PATTERN, DEFAULT_PRE_RELEASE_PATTERN, DEFAULT_RELEASE_PATTERN, TagRules,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Root configuration structure for hoist.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HoistConfig {
    pub repository: RepositoryConfig,
    pub tags: TagsConfig,
    pub artifacts: ArtifactsConfig,
    pub retry: RetryPolicy,
    pub publish: PublishConfig,
    pub staging: StagingConfig,
}

/// Where releases live and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub api_url: String,
    /// Environment variable holding the API token
    pub token_env: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: None,
            name: None,
            api_url: DEFAULT_API_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl RepositoryConfig {
    pub fn owner_and_name(&self) -> anyhow::Result<(&str, &str)> {
        match (self.owner.as_deref(), self.name.as_deref()) {
            (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => {
                Ok((owner, name))
            }
            _ => anyhow::bail!(
                "Repository is not configured. Set [repository] owner and name in hoist.toml or pass --repo owner/name"
            ),
        }
    }

    /// Apply an `owner/name` slug, as given on the command line.
    pub fn set_slug(&mut self, slug: &str) -> anyhow::Result<()> {
        let (owner, name) = slug
            .split_once('/')
            .filter(|(o, n)| !o.is_empty() && !n.is_empty() && !n.contains('/'))
            .ok_or_else(|| anyhow::anyhow!("Invalid repository '{}', expected owner/name", slug))?;
        self.owner = Some(owner.to_string());
        self.name = Some(name.to_string());
        Ok(())
    }

    /// Token read from `token_env`, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Tag classification patterns (regular expressions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    pub release: String,
    pub pre_release: String,
    pub forced: String,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            release: DEFAULT_RELEASE_PATTERN.to_string(),
            pre_release: DEFAULT_PRE_RELEASE_PATTERN.to_string(),
            forced: DEFAULT_FORCED_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PublishConfig {
    /// Delete a release created by a run whose uploads failed
    pub rollback_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StagingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl HoistConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile the tag patterns.
    pub fn tag_rules(&self) -> anyhow::Result<TagRules> {
        TagRules::new(&self.tags.release, &self.tags.pre_release, &self.tags.forced)
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            retry: self.retry,
            format: self.artifacts.format,
            rollback_partial: self.publish.rollback_partial,
            staging_dir: self.staging.dir.clone(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.repository.api_url)
            .with_context(|| format!("Invalid repository.api_url: {}", self.repository.api_url))?;

        if self.repository.token_env.trim().is_empty() {
            anyhow::bail!("repository.token_env must not be empty");
        }

        if self.repository.owner.is_some() != self.repository.name.is_some() {
            anyhow::bail!("repository.owner and repository.name must be set together");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms
            );
        }

        self.tag_rules().context("Invalid [tags] pattern")?;
        Ok(())
    }
}
