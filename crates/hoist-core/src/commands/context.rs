//! Command context: the loaded configuration plus command-line overrides.

use std::path::Path;

use crate::config::{ConfigStore, HoistConfig};
use crate::matrix::ArchiveFormat;
use crate::release::GitHubHost;

/// Overrides given on the command line, applied on top of hoist.toml.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// `owner/name`
    pub repo: Option<String>,
    pub format: Option<ArchiveFormat>,
}

#[derive(Debug, Clone)]
pub struct CommandContext {
    config: HoistConfig,
}

impl CommandContext {
    pub fn new(config: HoistConfig) -> Self {
        Self { config }
    }

    /// Discover and load hoist.toml, then apply `overrides`.
    pub fn load(config_path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let store = ConfigStore::discover(config_path)?;
        let config = store.load()?;
        Self::with_overrides(config, overrides)
    }

    pub fn with_overrides(mut config: HoistConfig, overrides: &Overrides) -> anyhow::Result<Self> {
        if let Some(repo) = &overrides.repo {
            config.repository.set_slug(repo)?;
        }
        if let Some(format) = overrides.format {
            config.artifacts.format = format;
        }
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &HoistConfig {
        &self.config
    }

    /// Connect to the configured GitHub repository.
    pub fn github_host(&self) -> anyhow::Result<GitHubHost> {
        let repository = &self.config.repository;
        let token = repository.token();
        if token.is_none() {
            tracing::warn!(
                env = %repository.token_env,
                "no API token set, drafts are invisible and uploads will fail"
            );
        }
        GitHubHost::new(repository, token)
    }
}
