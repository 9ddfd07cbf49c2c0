//! Config discovery and loading.

use std::path::{Path, PathBuf};

use super::{CONFIG_FILE_NAME, HoistConfig, parser};

/// Resolves which hoist.toml (if any) applies and loads it.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: Option<PathBuf>,
    explicit: bool,
}

impl ConfigStore {
    /// Discover the config file for the current directory.
    ///
    /// An explicit path wins, then `./hoist.toml`, then the user config dir.
    pub fn discover(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let project_root = std::env::current_dir()?;
        let global_dir = dirs::config_dir().map(|dir| dir.join("hoist"));
        Ok(Self::from_paths(explicit, &project_root, global_dir.as_deref()))
    }

    pub fn from_paths(
        explicit: Option<&Path>,
        project_root: &Path,
        global_dir: Option<&Path>,
    ) -> Self {
        if let Some(path) = explicit {
            return Self {
                config_path: Some(path.to_path_buf()),
                explicit: true,
            };
        }

        let candidates = std::iter::once(project_root.join(CONFIG_FILE_NAME))
            .chain(global_dir.map(|dir| dir.join(CONFIG_FILE_NAME)));
        let config_path = candidates.into_iter().find(|path| path.is_file());

        Self {
            config_path,
            explicit: false,
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Load the config, falling back to defaults when no file was found.
    ///
    /// An explicitly requested file must exist.
    pub fn load(&self) -> anyhow::Result<HoistConfig> {
        match &self.config_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), explicit = self.explicit, "loading config");
                parser::parse_hoist_toml(path)
            }
            None => {
                tracing::debug!("no hoist.toml found, using defaults");
                Ok(HoistConfig::new())
            }
        }
    }
}
