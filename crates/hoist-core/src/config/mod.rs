//! Configuration loaded from hoist.toml
//!
//! Looked up in order:
//! - an explicit `--config` path
//! - `./hoist.toml`
//! - `<config_dir>/hoist/hoist.toml`
//!
//! and defaults otherwise.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_hoist_toml, parse_hoist_toml_str, to_toml};
pub use schema::{
    ArtifactsConfig, HoistConfig, PublishConfig, RepositoryConfig, StagingConfig, TagsConfig,
};
pub use store::ConfigStore;

/// File name looked up in each discovery location.
pub const CONFIG_FILE_NAME: &str = "hoist.toml";
