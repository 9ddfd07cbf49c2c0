//! The fixed artifact matrix and its naming convention.
//!
//! Every release carries one archive per (platform, network) pair, named
//! `<tag>-<Platform>-<Network>.<ext>`. Fetch and publish both derive names
//! from [`asset_name`], so the two sides always agree.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build platform of a release artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    MacOsX86,
    MacOsArm64,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::MacOsX86 => "macOS-x86",
            Self::MacOsArm64 => "macOS-arm64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network a release artifact is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (platform, network) combination requiring its own artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub platform: Platform,
    pub network: Network,
}

impl MatrixEntry {
    pub const fn new(platform: Platform, network: Network) -> Self {
        Self { platform, network }
    }

    /// `<Platform>-<Network>`, also used as the staging subdirectory name.
    pub fn slug(&self) -> String {
        format!("{}-{}", self.platform, self.network)
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform, self.network)
    }
}

/// Every artifact a release must carry.
pub const MATRIX: [MatrixEntry; 6] = [
    MatrixEntry::new(Platform::Linux, Network::Testnet),
    MatrixEntry::new(Platform::Linux, Network::Mainnet),
    MatrixEntry::new(Platform::MacOsX86, Network::Testnet),
    MatrixEntry::new(Platform::MacOsX86, Network::Mainnet),
    MatrixEntry::new(Platform::MacOsArm64, Network::Testnet),
    MatrixEntry::new(Platform::MacOsArm64, Network::Mainnet),
];

/// Container format of release artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,
    #[serde(rename = "zip")]
    Zip,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "zip" => Ok(Self::Zip),
            other => anyhow::bail!("Unknown archive format: {}. Use 'tar.gz' or 'zip'", other),
        }
    }
}

/// Asset file name for `entry` under `tag`.
pub fn asset_name(tag: &str, entry: MatrixEntry, format: ArchiveFormat) -> String {
    format!(
        "{}-{}-{}.{}",
        tag,
        entry.platform,
        entry.network,
        format.extension()
    )
}

/// Expected asset names for `tag`, in matrix order.
pub fn expected_asset_names(tag: &str, format: ArchiveFormat) -> Vec<String> {
    MATRIX
        .iter()
        .map(|entry| asset_name(tag, *entry, format))
        .collect()
}

/// Check that `resolved` holds exactly one value for every matrix entry.
pub fn ensure_complete<T>(resolved: &BTreeMap<MatrixEntry, T>) -> anyhow::Result<()> {
    let missing: Vec<String> = MATRIX
        .iter()
        .filter(|entry| !resolved.contains_key(entry))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("Artifact matrix incomplete, missing: {}", missing.join(", "));
    }
    if resolved.len() != MATRIX.len() {
        anyhow::bail!(
            "Artifact matrix has {} entries, expected {}",
            resolved.len(),
            MATRIX.len()
        );
    }
    Ok(())
}
