//! Matrix command: list the asset names a release must carry.

use serde::Serialize;

use crate::matrix::{ArchiveFormat, MATRIX, asset_name};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixAsset {
    pub platform: String,
    pub network: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixReport {
    pub tag: String,
    pub format: ArchiveFormat,
    pub assets: Vec<MatrixAsset>,
}

#[derive(Debug, Clone, Copy)]
pub struct MatrixCommand {
    format: ArchiveFormat,
}

impl MatrixCommand {
    pub fn new(format: ArchiveFormat) -> Self {
        Self { format }
    }

    pub fn execute(&self, tag: &str) -> MatrixReport {
        let assets = MATRIX
            .iter()
            .map(|entry| MatrixAsset {
                platform: entry.platform.to_string(),
                network: entry.network.to_string(),
                name: asset_name(tag, *entry, self.format),
            })
            .collect();
        MatrixReport {
            tag: tag.to_string(),
            format: self.format,
            assets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_entry() {
        let report = MatrixCommand::new(ArchiveFormat::TarGz).execute("v3.1.0");
        assert_eq!(report.assets.len(), MATRIX.len());
        assert_eq!(report.assets[0].name, "v3.1.0-Linux-testnet.tar.gz");
        assert_eq!(report.assets[5].name, "v3.1.0-macOS-arm64-mainnet.tar.gz");
    }
}
