//! Job-scoped staging area.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::matrix::MatrixEntry;

/// Ephemeral directory owned by one promotion job.
///
/// Every matrix entry gets its own subdirectory so extraction never mixes
/// file sets. The whole tree is removed when the area is dropped.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging area under `parent`, or the system temp dir.
    pub fn new(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hoist-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Root directory for one matrix entry.
    pub fn entry_root(&self, entry: MatrixEntry) -> PathBuf {
        self.dir.path().join(entry.slug())
    }

    /// Create `<entry>/<phase>` and ensure it is empty.
    pub fn entry_dir(&self, entry: MatrixEntry, phase: &str) -> io::Result<PathBuf> {
        let dir = self.entry_root(entry).join(phase);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Remove one phase directory of every entry, ignoring ones never created.
    pub fn discard_phase(&self, phase: &str) -> io::Result<()> {
        for entry in crate::matrix::MATRIX {
            let dir = self.entry_root(entry).join(phase);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    /// Remove the staging tree now, reporting errors instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
