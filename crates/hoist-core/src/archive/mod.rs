//! Archive codecs used by the repackager.
//!
//! Both formats extract into a directory, re-create an archive from a
//! directory, and read an archive back into a [`TreeManifest`] without
//! touching the filesystem. Symlinks travel as symlinks and must point
//! inside the archive; tar hard links are re-archived as regular files.

mod tar_gz;
mod zip_file;

use std::path::{Component, Path, PathBuf};

use crate::error::ExtractionError;
use crate::fs::TreeManifest;
use crate::matrix::ArchiveFormat;

/// Extract `archive` into the empty directory `dest`.
pub fn extract(format: ArchiveFormat, archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
    match format {
        ArchiveFormat::TarGz => tar_gz::extract(archive, dest),
        ArchiveFormat::Zip => zip_file::extract(archive, dest),
    }
}

/// Archive the contents of `src` (not `src` itself) into `out`.
pub fn create(format: ArchiveFormat, src: &Path, out: &Path) -> Result<(), ExtractionError> {
    match format {
        ArchiveFormat::TarGz => tar_gz::create(src, out),
        ArchiveFormat::Zip => zip_file::create(src, out),
    }
}

/// Manifest of the files stored in `archive`.
pub fn read_manifest(format: ArchiveFormat, archive: &Path) -> Result<TreeManifest, ExtractionError> {
    let mut manifest = match format {
        ArchiveFormat::TarGz => tar_gz::read_manifest(archive)?,
        ArchiveFormat::Zip => zip_file::read_manifest(archive)?,
    };
    manifest.fill_parent_dirs();
    Ok(manifest)
}

/// What a walked path is on disk.
enum NodeKind {
    Dir,
    File,
    Symlink(String),
}

struct TreeNode {
    rel: String,
    path: PathBuf,
    kind: NodeKind,
}

/// Paths below `root` in sorted order, directories before their contents.
///
/// Symlinks are listed with their target and not followed.
fn sorted_tree(root: &Path) -> Result<Vec<TreeNode>, ExtractionError> {
    fn walk(dir: &Path, base: &str, out: &mut Vec<TreeNode>) -> Result<(), ExtractionError> {
        let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().into_string().map_err(|_| {
                ExtractionError::Corrupt(format!("name is not valid UTF-8: {}", path.display()))
            })?;
            let rel = if base.is_empty() {
                name
            } else {
                format!("{}/{}", base, name)
            };

            let ty = entry.file_type()?;
            let kind = if ty.is_dir() {
                NodeKind::Dir
            } else if ty.is_file() {
                NodeKind::File
            } else if ty.is_symlink() {
                let target = std::fs::read_link(&path)?.into_os_string().into_string();
                NodeKind::Symlink(target.map_err(|_| {
                    ExtractionError::Corrupt(format!(
                        "link target is not valid UTF-8: {}",
                        path.display()
                    ))
                })?)
            } else {
                return Err(ExtractionError::Corrupt(format!(
                    "unsupported file type: {}",
                    path.display()
                )));
            };

            let descend = matches!(kind, NodeKind::Dir);
            out.push(TreeNode {
                rel: rel.clone(),
                path: path.clone(),
                kind,
            });
            if descend {
                walk(&path, &rel, out)?;
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, "", &mut out)?;
    Ok(out)
}

/// Whether a symlink stored at `link` (relative to the extraction root)
/// pointing at `target` resolves inside that root.
fn link_stays_inside(link: &Path, target: &Path) -> bool {
    let mut depth: usize = 0;
    if let Some(parent) = link.parent() {
        for component in parent.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                _ => return false,
            }
        }
    }
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(up) => depth = up,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}
