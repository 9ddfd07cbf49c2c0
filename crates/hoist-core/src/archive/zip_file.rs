//! Zip archives.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use super::{NodeKind, link_stays_inside, sorted_tree};
use crate::error::ExtractionError;
use crate::fs::TreeManifest;

fn corrupt(archive: &Path, err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt(format!("{}: {}", archive.display(), err))
}

fn open(archive: &Path) -> Result<zip::ZipArchive<BufReader<File>>, ExtractionError> {
    let file = File::open(archive)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive, e))
}

pub(super) fn extract(archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
    let mut zip = open(archive)?;

    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| corrupt(archive, e))?;

        // Reject rather than skip unsafe paths so nothing is silently dropped
        let outpath = match file.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                return Err(corrupt(
                    archive,
                    format!("entry escapes extraction directory: {}", file.name()),
                ));
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if file.is_symlink() {
            let target = symlink_target(archive, &mut file)?;
            let inside = file
                .enclosed_name()
                .is_some_and(|rel| link_stays_inside(&rel, Path::new(&target)));
            if !inside {
                return Err(corrupt(
                    archive,
                    format!(
                        "link escapes extraction directory: {} -> {}",
                        file.name(),
                        target
                    ),
                ));
            }
            make_symlink(&target, &outpath)?;
            continue;
        }

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)
            .map_err(|e| corrupt(archive, e))?;
        let mut outfile = File::create(&outpath)?;
        outfile.write_all(&buffer)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                std::fs::set_permissions(
                    &outpath,
                    std::fs::Permissions::from_mode(mode & 0o7777),
                )?;
            }
        }
    }

    Ok(())
}

pub(super) fn create(src: &Path, out: &Path) -> Result<(), ExtractionError> {
    let file = File::create(out)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    let base = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for node in sorted_tree(src)? {
        match node.kind {
            NodeKind::Dir => {
                let mode = file_mode(&node.path)?;
                zip.add_directory(format!("{}/", node.rel), base.unix_permissions(mode))
                    .map_err(|e| ExtractionError::Io(std::io::Error::other(e)))?;
            }
            NodeKind::File => {
                let mode = file_mode(&node.path)?;
                zip.start_file(node.rel, base.unix_permissions(mode))
                    .map_err(|e| ExtractionError::Io(std::io::Error::other(e)))?;
                let content = std::fs::read(&node.path)?;
                zip.write_all(&content)?;
            }
            NodeKind::Symlink(target) => {
                zip.add_symlink(node.rel, target, base)
                    .map_err(|e| ExtractionError::Io(std::io::Error::other(e)))?;
            }
        }
    }

    let mut writer = zip
        .finish()
        .map_err(|e| ExtractionError::Io(std::io::Error::other(e)))?;
    writer.flush()?;
    Ok(())
}

pub(super) fn read_manifest(archive: &Path) -> Result<TreeManifest, ExtractionError> {
    let mut zip = open(archive)?;
    let mut manifest = TreeManifest::new();

    for i in 0..zip.len() {
        let mut file = zip.by_index(i).map_err(|e| corrupt(archive, e))?;
        let name = file.name().to_string();
        if file.is_dir() {
            manifest.insert_dir(&name);
            continue;
        }
        if file.is_symlink() {
            let target = symlink_target(archive, &mut file)?;
            manifest.insert_link(&name, &target);
            continue;
        }
        let mode = file.unix_mode().unwrap_or(0o644);
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| corrupt(archive, e))?;
        manifest.insert_file(&name, &content, mode);
    }

    Ok(manifest)
}

/// A zip symlink stores its target as the entry's content.
fn symlink_target<R: Read>(archive: &Path, file: &mut R) -> Result<String, ExtractionError> {
    let mut target = Vec::new();
    file.read_to_end(&mut target)
        .map_err(|e| corrupt(archive, e))?;
    String::from_utf8(target)
        .map_err(|_| corrupt(archive, "link target is not valid UTF-8"))
}

#[cfg(unix)]
fn make_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &str, link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("cannot create symlink {} on this platform", link.display()),
    ))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(path: &Path) -> std::io::Result<u32> {
    Ok(if std::fs::metadata(path)?.is_dir() {
        0o755
    } else {
        0o644
    })
}
