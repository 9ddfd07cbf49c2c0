//! Gzip-compressed tarballs.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use super::{NodeKind, link_stays_inside, sorted_tree};
use crate::error::ExtractionError;
use crate::fs::TreeManifest;

fn corrupt(archive: &Path, err: impl std::fmt::Display) -> ExtractionError {
    ExtractionError::Corrupt(format!("{}: {}", archive.display(), err))
}

fn open(archive: &Path) -> Result<tar::Archive<GzDecoder<BufReader<File>>>, ExtractionError> {
    let file = File::open(archive)?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Entry name, rejected rather than rewritten when it is not UTF-8.
fn entry_name<R: Read>(
    archive: &Path,
    entry: &tar::Entry<'_, R>,
) -> Result<String, ExtractionError> {
    let path = entry.path().map_err(|e| corrupt(archive, e))?;
    path.to_str().map(str::to_string).ok_or_else(|| {
        corrupt(
            archive,
            format!("entry name is not valid UTF-8: {}", path.display()),
        )
    })
}

fn link_target<R: Read>(
    archive: &Path,
    entry: &tar::Entry<'_, R>,
    name: &str,
) -> Result<String, ExtractionError> {
    let target = entry
        .link_name()
        .map_err(|e| corrupt(archive, e))?
        .ok_or_else(|| corrupt(archive, format!("link without target at {}", name)))?;
    target.to_str().map(str::to_string).ok_or_else(|| {
        corrupt(
            archive,
            format!("link target is not valid UTF-8 at {}", name),
        )
    })
}

pub(super) fn extract(archive: &Path, dest: &Path) -> Result<(), ExtractionError> {
    let mut tarball = open(archive)?;
    tarball.set_preserve_permissions(true);

    for entry in tarball.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let kind = entry.header().entry_type();
        if kind.is_pax_global_extensions() {
            continue;
        }
        let name = entry_name(archive, &entry)?;
        if kind.is_symlink() {
            let target = link_target(archive, &entry, &name)?;
            if !link_stays_inside(Path::new(&name), Path::new(&target)) {
                return Err(corrupt(
                    archive,
                    format!("link escapes extraction directory: {} -> {}", name, target),
                ));
            }
        } else if !(kind.is_file() || kind.is_dir() || kind.is_hard_link()) {
            return Err(corrupt(
                archive,
                format!("unsupported entry type {:?} at {}", kind, name),
            ));
        }
        let inside = entry.unpack_in(dest).map_err(|e| corrupt(archive, e))?;
        if !inside {
            return Err(corrupt(
                archive,
                format!("entry escapes extraction directory: {}", name),
            ));
        }
    }

    Ok(())
}

pub(super) fn create(src: &Path, out: &Path) -> Result<(), ExtractionError> {
    let file = File::create(out)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    for node in sorted_tree(src)? {
        match node.kind {
            NodeKind::Dir => builder.append_dir(&node.rel, &node.path)?,
            // with follow_symlinks(false) links are stored as links
            NodeKind::File | NodeKind::Symlink(_) => {
                builder.append_path_with_name(&node.path, &node.rel)?
            }
        }
    }

    let encoder = builder.into_inner()?;
    let mut writer = encoder.finish()?;
    std::io::Write::flush(&mut writer)?;
    Ok(())
}

pub(super) fn read_manifest(archive: &Path) -> Result<TreeManifest, ExtractionError> {
    let mut tarball = open(archive)?;
    let mut manifest = TreeManifest::new();

    for entry in tarball.entries().map_err(|e| corrupt(archive, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive, e))?;
        let kind = entry.header().entry_type();
        let name = entry_name(archive, &entry)?;
        if kind.is_dir() {
            manifest.insert_dir(&name);
        } else if kind.is_symlink() {
            let target = link_target(archive, &entry, &name)?;
            manifest.insert_link(&name, &target);
        } else if kind.is_hard_link() {
            let target = link_target(archive, &entry, &name)?;
            if !manifest.insert_hard_link(&name, &target) {
                return Err(corrupt(
                    archive,
                    format!("hard link to unknown file: {} -> {}", name, target),
                ));
            }
        } else if kind.is_file() {
            let mode = entry.header().mode().map_err(|e| corrupt(archive, e))?;
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| corrupt(archive, e))?;
            manifest.insert_file(&name, &content, mode);
        }
    }

    Ok(manifest)
}
