//! Deterministic manifests of file trees
//!
//! A manifest maps every relative path in a tree to the blake3 digest, size,
//! and permission bits of its content, and every symlink to its target. Two
//! trees are the same artifact when their manifests are equal, which is how
//! repackaging proves it changed the container and nothing else.
//!
//! Paths always use `/` separators and never start with `./`. Names that are
//! not valid UTF-8 are rejected rather than rewritten.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::Context;

/// Digest of a single regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub hash: String,
    pub size: u64,
    /// Unix permission bits (0 on platforms without them)
    pub mode: u32,
}

impl FileDigest {
    pub fn of(content: &[u8], mode: u32) -> Self {
        Self {
            hash: blake3::hash(content).to_hex().to_string(),
            size: content.len() as u64,
            mode: mode & 0o7777,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeManifest {
    files: BTreeMap<String, FileDigest>,
    links: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
}

impl TreeManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the manifest of everything below `root`.
    ///
    /// Symlinks are recorded with their target and never followed. Special
    /// files (fifos, sockets, devices) are rejected.
    pub fn from_dir(root: &Path) -> anyhow::Result<Self> {
        let mut manifest = Self::new();
        manifest.walk(root, "")?;
        Ok(manifest)
    }

    fn walk(&mut self, dir: &Path, base: &str) -> anyhow::Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

        let mut sorted_entries: Vec<_> = entries
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
        sorted_entries.sort_by_key(|e| e.file_name());

        for entry in sorted_entries {
            let name = entry.file_name();
            let name_str = name.to_str().with_context(|| {
                format!("File name is not valid UTF-8: {}", entry.path().display())
            })?;
            let rel_path = if base.is_empty() {
                name_str.to_string()
            } else {
                format!("{}/{}", base, name_str)
            };

            let ty = entry
                .file_type()
                .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

            if ty.is_dir() {
                self.dirs.insert(rel_path.clone());
                self.walk(&entry.path(), &rel_path)?;
            } else if ty.is_file() {
                let content = fs::read(entry.path())
                    .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
                let metadata = entry
                    .metadata()
                    .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;
                self.files
                    .insert(rel_path, FileDigest::of(&content, mode_of(&metadata)));
            } else if ty.is_symlink() {
                let target = fs::read_link(entry.path())
                    .with_context(|| format!("Failed to read link: {}", entry.path().display()))?;
                let target = target.to_str().with_context(|| {
                    format!("Link target is not valid UTF-8: {}", entry.path().display())
                })?;
                self.links.insert(rel_path, target.to_string());
            } else {
                anyhow::bail!(
                    "Unsupported filesystem entry type: {}",
                    entry.path().display()
                );
            }
        }

        Ok(())
    }

    pub fn insert_file(&mut self, path: &str, content: &[u8], mode: u32) {
        self.files
            .insert(normalize(path), FileDigest::of(content, mode));
    }

    pub fn insert_link(&mut self, path: &str, target: &str) {
        self.links.insert(normalize(path), target.to_string());
    }

    /// Record `path` as a hard link to the already recorded file `target`.
    ///
    /// Returns false when `target` is not a known file.
    pub fn insert_hard_link(&mut self, path: &str, target: &str) -> bool {
        match self.files.get(&normalize(target)).cloned() {
            Some(digest) => {
                self.files.insert(normalize(path), digest);
                true
            }
            None => false,
        }
    }

    pub fn insert_dir(&mut self, path: &str) {
        let path = normalize(path);
        if !path.is_empty() {
            self.dirs.insert(path);
        }
    }

    /// Record every ancestor directory of the files, as archives may omit them.
    pub fn fill_parent_dirs(&mut self) {
        let parents: Vec<String> = self
            .files
            .keys()
            .chain(self.links.keys())
            .flat_map(|path| {
                let mut found = Vec::new();
                let mut current = path.as_str();
                while let Some((parent, _)) = current.rsplit_once('/') {
                    found.push(parent.to_string());
                    current = parent;
                }
                found
            })
            .collect();
        self.dirs.extend(parents);
    }

    pub fn files(&self) -> &BTreeMap<String, FileDigest> {
        &self.files
    }

    /// Symlink paths mapped to their targets.
    pub fn links(&self) -> &BTreeMap<String, String> {
        &self.links
    }

    pub fn dirs(&self) -> &BTreeSet<String> {
        &self.dirs
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Stable hex digest of the whole tree.
    ///
    /// Format: for each path in order, `path || 0xFF` for directories,
    /// `path || 0x00 || hash || mode` for files and `path || 0x01 || target`
    /// for symlinks.
    pub fn digest(&self) -> String {
        enum Node<'a> {
            Dir,
            File(&'a FileDigest),
            Link(&'a str),
        }

        let mut entries: BTreeMap<&str, Node<'_>> = BTreeMap::new();
        for dir in &self.dirs {
            entries.insert(dir.as_str(), Node::Dir);
        }
        for (path, file) in &self.files {
            entries.insert(path.as_str(), Node::File(file));
        }
        for (path, target) in &self.links {
            entries.insert(path.as_str(), Node::Link(target));
        }

        let mut hasher = blake3::Hasher::new();
        for (path, file) in entries {
            hasher.update(path.as_bytes());
            match file {
                Node::Dir => {
                    hasher.update(&[0xFF]);
                }
                Node::File(file) => {
                    hasher.update(&[0x00]);
                    hasher.update(file.hash.as_bytes());
                    hasher.update(&file.mode.to_le_bytes());
                }
                Node::Link(target) => {
                    hasher.update(&[0x01]);
                    hasher.update(target.as_bytes());
                }
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Human-readable differences between `self` and `other`, empty if equal.
    pub fn differences(&self, other: &TreeManifest) -> Vec<String> {
        let mut out = Vec::new();
        for (path, digest) in &self.files {
            match other.files.get(path) {
                None => out.push(format!("missing file {}", path)),
                Some(theirs) if theirs.hash != digest.hash => {
                    out.push(format!("content differs: {}", path))
                }
                Some(theirs) if theirs.mode != digest.mode => out.push(format!(
                    "mode differs: {} ({:o} vs {:o})",
                    path, digest.mode, theirs.mode
                )),
                Some(_) => {}
            }
        }
        for path in other.files.keys() {
            if !self.files.contains_key(path) {
                out.push(format!("unexpected file {}", path));
            }
        }
        for (path, target) in &self.links {
            match other.links.get(path) {
                None => out.push(format!("missing link {}", path)),
                Some(theirs) if theirs != target => out.push(format!(
                    "link target differs: {} ({} vs {})",
                    path, target, theirs
                )),
                Some(_) => {}
            }
        }
        for path in other.links.keys() {
            if !self.links.contains_key(path) {
                out.push(format!("unexpected link {}", path));
            }
        }
        for dir in self.dirs.symmetric_difference(&other.dirs) {
            out.push(format!("directory differs: {}", dir));
        }
        out
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./")
        .trim_end_matches('/')
        .to_string()
}

#[cfg(unix)]
fn mode_of(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_metadata: &fs::Metadata) -> u32 {
    0
}
