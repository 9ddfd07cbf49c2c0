#![allow(dead_code)]

use std::io::Write;

use chrono::{DateTime, TimeZone, Utc};

use hoist_core::archive;
use hoist_core::fs::TreeManifest;
use hoist_core::job::{JobOptions, PromotionJob};
use hoist_core::matrix::{ArchiveFormat, MATRIX, MatrixEntry, asset_name};
use hoist_core::release::MemoryHost;
use hoist_core::retry::RetryPolicy;
use hoist_core::tag::TagRules;

pub struct FixtureFile {
    pub path: String,
    pub content: Vec<u8>,
    pub mode: u32,
}

/// Fixed timestamp offset by `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Distinct content for every matrix entry so mix-ups are detectable.
pub fn entry_files(entry: MatrixEntry) -> Vec<FixtureFile> {
    vec![
        FixtureFile {
            path: "bin/node".to_string(),
            content: format!("#!/bin/sh\necho {}\n", entry.slug()).into_bytes(),
            mode: 0o755,
        },
        FixtureFile {
            path: "config/genesis.json".to_string(),
            content: format!("{{\"network\":\"{}\"}}", entry.network).into_bytes(),
            mode: 0o644,
        },
        FixtureFile {
            path: "README".to_string(),
            content: b"node distribution".to_vec(),
            mode: 0o644,
        },
    ]
}

pub fn tar_gz(files: &[FixtureFile]) -> Vec<u8> {
    tar_gz_with_links(files, &[])
}

/// Tarball holding `files` followed by `(path, target)` symlinks.
pub fn tar_gz_with_links(files: &[FixtureFile], links: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.content.len() as u64);
        header.set_mode(file.mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, &file.path, file.content.as_slice())
            .unwrap();
    }
    for (path, target) in links {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_entry_type(tar::EntryType::Symlink);
        builder.append_link(&mut header, path, target).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn zip(files: &[FixtureFile]) -> Vec<u8> {
    zip_with_links(files, &[])
}

/// Zip holding `files` followed by `(path, target)` symlinks.
pub fn zip_with_links(files: &[FixtureFile], links: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut buf);
        for file in files {
            let options = zip::write::SimpleFileOptions::default().unix_permissions(file.mode);
            writer.start_file(file.path.as_str(), options).unwrap();
            writer.write_all(&file.content).unwrap();
        }
        for (path, target) in links {
            writer
                .add_symlink(*path, *target, zip::write::SimpleFileOptions::default())
                .unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

pub fn build_archive(format: ArchiveFormat, files: &[FixtureFile]) -> Vec<u8> {
    build_archive_with_links(format, files, &[])
}

pub fn build_archive_with_links(
    format: ArchiveFormat,
    files: &[FixtureFile],
    links: &[(&str, &str)],
) -> Vec<u8> {
    match format {
        ArchiveFormat::TarGz => tar_gz_with_links(files, links),
        ArchiveFormat::Zip => zip_with_links(files, links),
    }
}

/// Add a published pre-release carrying every matrix asset except `skip`.
pub fn seed_pre_release(
    host: &MemoryHost,
    tag: &str,
    created_at: DateTime<Utc>,
    format: ArchiveFormat,
    skip: &[MatrixEntry],
) {
    host.add_release(tag, created_at, true, false);
    for entry in MATRIX {
        if skip.contains(&entry) {
            continue;
        }
        let bytes = build_archive(format, &entry_files(entry));
        host.add_asset(tag, &asset_name(tag, entry, format), bytes);
    }
}

/// Manifest of an archive held in memory.
pub fn manifest_of(format: ArchiveFormat, bytes: &[u8]) -> TreeManifest {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join(format!("archive.{}", format.extension()));
    std::fs::write(&path, bytes).unwrap();
    archive::read_manifest(format, &path).unwrap()
}

pub fn options(format: ArchiveFormat) -> JobOptions {
    JobOptions {
        retry: RetryPolicy::immediate(3),
        format,
        ..JobOptions::default()
    }
}

pub fn job(host: &MemoryHost, options: JobOptions) -> PromotionJob<'_, MemoryHost> {
    PromotionJob::new(host, TagRules::default(), options)
}
