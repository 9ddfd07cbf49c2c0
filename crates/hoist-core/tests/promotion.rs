mod support;

use hoist_core::job::{JobOutcome, JobState, TagEvent};
use hoist_core::matrix::{ArchiveFormat, MATRIX, asset_name, expected_asset_names};
use hoist_core::release::MemoryHost;

use support::{at, manifest_of, seed_pre_release};

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

fn expect_failed(outcome: JobOutcome) -> (JobState, String, bool) {
    match outcome {
        JobOutcome::Failed {
            state,
            reason,
            partial_publish,
        } => (state, reason, partial_publish),
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn promotes_latest_pre_release_to_draft() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v1.2.0-pre2", at(10), ArchiveFormat::TarGz, &[]);
    seed_pre_release(&host, "v1.2.0-pre3", at(20), ArchiveFormat::TarGz, &[]);

    let mut job = support::job(&host, support::options(ArchiveFormat::TarGz));
    let outcome = job.run(&TagEvent::new("v1.2.0")).await;

    let expected = expected_asset_names("v1.2.0", ArchiveFormat::TarGz);
    match &outcome {
        JobOutcome::Succeeded { source, release } => {
            assert_eq!(source, "v1.2.0-pre3");
            assert_eq!(release.tag, "v1.2.0");
            assert!(release.draft);
            assert!(!release.prerelease);
            assert!(!release.already_published);
            assert_eq!(release.assets, expected);
            assert_eq!(sorted(release.uploaded.clone()), sorted(expected.clone()));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(
        job.history(),
        &[
            JobState::Triggered,
            JobState::Classified,
            JobState::Located,
            JobState::Fetched,
            JobState::Repackaged,
            JobState::Published,
            JobState::Done,
        ]
    );

    let record = host.release("v1.2.0").unwrap();
    assert!(record.draft);
    assert!(!record.prerelease);
    assert_eq!(sorted(record.assets), sorted(expected));
    assert!(host.asset_bytes("v1.2.0", "v1.2.0-Linux-testnet.tar.gz").is_some());
}

#[tokio::test]
async fn repackaged_archives_keep_contents_and_modes() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v2.0.0-pre1", at(0), ArchiveFormat::TarGz, &[]);

    let outcome = support::job(&host, support::options(ArchiveFormat::TarGz))
        .run(&TagEvent::new("v2.0.0"))
        .await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    for entry in MATRIX {
        let source = host
            .asset_bytes("v2.0.0-pre1", &asset_name("v2.0.0-pre1", entry, ArchiveFormat::TarGz))
            .unwrap();
        let target = host
            .asset_bytes("v2.0.0", &asset_name("v2.0.0", entry, ArchiveFormat::TarGz))
            .unwrap();
        let source = manifest_of(ArchiveFormat::TarGz, &source);
        let target = manifest_of(ArchiveFormat::TarGz, &target);
        assert_eq!(source.files(), target.files(), "entry {entry}");
        assert_eq!(target.files()["bin/node"].mode, 0o755);
    }
}

#[tokio::test]
async fn zip_artifacts_are_promoted() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v2.1.0-pre1", at(0), ArchiveFormat::Zip, &[]);

    let outcome = support::job(&host, support::options(ArchiveFormat::Zip))
        .run(&TagEvent::new("v2.1.0"))
        .await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));

    let record = host.release("v2.1.0").unwrap();
    assert_eq!(
        sorted(record.assets),
        sorted(expected_asset_names("v2.1.0", ArchiveFormat::Zip))
    );
    let bytes = host
        .asset_bytes("v2.1.0", "v2.1.0-macOS-x86-mainnet.zip")
        .unwrap();
    let manifest = manifest_of(ArchiveFormat::Zip, &bytes);
    assert_eq!(manifest.file_count(), 3);
}

async fn symlinks_survive_promotion(
    format: ArchiveFormat,
    source_tag: &str,
    target_tag: &str,
) {
    let host = MemoryHost::new();
    let entry = MATRIX[0];
    seed_pre_release(&host, source_tag, at(0), format, &[entry]);
    let links = [("bin/mc-node", "node"), ("lib/libnode.so", "../bin/node")];
    host.add_asset(
        source_tag,
        &asset_name(source_tag, entry, format),
        support::build_archive_with_links(format, &support::entry_files(entry), &links),
    );

    let outcome = support::job(&host, support::options(format))
        .run(&TagEvent::new(target_tag))
        .await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }), "{outcome:?}");

    let bytes = host
        .asset_bytes(target_tag, &asset_name(target_tag, entry, format))
        .unwrap();
    let manifest = manifest_of(format, &bytes);
    assert_eq!(manifest.links()["bin/mc-node"], "node");
    assert_eq!(manifest.links()["lib/libnode.so"], "../bin/node");
    assert!(!manifest.files().contains_key("bin/mc-node"));
    assert_eq!(manifest.file_count(), 3);
}

#[tokio::test]
async fn tar_gz_symlinks_are_promoted_as_links() {
    symlinks_survive_promotion(ArchiveFormat::TarGz, "v2.2.0-pre1", "v2.2.0").await;
}

#[tokio::test]
async fn zip_symlinks_are_promoted_as_links() {
    symlinks_survive_promotion(ArchiveFormat::Zip, "v2.3.0-pre1", "v2.3.0").await;
}

#[tokio::test]
async fn pre_release_tag_is_skipped() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v1.2.0-pre3", at(0), ArchiveFormat::TarGz, &[]);

    let mut job = support::job(&host, support::options(ArchiveFormat::TarGz));
    let outcome = job.run(&TagEvent::new("v1.2.0-pre4")).await;

    assert!(matches!(outcome, JobOutcome::Skipped { ref tag, .. } if tag == "v1.2.0-pre4"));
    assert_eq!(job.state(), Some(JobState::Done));
    assert_eq!(host.total_upload_attempts(), 0);
    assert_eq!(host.download_attempts("v1.2.0-pre3-Linux-testnet.tar.gz"), 0);
}

#[tokio::test]
async fn non_release_tag_is_skipped() {
    let host = MemoryHost::new();
    let outcome = support::job(&host, support::options(ArchiveFormat::TarGz))
        .run(&TagEvent::new("nightly-2024-05-01"))
        .await;
    assert!(matches!(outcome, JobOutcome::Skipped { .. }));
}

#[tokio::test]
async fn forced_tag_without_source_fails() {
    let host = MemoryHost::new();

    let mut job = support::job(&host, support::options(ArchiveFormat::TarGz));
    let outcome = job.run(&TagEvent::new("v1.2.0-force-release")).await;

    let (state, reason, partial) = expect_failed(outcome);
    assert_eq!(state, JobState::Classified);
    assert!(reason.contains("no pre-release"), "reason: {reason}");
    assert!(!partial);
    assert!(host.release("v1.2.0-force-release").is_none());
}

#[tokio::test]
async fn forced_pre_release_is_published_as_prerelease() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v1.3.0-pre1", at(0), ArchiveFormat::TarGz, &[]);

    let tag = "v1.3.0-pre2-force-release";
    let outcome = support::job(&host, support::options(ArchiveFormat::TarGz))
        .run(&TagEvent::new(tag))
        .await;

    match outcome {
        JobOutcome::Succeeded { release, .. } => {
            assert!(release.prerelease);
            assert!(release.draft);
            assert!(release.assets.iter().all(|name| name.starts_with(tag)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn missing_asset_fails_without_creating_release() {
    let host = MemoryHost::new();
    let missing = MATRIX[5];
    seed_pre_release(&host, "v1.3.0-pre1", at(0), ArchiveFormat::TarGz, &[missing]);

    let mut job = support::job(&host, support::options(ArchiveFormat::TarGz));
    let outcome = job.run(&TagEvent::new("v1.3.0")).await;

    let (state, reason, partial) = expect_failed(outcome);
    assert_eq!(state, JobState::Located);
    assert!(reason.contains("macOS-arm64-mainnet"), "reason: {reason}");
    assert!(!partial);
    assert!(host.release("v1.3.0").is_none());
    assert_eq!(host.total_upload_attempts(), 0);
    assert_eq!(
        job.history(),
        &[
            JobState::Triggered,
            JobState::Classified,
            JobState::Located,
            JobState::Failed,
        ]
    );
}

#[tokio::test]
async fn drafts_are_never_used_as_source() {
    let host = MemoryHost::new();
    seed_pre_release(&host, "v1.4.0-pre1", at(0), ArchiveFormat::TarGz, &[]);
    host.add_release("v1.4.0-pre2", at(100), true, true);

    let outcome = support::job(&host, support::options(ArchiveFormat::TarGz))
        .run(&TagEvent::new("v1.4.0"))
        .await;

    match outcome {
        JobOutcome::Succeeded { source, .. } => assert_eq!(source, "v1.4.0-pre1"),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_source_archive_fails_before_publishing() {
    let host = MemoryHost::new();
    let broken = MATRIX[2];
    seed_pre_release(&host, "v1.5.0-pre1", at(0), ArchiveFormat::TarGz, &[broken]);
    host.add_asset(
        "v1.5.0-pre1",
        &asset_name("v1.5.0-pre1", broken, ArchiveFormat::TarGz),
        b"definitely not gzip".to_vec(),
    );

    let outcome = support::job(&host, support::options(ArchiveFormat::TarGz))
        .run(&TagEvent::new("v1.5.0"))
        .await;

    let (state, reason, partial) = expect_failed(outcome);
    assert_eq!(state, JobState::Fetched);
    assert!(reason.contains(&broken.to_string()), "reason: {reason}");
    assert!(!partial);
    assert!(host.release("v1.5.0").is_none());
}

#[tokio::test]
async fn empty_source_archive_fails() {
    let host = MemoryHost::new();
    let empty = MATRIX[0];
    seed_pre_release(&host, "v1.6.0-pre1", at(0), ArchiveFormat::Zip, &[empty]);
    host.add_asset(
        "v1.6.0-pre1",
        &asset_name("v1.6.0-pre1", empty, ArchiveFormat::Zip),
        support::zip(&[]),
    );

    let outcome = support::job(&host, support::options(ArchiveFormat::Zip))
        .run(&TagEvent::new("v1.6.0"))
        .await;

    let (_, reason, _) = expect_failed(outcome);
    assert!(reason.contains("no files"), "reason: {reason}");
    assert!(host.release("v1.6.0").is_none());
}

#[tokio::test]
async fn staging_area_is_removed_on_success_and_failure() {
    let parent = tempfile::TempDir::new().unwrap();
    let host = MemoryHost::new();
    seed_pre_release(&host, "v1.7.0-pre1", at(0), ArchiveFormat::TarGz, &[]);

    let mut options = support::options(ArchiveFormat::TarGz);
    options.staging_dir = Some(parent.path().to_path_buf());

    let outcome = support::job(&host, options.clone())
        .run(&TagEvent::new("v1.7.0"))
        .await;
    assert!(matches!(outcome, JobOutcome::Succeeded { .. }));
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);

    host.fail_upload_always(&asset_name("v1.7.1", MATRIX[1], ArchiveFormat::TarGz));
    let outcome = support::job(&host, options)
        .run(&TagEvent::new("v1.7.1"))
        .await;
    assert!(outcome.is_failure());
    assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
}
