//! End-to-end reconciliation against an in-memory bucket

mod common;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::MockTransport;
use s3sync::batch::{BatchConfig, BatchExecutor, NoopListener, RetryPolicy};
use s3sync::s3::{ObjectEntry, Transport};
use s3sync::sync::{build_local_map, diff, DiscrepancyResult, Reconciler, SyncError};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn md5_hex(content: &[u8]) -> String {
    hex::encode(md5::compute(content).0)
}

fn executor() -> BatchExecutor {
    BatchExecutor::new(BatchConfig {
        workers: 3,
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
        progress_interval: Duration::from_millis(5),
    })
}

fn local_mtime(root: &Path, key: &str) -> DateTime<Utc> {
    build_local_map(root, "").unwrap()[key].mtime
}

/// Local tree: a.txt, b.txt, d.txt, docs/, docs/readme.md
fn local_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
    fs::write(dir.path().join("b.txt"), b"bravo, edited locally").unwrap();
    fs::write(dir.path().join("d.txt"), b"delta").unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/readme.md"), b"# docs").unwrap();
    dir
}

fn remote_bucket(root: &Path) -> MockTransport {
    let a_time = local_mtime(root, "a.txt");
    let b_time = local_mtime(root, "b.txt");
    let old = Utc::now() - ChronoDuration::days(30);

    MockTransport::new()
        .with_object(ObjectEntry::new("backup/", 0, old))
        .with_object(
            ObjectEntry::new("backup/a.txt", 5, a_time + ChronoDuration::hours(2))
                .with_content_hash(md5_hex(b"alpha")),
        )
        .with_object(
            ObjectEntry::new("backup/b.txt", 5, Utc::now() + ChronoDuration::days(1))
                .with_content_hash(md5_hex(b"bravo"))
                .with_local_file_date(b_time - ChronoDuration::seconds(1)),
        )
        .with_object(ObjectEntry::new("backup/c.txt", 7, old).with_etag("\"0123\""))
        .with_object(ObjectEntry::new("backup/docs/", 0, old))
        .with_object(ObjectEntry::new("elsewhere/a.txt", 5, old))
}

fn set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_reconcile_classifies_every_key() {
    let dir = local_tree();
    let transport = Arc::new(remote_bucket(dir.path()));
    let dyn_transport: Arc<dyn Transport> = transport.clone();
    let reconciler = Reconciler::new(dyn_transport, executor());

    let result = reconciler
        .reconcile(dir.path(), "", "backup", &mut NoopListener, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.synchronized, set(&["a.txt", "docs"]));
    assert_eq!(result.updated_on_client, set(&["b.txt"]));
    assert_eq!(result.only_on_server, set(&["c.txt"]));
    assert_eq!(result.only_on_client, set(&["d.txt", "docs/readme.md"]));
    assert!(result.updated_on_server.is_empty());
    assert_eq!(result.len(), 6);

    // The prefix marker and keys outside the prefix are never fetched
    assert_eq!(transport.head_calls(), 4);
}

#[tokio::test]
async fn test_remote_newer_is_updated_on_server() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("notes.txt"), b"local draft").unwrap();
    let mtime = local_mtime(dir.path(), "notes.txt");

    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new().with_object(
        ObjectEntry::new("notes.txt", 11, mtime + ChronoDuration::minutes(5)).with_etag("\"abcdef\""),
    ));
    let reconciler = Reconciler::new(transport, executor());

    let result = reconciler
        .reconcile(dir.path(), "", "", &mut NoopListener, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.updated_on_server, set(&["notes.txt"]));
}

#[tokio::test]
async fn test_diff_is_idempotent_and_partitions_the_union() {
    let dir = local_tree();
    let transport: Arc<dyn Transport> = Arc::new(remote_bucket(dir.path()));
    let reconciler = Reconciler::new(transport, executor());

    let local = build_local_map(dir.path(), "").unwrap();
    let remote = reconciler
        .build_remote_map("backup/", &mut NoopListener, &CancellationToken::new())
        .await
        .unwrap();

    let first = diff(&local, &remote).unwrap();
    let second = diff(&local, &remote).unwrap();
    assert_eq!(first, second);

    let union: BTreeSet<String> = local.keys().chain(remote.keys()).cloned().collect();
    let sets: [&BTreeSet<String>; 5] = [
        &first.only_on_server,
        &first.only_on_client,
        &first.updated_on_server,
        &first.updated_on_client,
        &first.synchronized,
    ];
    let total: usize = sets.iter().map(|s| s.len()).sum();
    let combined: BTreeSet<String> = sets.iter().flat_map(|s| s.iter().cloned()).collect();
    assert_eq!(total, union.len(), "sets overlap");
    assert_eq!(combined, union);
    for key in &union {
        assert!(first.contains(key));
    }
}

#[tokio::test]
async fn test_equal_time_different_hash_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("clash.bin"), b"local bytes").unwrap();
    let mtime = local_mtime(dir.path(), "clash.bin");

    let transport: Arc<dyn Transport> = Arc::new(
        MockTransport::new().with_object(
            ObjectEntry::new("clash.bin", 12, Utc::now())
                .with_content_hash(md5_hex(b"remote bytes"))
                .with_local_file_date(mtime),
        ),
    );
    let reconciler = Reconciler::new(transport, executor());

    let result = reconciler
        .reconcile(dir.path(), "", "", &mut NoopListener, &CancellationToken::new())
        .await;
    match result {
        Err(SyncError::InconsistentState { key, .. }) => assert_eq!(key, "clash.bin"),
        other => panic!("expected InconsistentState, got {:?}", other),
    }
}

#[tokio::test]
async fn test_metadata_failure_fails_remote_map() {
    let dir = local_tree();
    let transport: Arc<dyn Transport> =
        Arc::new(remote_bucket(dir.path()).with_denied("backup/c.txt"));
    let reconciler = Reconciler::new(transport, executor());

    let result = reconciler
        .build_remote_map("backup", &mut NoopListener, &CancellationToken::new())
        .await;
    match result {
        Err(SyncError::MetadataFetch { key, .. }) => assert_eq!(key, "backup/c.txt"),
        other => panic!("expected MetadataFetch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancelled_reconciliation_returns_no_result() {
    let dir = local_tree();
    let transport: Arc<dyn Transport> = Arc::new(remote_bucket(dir.path()));
    let reconciler = Reconciler::new(transport, executor());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = reconciler
        .reconcile(dir.path(), "", "backup", &mut NoopListener, &cancel)
        .await;
    assert!(matches!(result, Err(SyncError::Cancelled)));
}

#[tokio::test]
async fn test_missing_local_root_is_local_io() {
    let dir = TempDir::new().unwrap();
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let reconciler = Reconciler::new(transport, executor());

    let result = reconciler
        .reconcile(
            &dir.path().join("absent"),
            "",
            "",
            &mut NoopListener,
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(SyncError::LocalIo { .. })));
}

#[tokio::test]
async fn test_empty_sides_produce_empty_result() {
    let dir = TempDir::new().unwrap();
    let transport: Arc<dyn Transport> = Arc::new(MockTransport::new());
    let reconciler = Reconciler::new(transport, executor());

    let result = reconciler
        .reconcile(dir.path(), "", "", &mut NoopListener, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result, DiscrepancyResult::default());
    assert!(result.is_empty());
}

#[test]
fn test_local_prefix_is_prepended() {
    let dir = local_tree();
    let map = build_local_map(dir.path(), "site").unwrap();
    let keys: BTreeSet<String> = map.keys().cloned().collect();
    assert_eq!(
        keys,
        set(&[
            "site/a.txt",
            "site/b.txt",
            "site/d.txt",
            "site/docs",
            "site/docs/readme.md"
        ])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconcile_runs_inside_spawned_task() {
    let handle = tokio::spawn(async {
        let dir = local_tree();
        let transport: Arc<dyn Transport> = Arc::new(remote_bucket(dir.path()));
        let reconciler = Reconciler::new(transport, executor());
        let result = reconciler
            .reconcile(dir.path(), "", "backup", &mut NoopListener, &CancellationToken::new())
            .await;
        (dir, result)
    });

    let (_dir, result) = handle.await.unwrap();
    let result = result.unwrap();
    assert_eq!(result.synchronized, set(&["a.txt", "docs"]));
    assert_eq!(result.len(), 6);
}
