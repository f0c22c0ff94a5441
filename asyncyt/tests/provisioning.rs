#![cfg(unix)]

mod common;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use asyncyt::binary::{
    BinaryFetcher, BinarySource, Checksum, ExecutableSpec, FetchEvent, FetchPhase, Manifest, Platform,
    PlatformAsset
};
use asyncyt::process::ProcessRunner;
use asyncyt::ProvisionError;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use sha2::{Digest, Sha256};
use tokio_stream::StreamExt;

const TOOL: &[u8] = b"#!/bin/sh\necho 3.2.1\n";

#[derive(Clone, Default)]
struct Counters {
    downloads: Arc<AtomicUsize>
}

async fn serve_tool(State(counters): State<Counters>) -> &'static [u8] {
    counters.downloads.fetch_add(1, Ordering::SeqCst);
    TOOL
}

async fn serve_sums() -> String {
    format!("{}  faketool_linux\n", hex::encode(Sha256::digest(TOOL)))
}

/// Serves the fake release on an ephemeral port; returns its base URL.
async fn spawn_release_server(counters: Counters) -> String {
    let app = Router::new()
        .route("/faketool_linux", get(serve_tool))
        .route("/SHA2-256SUMS", get(serve_sums))
        .with_state(counters);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn spec(base: &str, checksum: Checksum) -> ExecutableSpec {
    ExecutableSpec {
        name: "faketool".to_string(),
        pinned_version: "3.2.1".to_string(),
        min_version: None,
        version_arg: "--version".to_string(),
        assets: vec![PlatformAsset {
            platform: Platform::LinuxX64,
            url: format!("{base}/faketool_linux"),
            checksum,
            archive_members: Vec::new()
        }]
    }
}

fn fetcher(bin_dir: &Path) -> BinaryFetcher {
    BinaryFetcher::new(reqwest::Client::new(), bin_dir, ProcessRunner::default())
        .with_platform(Some(Platform::LinuxX64))
}

#[tokio::test]
async fn test_concurrent_fetch_downloads_once() {
    common::init_tracing();
    let counters = Counters::default();
    let base = spawn_release_server(counters.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path());
    let spec = spec(&base, Checksum::Sha256Sums {
        url: format!("{base}/SHA2-256SUMS"),
        asset: "faketool_linux".to_string()
    });

    let results = futures::future::join_all((0..6).map(|_| fetcher.fetch(&spec))).await;
    assert_eq!(counters.downloads.load(Ordering::SeqCst), 1);

    let first = results[0].as_ref().unwrap();
    assert_eq!(first.version, "3.2.1");
    assert_eq!(first.source, BinarySource::Provisioned);
    assert_eq!(first.path, dir.path().join("faketool"));
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }

    let manifest = Manifest::load(dir.path()).await;
    let entry = manifest.entry_for("faketool", Platform::LinuxX64).unwrap();
    assert_eq!(entry.version, "3.2.1");
    assert_eq!(entry.sha256, hex::encode(Sha256::digest(TOOL)));

    // leftovers of the temporary download must not remain
    let stray: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .collect();
    assert!(stray.is_empty());
}

#[tokio::test]
async fn test_fetch_reuses_recorded_copy() {
    common::init_tracing();
    let counters = Counters::default();
    let base = spawn_release_server(counters.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = spec(&base, Checksum::Sha256(hex::encode(Sha256::digest(TOOL))));

    fetcher(dir.path()).fetch(&spec).await.unwrap();
    let again = fetcher(dir.path()).fetch(&spec).await.unwrap();
    assert_eq!(again.path, dir.path().join("faketool"));
    assert_eq!(counters.downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_checksum_mismatch_installs_nothing() {
    common::init_tracing();
    let base = spawn_release_server(Counters::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let spec = spec(&base, Checksum::Sha256("00".repeat(32)));

    let err = fetcher(dir.path()).fetch(&spec).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ChecksumMismatch { ref name, .. } if name == "faketool"));
    assert!(!dir.path().join("faketool").exists());
    assert!(Manifest::load(dir.path()).await.binaries.is_empty());
}

#[tokio::test]
async fn test_fetch_with_progress() {
    common::init_tracing();
    let base = spawn_release_server(Counters::default()).await;
    let dir = tempfile::tempdir().unwrap();
    let fetcher = fetcher(dir.path());
    let spec = spec(&base, Checksum::Sha256(hex::encode(Sha256::digest(TOOL))));

    let events: Vec<FetchEvent> = fetcher
        .fetch_with_progress(&spec)
        .map(Result::unwrap)
        .collect()
        .await;

    let phases: Vec<FetchPhase> = events
        .iter()
        .filter_map(|e| match e {
            FetchEvent::Progress(p) => Some(p.phase),
            FetchEvent::Finished(_) => None
        })
        .collect();
    assert_eq!(phases.first(), Some(&FetchPhase::Checksum));
    assert!(phases.contains(&FetchPhase::Downloading));
    assert!(phases.contains(&FetchPhase::Verifying));
    assert_eq!(phases.last(), Some(&FetchPhase::Installing));

    let Some(FetchEvent::Finished(binary)) = events.last() else {
        panic!("fetch did not finish");
    };
    assert_eq!(binary.version, "3.2.1");
}
