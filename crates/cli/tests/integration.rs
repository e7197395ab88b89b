//! Integration tests for the vcp CLI
//!
//! These tests require a running S3-compatible server.
//!
//! Run with:
//! ```bash
//! # Start RustFS container
//! docker run -d --name rustfs -p 9000:9000 -p 9001:9001 \
//!     -e RUSTFS_ACCESS_KEY=accesskey \
//!     -e RUSTFS_SECRET_KEY=secretkey \
//!     rustfs/rustfs:1.0.0-alpha.81
//!
//! # Run tests
//! TEST_S3_ENDPOINT=http://localhost:9000 TEST_S3_ACCESS_KEY=accesskey \
//!     TEST_S3_SECRET_KEY=secretkey cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;
use vcp_core::{CachedContent, CloudBackend, TransferConfig, TransferEngine};
use vcp_s3::{S3Backend, S3Settings};

/// Get S3 test configuration from environment
fn get_test_config() -> Option<(String, String, String)> {
    let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
    let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
    let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;
    Some((endpoint, access_key, secret_key))
}

/// Run vcp with an isolated config directory
fn run_vcp(args: &[&str], config_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vcp"))
        .args(args)
        .env("VCP_CONFIG_DIR", config_dir)
        .output()
        .expect("Failed to execute vcp")
}

/// Generate unique suffix for test resources
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFF_FFFF)
}

struct Fixture {
    config_dir: TempDir,
    backend: std::sync::Arc<S3Backend>,
    bucket: String,
}

/// Configure the `test` alias and create a fresh bucket
async fn setup(label: &str) -> Option<Fixture> {
    let (endpoint, access_key, secret_key) = get_test_config()?;
    let config_dir = tempfile::tempdir().ok()?;

    let output = run_vcp(
        &[
            "alias",
            "set",
            "test",
            &endpoint,
            &access_key,
            &secret_key,
            "--bucket-lookup",
            "path",
        ],
        config_dir.path(),
    );
    if !output.status.success() {
        eprintln!(
            "Failed to set alias: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        return None;
    }

    let backend = S3Backend::new(S3Settings::new(&endpoint, &access_key, &secret_key))
        .await
        .ok()?;
    let bucket = format!("vcp-{label}-{}", unique_suffix());
    backend.create_container(&bucket).await.ok()?;

    Some(Fixture {
        config_dir,
        backend: std::sync::Arc::new(backend),
        bucket,
    })
}

async fn seed(fixture: &Fixture, key: &str, data: Vec<u8>) {
    let engine = TransferEngine::new(fixture.backend.clone(), TransferConfig::new());
    engine
        .upload_content(&fixture.bucket, key, &CachedContent::InMemory(data))
        .await
        .expect("Failed to seed object");
}

async fn read_object(fixture: &Fixture, bucket: &str, key: &str) -> Vec<u8> {
    use tokio::io::AsyncReadExt;

    let mut reader = fixture
        .backend
        .open_read_stream(bucket, key)
        .await
        .expect("Failed to open object");
    let mut data = Vec::new();
    reader.read_to_end(&mut data).await.expect("Failed to read");
    data
}

#[tokio::test]
async fn test_ls_virtual_tree_json() {
    let Some(fixture) = setup("ls").await else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };
    seed(&fixture, "blob4", b"four".to_vec()).await;
    seed(&fixture, "vdir1/vdir2/blob1", b"one".to_vec()).await;

    let output = run_vcp(
        &["ls", &format!("s3://test/{}/", fixture.bucket), "--json"],
        fixture.config_dir.path(),
    );
    assert!(
        output.status.success(),
        "ls failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Invalid JSON output");
    let paths: Vec<&str> = json["blobs"]
        .as_array()
        .expect("blobs array")
        .iter()
        .filter_map(|b| b["path"].as_str())
        .collect();
    assert_eq!(paths, vec!["blob4", "vdir1/vdir2/blob1"]);
    assert_eq!(json["summary"]["total_size_bytes"], 7);
}

#[tokio::test]
async fn test_recursive_copy_large_blob_multipart() {
    let Some(fixture) = setup("cp").await else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };

    // 12 MiB with 1 MiB blocks commits as a multipart upload
    let pattern: Vec<u8> = (0..12 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    seed(&fixture, "src/big.bin", pattern.clone()).await;
    seed(&fixture, "src/small/a.txt", b"small".to_vec()).await;

    let output = run_vcp(
        &[
            "cp",
            "-r",
            &format!("s3://test/{}/src/", fixture.bucket),
            &format!("s3://test/{}/dst/", fixture.bucket),
            "--chunk-size",
            "1048576",
            "--json",
        ],
        fixture.config_dir.path(),
    );
    assert!(
        output.status.success(),
        "cp failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    assert_eq!(read_object(&fixture, &fixture.bucket, "dst/big.bin").await, pattern);
    assert_eq!(
        read_object(&fixture, &fixture.bucket, "dst/small/a.txt").await,
        b"small"
    );
}

#[tokio::test]
async fn test_copy_missing_blob_exits_not_found() {
    let Some(fixture) = setup("missing").await else {
        eprintln!("Skipping: S3 test config not available");
        return;
    };

    let output = run_vcp(
        &[
            "cp",
            &format!("s3://test/{}/nope.bin", fixture.bucket),
            &format!("s3://test/{}/dst/", fixture.bucket),
        ],
        fixture.config_dir.path(),
    );
    assert_eq!(output.status.code(), Some(5));
}
