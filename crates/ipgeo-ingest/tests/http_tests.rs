//! HTTP-facing tests: retry policy, source discovery and download
//!
//! Run against a local wiremock server, no database required.

mod common;

use chrono::NaiveDate;
use common::{fast_retry, gzip, mount_page, SAMPLE_CSV};
use ipgeo_ingest::downloader::Downloader;
use ipgeo_ingest::http::HttpClient;
use ipgeo_ingest::version_discovery::SourceLocator;
use ipgeo_ingest::{DatasetVersion, IngestError};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::new(Duration::from_secs(5), fast_retry()).unwrap()
}

fn march_2024() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
}

// ============================================================================
// Retry Policy
// ============================================================================

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client()
        .get_text(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = client()
        .get(&format!("{}/missing", server.uri()))
        .await
        .unwrap_err();

    match err {
        IngestError::HttpStatus { status, attempts, .. } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(attempts, 1);
        },
        other => panic!("expected HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retries_stop_after_max_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = client()
        .get(&format!("{}/down", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::HttpStatus { attempts: 3, .. }));
}

#[tokio::test]
async fn test_too_many_requests_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let response = client()
        .get(&format!("{}/busy", server.uri()))
        .await
        .unwrap();

    assert!(response.status().is_success());
}

// ============================================================================
// Source Discovery
// ============================================================================

#[tokio::test]
async fn test_locates_current_month_link() {
    let server = MockServer::start().await;
    mount_page(&server, "2024-03").await;

    let locator = SourceLocator::new(
        client(),
        format!("{}/download", server.uri()),
        &format!("{}/free", server.uri()),
    )
    .unwrap();

    let source = locator.locate_latest_at(march_2024()).await.unwrap();

    assert_eq!(
        source.url,
        format!("{}/free/dbip-city-lite-2024-03.csv.gz", server.uri())
    );
    assert_eq!(source.filename, "dbip-city-lite-2024-03.csv.gz");
    assert_eq!(source.version, DatasetVersion::new(2024, 3).unwrap());
}

#[tokio::test]
async fn test_falls_back_to_previous_month_link() {
    let server = MockServer::start().await;
    mount_page(&server, "2024-02").await;

    let locator = SourceLocator::new(
        client(),
        format!("{}/download", server.uri()),
        &format!("{}/free", server.uri()),
    )
    .unwrap();

    let source = locator.locate_latest_at(march_2024()).await.unwrap();

    assert_eq!(source.filename, "dbip-city-lite-2024-02.csv.gz");
    assert_eq!(source.version, DatasetVersion::new(2024, 2).unwrap());
}

#[tokio::test]
async fn test_page_without_link_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html>Down for maintenance</html>"),
        )
        .mount(&server)
        .await;

    let locator = SourceLocator::new(
        client(),
        format!("{}/download", server.uri()),
        &format!("{}/free", server.uri()),
    )
    .unwrap();

    let err = locator.locate_latest_at(march_2024()).await.unwrap_err();
    assert!(matches!(err, IngestError::SourceLocation { .. }));
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_is_decompressed_to_disk() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/free/dbip-city-lite-2024-03.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(SAMPLE_CSV)))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let download_dir = temp_dir.path().join("download");
    let downloader = Downloader::new(client(), &download_dir);

    let path = downloader
        .fetch(
            &format!("{}/free/dbip-city-lite-2024-03.csv.gz", server.uri()),
            "dbip-city-lite-2024-03.csv.gz",
        )
        .await
        .unwrap();

    assert_eq!(path, download_dir.join("dbip-city-lite-2024-03.csv"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CSV);
}

#[tokio::test]
async fn test_download_overwrites_existing_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/free/dbip-city-lite-2024-03.csv.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(SAMPLE_CSV)))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let stale = temp_dir.path().join("dbip-city-lite-2024-03.csv");
    let leftover = "left over from an earlier run, much longer than the new file ".repeat(20);
    std::fs::write(&stale, leftover).unwrap();

    let path = Downloader::new(client(), temp_dir.path())
        .fetch(
            &format!("{}/free/dbip-city-lite-2024-03.csv.gz", server.uri()),
            "dbip-city-lite-2024-03.csv.gz",
        )
        .await
        .unwrap();

    assert_eq!(path, stale);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_CSV);
}

#[tokio::test]
async fn test_failed_download_creates_no_file() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/free/dbip-city-lite-2024-03.csv.gz"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let err = Downloader::new(client(), temp_dir.path())
        .fetch(
            &format!("{}/free/dbip-city-lite-2024-03.csv.gz", server.uri()),
            "dbip-city-lite-2024-03.csv.gz",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::HttpStatus { attempts: 3, .. }));
    assert!(!temp_dir.path().join("dbip-city-lite-2024-03.csv").exists());
}
