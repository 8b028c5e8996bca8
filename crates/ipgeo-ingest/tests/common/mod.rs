//! Shared fixtures for integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use ipgeo_ingest::config::IngestSettings;
use ipgeo_ingest::http::RetryPolicy;
use std::io::Write;
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Three ranges: two IPv4, one IPv6 with a quoted city
pub const SAMPLE_CSV: &str = concat!(
    "1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,-27.4766,153.0166\n",
    "1.0.1.0,1.0.3.255,AS,CN,Fujian,Wenzhou,26.0614,119.306\n",
    "\"2001:200::\",\"2001:200:ffff:ffff:ffff:ffff:ffff:ffff\",AS,JP,Tokyo,\"Chiyoda, Tokyo\",35.694,139.754\n",
);

/// Valid first row, unparseable start address on the second
pub const BROKEN_CSV: &str = concat!(
    "1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,-27.4766,153.0166\n",
    "1.0.1.x,1.0.3.255,AS,CN,Fujian,Wenzhou,26.0614,119.306\n",
);

pub fn gzip(content: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Retry policy that never sleeps
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base_secs: 0,
    }
}

/// Settings pointing every URL at `server` and downloads at `download_dir`
pub fn settings(server: &MockServer, download_dir: &Path, batch_size: usize) -> IngestSettings {
    IngestSettings {
        batch_size,
        download_dir: download_dir.to_path_buf(),
        page_url: format!("{}/download", server.uri()),
        download_base_url: format!("{}/free", server.uri()),
        http_timeout_secs: 10,
        retry: fast_retry(),
    }
}

pub fn file_path(month: &str) -> String {
    format!("/free/dbip-city-lite-{month}.csv.gz")
}

/// Download page linking the file for `month` (`YYYY-MM`)
pub fn download_page(server: &MockServer, month: &str) -> String {
    format!(
        r#"<html><body>
        <h1>IP to City Lite</h1>
        <a href="{}{}">Download CSV</a>
        </body></html>"#,
        server.uri(),
        file_path(month)
    )
}

/// Serve the download page for `month`
pub async fn mount_page(server: &MockServer, month: &str) {
    Mock::given(method("GET"))
        .and(path("/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string(download_page(server, month)))
        .mount(server)
        .await;
}

/// Serve `csv` gzip-compressed as the file for `month`, expecting `calls` requests
pub async fn mount_file(server: &MockServer, month: &str, csv: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path(file_path(month)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip(csv)))
        .expect(calls)
        .mount(server)
        .await;
}
