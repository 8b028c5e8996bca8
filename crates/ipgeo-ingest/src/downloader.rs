//! Dataset download with on-the-fly gzip decompression

use flate2::write::GzDecoder;
use futures::StreamExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{IngestError, Result};
use crate::http::HttpClient;

/// Downloads the provider file into a local directory
#[derive(Debug, Clone)]
pub struct Downloader {
    client: HttpClient,
    download_dir: PathBuf,
}

/// Local name for a downloaded file: the remote name without its `.gz` suffix
pub fn local_file_name(filename: &str) -> &str {
    filename.strip_suffix(".gz").unwrap_or(filename)
}

impl Downloader {
    pub fn new(client: HttpClient, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Download `url` and write its decompressed contents to
    /// `{download_dir}/{filename without .gz}`.
    ///
    /// The body is decompressed chunk by chunk as it arrives, so memory use does
    /// not grow with the file size. An existing file of the same name is
    /// overwritten.
    pub async fn fetch(&self, url: &str, filename: &str) -> Result<PathBuf> {
        let response = self.client.get(url).await?;
        let total_size = response.content_length();

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(local_file_name(filename));

        info!(
            url,
            path = %path.display(),
            compressed_bytes = total_size,
            "Downloading dataset"
        );

        let mut decoder = GzDecoder::new(BufWriter::new(File::create(&path)?));
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| IngestError::Http {
                url: url.to_string(),
                attempts: 1,
                source,
            })?;
            decoder.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
        }

        let mut writer = decoder.finish()?;
        writer.flush()?;

        let decompressed = tokio::fs::metadata(&path).await?.len();
        info!(
            compressed_bytes = downloaded,
            decompressed_bytes = decompressed,
            "Downloaded {} ({} MB)",
            path.display(),
            decompressed / (1024 * 1024)
        );

        Ok(path)
    }
}
