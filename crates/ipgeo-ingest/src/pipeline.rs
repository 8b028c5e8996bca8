//! Pipeline orchestration
//!
//! One run walks through six steps in a fixed order:
//!
//! 1. Locate the latest published dataset
//! 2. Compare its version with the one currently loaded (stop if equal)
//! 3. Download and decompress the file
//! 4. Stream the rows into a fresh staging table
//! 5. Promote the staging table to live and record the version
//! 6. Remove the downloaded file
//!
//! Any error aborts the remaining steps. The downloaded file is left in place
//! in that case so it can be inspected.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::IngestSettings;
use crate::downloader::Downloader;
use crate::error::Result;
use crate::http::HttpClient;
use crate::models::DatasetVersion;
use crate::parser::RecordTransformer;
use crate::promotion::PromotionCoordinator;
use crate::storage::{BatchLoader, StagingTable};
use crate::version_discovery::SourceLocator;
use crate::version_store::VersionStore;

const TOTAL_STEPS: u32 = 6;

/// How the pipeline treats the downloaded file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Remove the download after a successful promotion
    #[default]
    Normal,
    /// Keep the download for inspection
    Debug,
}

/// Path taken by a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The published version is already loaded; nothing was downloaded
    UpToDate { version: DatasetVersion },
    /// A new dataset was loaded and promoted
    Refreshed {
        version: DatasetVersion,
        rows: u64,
        batches: u64,
    },
}

/// Whether the discovered version differs from the loaded one.
///
/// Exact comparison: an older remote version also triggers a reload.
pub fn needs_refresh(current: Option<DatasetVersion>, discovered: DatasetVersion) -> bool {
    current != Some(discovered)
}

/// IP location ingestion pipeline
pub struct Pipeline {
    pool: PgPool,
    locator: SourceLocator,
    downloader: Downloader,
    versions: VersionStore,
    loader: BatchLoader,
    run_mode: RunMode,
}

impl Pipeline {
    pub fn new(pool: PgPool, settings: &IngestSettings, run_mode: RunMode) -> Result<Self> {
        let client =
            HttpClient::new(Duration::from_secs(settings.http_timeout_secs), settings.retry)?;
        let locator = SourceLocator::new(
            client.clone(),
            settings.page_url.clone(),
            &settings.download_base_url,
        )?;

        Ok(Self {
            locator,
            downloader: Downloader::new(client, settings.download_dir.clone()),
            versions: VersionStore::new(pool.clone()),
            loader: BatchLoader::new(settings.batch_size),
            pool,
            run_mode,
        })
    }

    /// Run the pipeline for the current UTC date
    pub async fn run(&self) -> Result<PipelineOutcome> {
        self.run_at(Utc::now().date_naive()).await
    }

    /// Run the pipeline as if today were `today`
    pub async fn run_at(&self, today: NaiveDate) -> Result<PipelineOutcome> {
        let started = Instant::now();
        info!(mode = ?self.run_mode, "Starting IP location ingestion");

        info!("Step 1/{TOTAL_STEPS}: Locating latest dataset...");
        let source = self.locator.locate_latest_at(today).await?;
        info!(url = %source.url, version = %source.version, "Latest dataset located");

        info!("Step 2/{TOTAL_STEPS}: Checking loaded version...");
        let current = self.versions.current_version().await?;
        if !needs_refresh(current, source.version) {
            info!(version = %source.version, "Dataset is up to date, nothing to do");
            return Ok(PipelineOutcome::UpToDate {
                version: source.version,
            });
        }
        match current {
            Some(loaded) => info!(loaded = %loaded, version = %source.version, "Dataset is stale"),
            None => info!(version = %source.version, "No dataset loaded yet"),
        }

        info!("Step 3/{TOTAL_STEPS}: Downloading dataset...");
        let path = self.downloader.fetch(&source.url, &source.filename).await?;

        info!("Step 4/{TOTAL_STEPS}: Loading records into staging...");
        let mut staging = StagingTable::create(&self.pool, source.version).await?;
        let records = RecordTransformer::open(&path)?;
        let stats = self.loader.load(records, &mut staging).await?;
        info!(
            table = staging.name(),
            rows = stats.rows,
            batches = stats.batches,
            "Staging table loaded"
        );

        info!("Step 5/{TOTAL_STEPS}: Promoting staging table...");
        PromotionCoordinator::new(self.pool.clone())
            .promote(&staging, source.version)
            .await?;

        info!("Step 6/{TOTAL_STEPS}: Cleaning up...");
        self.cleanup(&path).await;

        info!(
            version = %source.version,
            rows = stats.rows,
            "Ingestion completed in {:.1}s",
            started.elapsed().as_secs_f64()
        );

        Ok(PipelineOutcome::Refreshed {
            version: source.version,
            rows: stats.rows,
            batches: stats.batches,
        })
    }

    /// Remove the downloaded file unless running in debug mode.
    ///
    /// The dataset is already live at this point, so a failed removal is only
    /// reported.
    async fn cleanup(&self, path: &Path) {
        if self.run_mode == RunMode::Debug {
            info!(path = %path.display(), "Debug mode, keeping downloaded file");
            return;
        }

        match tokio::fs::remove_file(path).await {
            Ok(()) => info!(path = %path.display(), "Removed downloaded file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove downloaded file"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn version(year: i32, month: u32) -> DatasetVersion {
        DatasetVersion::new(year, month).unwrap()
    }

    #[test]
    fn test_never_loaded_needs_refresh() {
        assert!(needs_refresh(None, version(2024, 3)));
    }

    #[test]
    fn test_same_version_is_up_to_date() {
        assert!(!needs_refresh(Some(version(2024, 3)), version(2024, 3)));
    }

    #[test]
    fn test_any_mismatch_needs_refresh() {
        assert!(needs_refresh(Some(version(2024, 2)), version(2024, 3)));
        assert!(needs_refresh(Some(version(2024, 3)), version(2024, 2)));
    }

    #[test]
    fn test_default_run_mode_is_normal() {
        assert_eq!(RunMode::default(), RunMode::Normal);
    }
}
