//! IPGeo Ingest Library
//!
//! Keeps a PostgreSQL copy of the free DB-IP city-level dataset current.
//!
//! # Pipeline
//!
//! - **Discovery**: find the latest monthly file on the provider's download page
//! - **Version check**: skip the run when that month is already loaded
//! - **Download**: stream the gzip file to disk, decompressing as it arrives
//! - **Load**: parse rows, encode addresses, bulk insert into a staging table
//! - **Promotion**: swap staging in as `ip_location` in one transaction
//!
//! # Example
//!
//! ```no_run
//! use ipgeo_ingest::config::Settings;
//! use ipgeo_ingest::db::{create_pool, run_migrations};
//! use ipgeo_ingest::pipeline::{Pipeline, RunMode};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pool = create_pool(&settings.database).await?;
//!     run_migrations(&pool).await?;
//!
//!     let outcome = Pipeline::new(pool, &settings.ingest, RunMode::Normal)?
//!         .run()
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod address;
pub mod config;
pub mod db;
pub mod downloader;
pub mod error;
pub mod http;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod promotion;
pub mod storage;
pub mod version_discovery;
pub mod version_store;

pub use error::{IngestError, Result};
pub use models::{AddressFamily, DatasetVersion, NormalizedLocationRecord};
pub use pipeline::{Pipeline, PipelineOutcome, RunMode};
