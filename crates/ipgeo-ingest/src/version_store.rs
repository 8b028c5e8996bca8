//! The single "currently loaded dataset version" record

use chrono::NaiveDate;
use sqlx::{PgConnection, PgPool};

use crate::error::Result;
use crate::models::DatasetVersion;

/// Reads and writes the persisted dataset version.
///
/// `ip_location_version` holds at most one row; its absence means no dataset
/// was ever promoted.
#[derive(Debug, Clone)]
pub struct VersionStore {
    pool: PgPool,
}

impl VersionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Version currently promoted, or `None` when nothing was ever loaded
    pub async fn current_version(&self) -> Result<Option<DatasetVersion>> {
        let version: Option<NaiveDate> =
            sqlx::query_scalar("SELECT version FROM ip_location_version LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.map(DatasetVersion::from_date))
    }

    /// Upsert the version row on `conn`.
    ///
    /// Pass the promotion transaction so the version changes together with the
    /// live table.
    pub async fn record_version(conn: &mut PgConnection, version: DatasetVersion) -> Result<()> {
        let updated = sqlx::query("UPDATE ip_location_version SET version = $1")
            .bind(version.first_day())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if updated == 0 {
            sqlx::query("INSERT INTO ip_location_version (version) VALUES ($1)")
                .bind(version.first_day())
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}
