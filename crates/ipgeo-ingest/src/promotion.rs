//! Atomic replacement of the live table by a loaded staging table

use sqlx::PgPool;
use tracing::info;

use crate::error::Result;
use crate::models::DatasetVersion;
use crate::storage::StagingTable;
use crate::version_store::VersionStore;

/// Name of the table readers query
pub const LIVE_TABLE: &str = "ip_location";

/// Unique index built on the live table after each promotion
pub const LIVE_RANGE_INDEX: &str = "ip_location_range_idx";

/// Swaps a staging table in as the live table.
///
/// Drop, rename, index creation and the version update run in one
/// transaction. PostgreSQL DDL is transactional, so readers see either the
/// previous table and version or the new ones, never a mix, and a failure at
/// any step leaves the previous state untouched.
#[derive(Debug, Clone)]
pub struct PromotionCoordinator {
    pool: PgPool,
}

impl PromotionCoordinator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn promote(&self, staging: &StagingTable, version: DatasetVersion) -> Result<()> {
        info!(staging = staging.name(), %version, "Promoting staging table");

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {LIVE_TABLE}"))
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!("ALTER TABLE {} RENAME TO {LIVE_TABLE}", staging.name()))
            .execute(&mut *tx)
            .await?;

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX {LIVE_RANGE_INDEX} ON {LIVE_TABLE} \
             (address_family, start_address_bytes, end_address_bytes)"
        ))
        .execute(&mut *tx)
        .await?;

        VersionStore::record_version(&mut tx, version).await?;

        tx.commit().await?;

        info!(%version, "Live table now serves dataset {}", version);

        Ok(())
    }
}
