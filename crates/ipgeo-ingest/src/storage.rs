//! Staging table creation and batched loading

use async_trait::async_trait;
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{DatasetVersion, NormalizedLocationRecord};

/// Prefix of per-version staging tables
pub const STAGING_TABLE_PREFIX: &str = "ip_location_staging_";

/// Name of the staging table for `version`, e.g. `ip_location_staging_2024_03`
pub fn staging_table_name(version: DatasetVersion) -> String {
    format!("{STAGING_TABLE_PREFIX}{}", version.table_suffix())
}

/// Destination for batches of normalized records
#[async_trait]
pub trait BatchSink: Send {
    async fn insert_batch(&mut self, batch: &[NormalizedLocationRecord]) -> Result<()>;
}

/// Load statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: u64,
    pub batches: u64,
}

/// Groups a record stream into fixed-size batches and hands them to a sink
#[derive(Debug, Clone, Copy)]
pub struct BatchLoader {
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Drain `records` into `sink`.
    ///
    /// Every batch except the last holds exactly `batch_size` records, and an
    /// empty stream produces no batch at all. The first record error or sink
    /// error stops the load; batches already written stay in the sink.
    pub async fn load<I, S>(&self, records: I, sink: &mut S) -> Result<LoadStats>
    where
        I: IntoIterator<Item = Result<NormalizedLocationRecord>>,
        S: BatchSink + ?Sized,
    {
        let mut stats = LoadStats::default();
        let mut buffer = Vec::with_capacity(self.batch_size);

        for record in records {
            buffer.push(record?);

            if buffer.len() == self.batch_size {
                self.flush(&mut buffer, sink, &mut stats).await?;
            }
        }

        if !buffer.is_empty() {
            self.flush(&mut buffer, sink, &mut stats).await?;
        }

        Ok(stats)
    }

    async fn flush<S>(
        &self,
        buffer: &mut Vec<NormalizedLocationRecord>,
        sink: &mut S,
        stats: &mut LoadStats,
    ) -> Result<()>
    where
        S: BatchSink + ?Sized,
    {
        sink.insert_batch(buffer.as_slice()).await?;

        stats.rows += buffer.len() as u64;
        stats.batches += 1;
        buffer.clear();

        if stats.batches % 100 == 0 {
            info!("Loaded {} rows in {} batches", stats.rows, stats.batches);
        } else {
            debug!(rows = stats.rows, batch = stats.batches, "Batch written");
        }

        Ok(())
    }
}

/// A freshly created, empty staging table for one dataset version
#[derive(Debug, Clone)]
pub struct StagingTable {
    pool: PgPool,
    name: String,
}

impl StagingTable {
    /// Drop every leftover staging table, whatever its version, and create
    /// the one for `version` empty.
    pub async fn create(pool: &PgPool, version: DatasetVersion) -> Result<Self> {
        let name = staging_table_name(version);

        drop_leftover_tables(pool).await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE {name} (
                address_family SMALLINT NOT NULL CHECK (address_family IN (4, 6)),
                start_address_bytes BYTEA NOT NULL CHECK (octet_length(start_address_bytes) = 16),
                end_address_bytes BYTEA NOT NULL CHECK (octet_length(end_address_bytes) = 16),
                start_address VARCHAR(39) NOT NULL,
                end_address VARCHAR(39) NOT NULL,
                continent VARCHAR(2),
                country VARCHAR(2),
                region VARCHAR(255),
                city VARCHAR(255),
                latitude NUMERIC(9, 6),
                longitude NUMERIC(9, 6)
            )
            "#
        ))
        .execute(pool)
        .await?;

        info!(table = %name, "Created staging table");

        Ok(Self {
            pool: pool.clone(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn row_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.name))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Staging tables left behind by aborted runs, any version
pub async fn leftover_staging_tables(pool: &PgPool) -> Result<Vec<String>> {
    let tables: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT tablename::text
        FROM pg_tables
        WHERE schemaname = current_schema()
          AND tablename LIKE 'ip\_location\_staging\_%'
        ORDER BY tablename
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(tables)
}

async fn drop_leftover_tables(pool: &PgPool) -> Result<()> {
    for table in leftover_staging_tables(pool).await? {
        sqlx::query(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .execute(pool)
            .await?;
        info!(table = %table, "Dropped leftover staging table");
    }

    Ok(())
}

#[async_trait]
impl BatchSink for StagingTable {
    /// Write `batch` with one statement.
    ///
    /// Each column is bound as a single array and expanded with `UNNEST`, so
    /// the parameter count stays at 11 whatever the batch size.
    async fn insert_batch(&mut self, batch: &[NormalizedLocationRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut families = Vec::with_capacity(batch.len());
        let mut start_bytes = Vec::with_capacity(batch.len());
        let mut end_bytes = Vec::with_capacity(batch.len());
        let mut start_addresses = Vec::with_capacity(batch.len());
        let mut end_addresses = Vec::with_capacity(batch.len());
        let mut continents = Vec::with_capacity(batch.len());
        let mut countries = Vec::with_capacity(batch.len());
        let mut regions = Vec::with_capacity(batch.len());
        let mut cities = Vec::with_capacity(batch.len());
        let mut latitudes: Vec<Option<BigDecimal>> = Vec::with_capacity(batch.len());
        let mut longitudes: Vec<Option<BigDecimal>> = Vec::with_capacity(batch.len());

        for record in batch {
            families.push(record.family().tag());
            start_bytes.push(record.start.padded().to_vec());
            end_bytes.push(record.end.padded().to_vec());
            start_addresses.push(record.start_address.as_str());
            end_addresses.push(record.end_address.as_str());
            continents.push(record.continent.as_deref());
            countries.push(record.country.as_deref());
            regions.push(record.region.as_deref());
            cities.push(record.city.as_deref());
            latitudes.push(record.latitude.clone());
            longitudes.push(record.longitude.clone());
        }

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (
                address_family,
                start_address_bytes,
                end_address_bytes,
                start_address,
                end_address,
                continent,
                country,
                region,
                city,
                latitude,
                longitude
            )
            SELECT * FROM UNNEST(
                $1::smallint[],
                $2::bytea[],
                $3::bytea[],
                $4::text[],
                $5::text[],
                $6::text[],
                $7::text[],
                $8::text[],
                $9::text[],
                $10::numeric[],
                $11::numeric[]
            )
            "#,
            self.name
        ))
        .bind(families)
        .bind(start_bytes)
        .bind(end_bytes)
        .bind(start_addresses)
        .bind(end_addresses)
        .bind(continents)
        .bind(countries)
        .bind(regions)
        .bind(cities)
        .bind(latitudes)
        .bind(longitudes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
