//! Configuration management
//!
//! Settings are read from environment variables (a `.env` file is honoured)
//! on top of the defaults below, then validated once at startup. The pipeline
//! itself trusts the values it is handed.

use ipgeo_common::IpGeoError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::http::RetryPolicy;

// ============================================================================
// Defaults
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/ipgeo";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Rows per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Smallest accepted batch size; smaller batches spend more time in round trips than in I/O.
pub const MIN_BATCH_SIZE: usize = 1000;

/// Provider page listing the current free city-level download.
pub const DEFAULT_PAGE_URL: &str = "https://db-ip.com/db/download/ip-to-city-lite";

/// Host and path every provider file link starts with.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://download.db-ip.com/free";

/// Directory created next to the executable for downloaded files.
pub const DOWNLOAD_DIR_NAME: &str = "download";

/// Timeout for a single HTTP request (the dataset download can take a while).
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 600;

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ingest: IngestSettings,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub batch_size: usize,
    pub download_dir: PathBuf,
    pub page_url: String,
    pub download_base_url: String,
    pub http_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            download_dir: default_download_dir(),
            page_url: DEFAULT_PAGE_URL.to_string(),
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

/// `download` next to the running executable, or under the working directory
/// when the executable path cannot be resolved.
fn default_download_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DOWNLOAD_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(DOWNLOAD_DIR_NAME))
}

impl Settings {
    /// Load settings from the environment and validate them
    pub fn load() -> Result<Self, IpGeoError> {
        dotenvy::dotenv().ok();

        let defaults = Settings::default();
        let settings = Settings {
            database: DatabaseSettings {
                url: env_or("DATABASE_URL", defaults.database.url),
                max_connections: env_parse(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
                min_connections: env_parse(
                    "DATABASE_MIN_CONNECTIONS",
                    defaults.database.min_connections,
                )?,
                connect_timeout_secs: env_parse(
                    "DATABASE_CONNECT_TIMEOUT",
                    defaults.database.connect_timeout_secs,
                )?,
            },
            ingest: IngestSettings {
                batch_size: env_parse("IPGEO_BATCH_SIZE", defaults.ingest.batch_size)?,
                download_dir: std::env::var("IPGEO_DOWNLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ingest.download_dir),
                page_url: env_or("IPGEO_PAGE_URL", defaults.ingest.page_url),
                download_base_url: env_or(
                    "IPGEO_DOWNLOAD_BASE_URL",
                    defaults.ingest.download_base_url,
                ),
                http_timeout_secs: env_parse(
                    "IPGEO_HTTP_TIMEOUT",
                    defaults.ingest.http_timeout_secs,
                )?,
                retry: RetryPolicy {
                    max_attempts: env_parse(
                        "IPGEO_RETRY_ATTEMPTS",
                        defaults.ingest.retry.max_attempts,
                    )?,
                    backoff_base_secs: env_parse(
                        "IPGEO_RETRY_BACKOFF_BASE",
                        defaults.ingest.retry.backoff_base_secs,
                    )?,
                },
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), IpGeoError> {
        if self.database.url.trim().is_empty() {
            return Err(IpGeoError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(IpGeoError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(IpGeoError::Config(format!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        let batch_size = self.ingest.batch_size;
        if batch_size < MIN_BATCH_SIZE {
            return Err(IpGeoError::invalid_setting(
                "IPGEO_BATCH_SIZE",
                batch_size.to_string(),
                format!("must be at least {MIN_BATCH_SIZE}"),
            ));
        }

        if self.ingest.page_url.trim().is_empty() {
            return Err(IpGeoError::Config("Download page URL cannot be empty".to_string()));
        }

        if self.ingest.download_base_url.trim().is_empty() {
            return Err(IpGeoError::Config("Download base URL cannot be empty".to_string()));
        }

        if self.ingest.http_timeout_secs == 0 {
            return Err(IpGeoError::Config("HTTP timeout must be greater than 0".to_string()));
        }

        if self.ingest.retry.max_attempts == 0 {
            return Err(IpGeoError::invalid_setting(
                "IPGEO_RETRY_ATTEMPTS",
                "0",
                "at least one attempt is required",
            ));
        }

        Ok(())
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> Result<T, IpGeoError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| IpGeoError::invalid_setting(key, raw.clone(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ingest.retry.max_attempts, 3);
        assert!(settings.ingest.download_dir.ends_with(DOWNLOAD_DIR_NAME));
    }

    #[test]
    fn test_batch_size_lower_bound() {
        let mut settings = Settings::default();
        settings.ingest.batch_size = MIN_BATCH_SIZE - 1;
        assert!(settings.validate().is_err());

        settings.ingest.batch_size = MIN_BATCH_SIZE;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_large_batch_size_is_accepted() {
        let mut settings = Settings::default();
        settings.ingest.batch_size = 10_000;
        assert!(settings.validate().is_ok());

        settings.ingest.batch_size = 250_000;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_empty_database_url_rejected() {
        let mut settings = Settings::default();
        settings.database.url = "  ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut settings = Settings::default();
        settings.ingest.retry.max_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_parse_reports_bad_value() {
        std::env::set_var("IPGEO_TEST_ENV_PARSE", "many");
        let result: Result<usize, _> = env_parse("IPGEO_TEST_ENV_PARSE", 1);
        std::env::remove_var("IPGEO_TEST_ENV_PARSE");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("IPGEO_TEST_ENV_PARSE"));
    }

    #[test]
    fn test_env_parse_falls_back_to_default() {
        let value: u64 = env_parse("IPGEO_TEST_ENV_UNSET", 42).unwrap();
        assert_eq!(value, 42);
    }
}
