//! Error types for the ingestion pipeline

use std::net::AddrParseError;

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Every failure the pipeline can report.
///
/// All variants are fatal to a run: they propagate to the orchestrator, get
/// logged with their full cause chain and end the process with a non-zero code.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Neither the expected link nor the fallback pattern matched the download page
    #[error("No download link found on {page_url}")]
    SourceLocation { page_url: String },

    /// Connection or timeout failure, after the retry budget was spent
    #[error("Request to {url} failed after {attempts} attempt(s)")]
    Http {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success status, after the retry budget was spent for retryable codes
    #[error("Request to {url} returned {status} after {attempts} attempt(s)")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        attempts: u32,
    },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Row {row}: {field} '{value}' is not a valid IPv4 or IPv6 address")]
    RecordParse {
        row: u64,
        field: &'static str,
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("Row {row}: start {start} and end {end} belong to different address families")]
    MixedFamily { row: u64, start: String, end: String },

    #[error("Row {row}: expected {expected} columns, found {found}")]
    ColumnCount {
        row: u64,
        expected: usize,
        found: usize,
    },

    #[error("Row {row}: {field} '{value}' is not a decimal number")]
    InvalidDecimal {
        row: u64,
        field: &'static str,
        value: String,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<regex::Error> for IngestError {
    fn from(err: regex::Error) -> Self {
        IngestError::Config(format!("invalid link pattern: {err}"))
    }
}

impl From<ipgeo_common::IpGeoError> for IngestError {
    fn from(err: ipgeo_common::IpGeoError) -> Self {
        IngestError::Config(err.to_string())
    }
}
