//! Data model for the IP location dataset

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;

use crate::address::EncodedAddress;
use crate::error::{IngestError, Result};

/// One published release of the dataset, identified by its calendar month.
///
/// Ordering is chronological, but the pipeline compares versions only for
/// equality when deciding whether to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatasetVersion {
    year: i32,
    month: u32,
}

impl DatasetVersion {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(IngestError::Version(format!(
                "month {month} is out of range in {year:04}-{month:02}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(IngestError::Version(format!("year {year} is out of range")));
        }
        Ok(Self { year, month })
    }

    /// Version of the month containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First day of the release month, the persisted representation
    pub fn first_day(&self) -> NaiveDate {
        // Fields are range checked on construction, so the date always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Suffix used in table names, e.g. `2024_03`
    pub fn table_suffix(&self) -> String {
        format!("{:04}_{:02}", self.year, self.month)
    }
}

impl fmt::Display for DatasetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for DatasetVersion {
    type Err = IngestError;

    /// Parses the `YYYY-MM` form used in provider file names
    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| IngestError::Version(format!("expected YYYY-MM, got '{s}'")))?;

        if year.len() != 4 || month.len() != 2 {
            return Err(IngestError::Version(format!("expected YYYY-MM, got '{s}'")));
        }

        let year: i32 = year
            .parse()
            .map_err(|_| IngestError::Version(format!("invalid year in '{s}'")))?;
        let month: u32 = month
            .parse()
            .map_err(|_| IngestError::Version(format!("invalid month in '{s}'")))?;

        Self::new(year, month)
    }
}

/// Address family tag stored with every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    /// Numeric tag persisted in the `address_family` column
    pub fn tag(self) -> i16 {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 6,
        }
    }

    /// Byte length of an address of this family before padding
    pub fn byte_len(self) -> usize {
        match self {
            AddressFamily::V4 => 4,
            AddressFamily::V6 => 16,
        }
    }
}

/// One line of the provider CSV, mapped by position
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLocationRow {
    pub start_address: String,
    pub end_address: String,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// A row ready to be written to the staging table.
///
/// `start` and `end` always share one address family; the transformer rejects
/// rows where they do not.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLocationRecord {
    pub start: EncodedAddress,
    pub end: EncodedAddress,
    pub start_address: String,
    pub end_address: String,
    pub continent: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<BigDecimal>,
    pub longitude: Option<BigDecimal>,
}

impl NormalizedLocationRecord {
    pub fn family(&self) -> AddressFamily {
        self.start.family()
    }
}
