//! Streaming parser for the decompressed provider CSV
//!
//! The file has no header row. Columns map by position to
//! `start, end, continent, country, region, city, latitude, longitude`.

use csv::{ReaderBuilder, StringRecordsIntoIter};
use sqlx::types::BigDecimal;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::address::parse_address;
use crate::error::{IngestError, Result};
use crate::models::{NormalizedLocationRecord, RawLocationRow};

/// Number of columns in every provider row
pub const COLUMN_COUNT: usize = 8;

/// Lazy, forward-only sequence of normalized records read from a file.
///
/// Yields `Err` for the first row that cannot be normalized; callers are
/// expected to stop there, an unparseable address means the file format changed.
pub struct RecordTransformer {
    rows: StringRecordsIntoIter<File>,
    row: u64,
}

impl RecordTransformer {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        Ok(Self {
            rows: reader.into_records(),
            row: 0,
        })
    }
}

impl Iterator for RecordTransformer {
    type Item = Result<NormalizedLocationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.rows.next()?;
        self.row += 1;
        let row = self.row;

        Some(record.map_err(IngestError::from).and_then(|record| {
            if record.len() != COLUMN_COUNT {
                return Err(IngestError::ColumnCount {
                    row,
                    expected: COLUMN_COUNT,
                    found: record.len(),
                });
            }
            let raw: RawLocationRow = record.deserialize(None)?;
            normalize(raw, row)
        }))
    }
}

/// Turn one raw row into a record, failing on any address or decimal problem
pub fn normalize(raw: RawLocationRow, row: u64) -> Result<NormalizedLocationRecord> {
    let start = parse_address(&raw.start_address).map_err(|source| IngestError::RecordParse {
        row,
        field: "start address",
        value: raw.start_address.clone(),
        source,
    })?;
    let end = parse_address(&raw.end_address).map_err(|source| IngestError::RecordParse {
        row,
        field: "end address",
        value: raw.end_address.clone(),
        source,
    })?;

    if start.family() != end.family() {
        return Err(IngestError::MixedFamily {
            row,
            start: raw.start_address,
            end: raw.end_address,
        });
    }

    let latitude = parse_decimal(raw.latitude.as_deref(), "latitude", row)?;
    let longitude = parse_decimal(raw.longitude.as_deref(), "longitude", row)?;

    Ok(NormalizedLocationRecord {
        start,
        end,
        start_address: raw.start_address,
        end_address: raw.end_address,
        continent: non_blank(raw.continent),
        country: non_blank(raw.country),
        region: non_blank(raw.region),
        city: non_blank(raw.city),
        latitude,
        longitude,
    })
}

/// Blank decimals stay unset instead of becoming zero
fn parse_decimal(value: Option<&str>, field: &'static str, row: u64) -> Result<Option<BigDecimal>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => BigDecimal::from_str(text)
            .map(Some)
            .map_err(|_| IngestError::InvalidDecimal {
                row,
                field,
                value: text.to_string(),
            }),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::models::AddressFamily;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parses_ipv4_and_ipv6_rows() {
        let file = write_csv(concat!(
            "1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,-27.4766,153.0166\n",
            "\"2001:200::\",\"2001:200:ffff:ffff:ffff:ffff:ffff:ffff\",AS,JP,Tokyo,\"Chiyoda, Tokyo\",35.694,139.754\n",
        ));

        let records: Vec<_> = RecordTransformer::open(file.path())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].family(), AddressFamily::V4);
        assert_eq!(records[0].start.as_bytes(), &[1, 0, 0, 0]);
        assert_eq!(records[0].end.as_bytes(), &[1, 0, 0, 255]);
        assert_eq!(records[0].country.as_deref(), Some("AU"));
        assert_eq!(records[0].latitude, Some(BigDecimal::from_str("-27.4766").unwrap()));

        assert_eq!(records[1].family(), AddressFamily::V6);
        assert_eq!(records[1].end.as_bytes().len(), 16);
        assert_eq!(records[1].city.as_deref(), Some("Chiyoda, Tokyo"));
    }

    #[test]
    fn test_blank_optional_fields_stay_unset() {
        let file = write_csv("10.0.0.0,10.255.255.255,,ZZ,,,,\n");

        let record = RecordTransformer::open(file.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();

        assert_eq!(record.continent, None);
        assert_eq!(record.country.as_deref(), Some("ZZ"));
        assert_eq!(record.region, None);
        assert_eq!(record.city, None);
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
    }

    #[test]
    fn test_unparseable_address_reports_row() {
        let file = write_csv(concat!(
            "1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,-27.4766,153.0166\n",
            "not-an-ip,1.0.1.255,AS,CN,Fujian,Wenzhou,26.0614,119.306\n",
        ));

        let mut records = RecordTransformer::open(file.path()).unwrap();
        assert!(records.next().unwrap().is_ok());

        match records.next().unwrap() {
            Err(IngestError::RecordParse { row, field, value, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(field, "start address");
                assert_eq!(value, "not-an-ip");
            },
            other => panic!("expected RecordParse, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_families_are_rejected() {
        let raw = RawLocationRow {
            start_address: "1.0.0.0".to_string(),
            end_address: "::ffff".to_string(),
            continent: None,
            country: None,
            region: None,
            city: None,
            latitude: None,
            longitude: None,
        };

        assert!(matches!(normalize(raw, 7), Err(IngestError::MixedFamily { row: 7, .. })));
    }

    #[test]
    fn test_bad_decimal_is_rejected() {
        let file = write_csv("1.0.0.0,1.0.0.255,OC,AU,Queensland,South Brisbane,north,153.0166\n");

        let result = RecordTransformer::open(file.path()).unwrap().next().unwrap();
        assert!(matches!(
            result,
            Err(IngestError::InvalidDecimal { field: "latitude", .. })
        ));
    }

    #[test]
    fn test_wrong_column_count_is_an_error() {
        let file = write_csv("1.0.0.0,1.0.0.255,OC\n");
        let result = RecordTransformer::open(file.path()).unwrap().next().unwrap();
        assert!(matches!(
            result,
            Err(IngestError::ColumnCount { row: 1, expected: 8, found: 3 })
        ));
    }

    #[test]
    fn test_empty_file_yields_nothing() {
        let file = write_csv("");
        assert_eq!(RecordTransformer::open(file.path()).unwrap().count(), 0);
    }
}
