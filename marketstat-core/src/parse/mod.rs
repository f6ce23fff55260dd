//! Source parsers: raw downloaded bytes → date-keyed metric records.
//!
//! Single-day parsers return exactly one record keyed by the requested date.
//! Batch parsers (month-wide JSON APIs) return one record per date embedded in
//! the payload and ignore the requested date.

pub mod archive;
pub mod delimited;
pub mod json;
pub mod sheet;

pub use archive::{ArchiveCsvParser, MemberPattern, SerialRowsParser};
pub use delimited::{FilteredCsvParser, LabelledRowParser, NamedColumn};
pub use json::{JsonRecordsParser, JsonScalarParser, MetricField, SegmentOrdersParser};
pub use sheet::RetailSheetParser;

use crate::domain::{DateKey, MetricRecord};
use chrono::NaiveDate;
use thiserror::Error;

/// One parsed record and the trading date it belongs to.
pub type DatedRecord = (DateKey, MetricRecord);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid archive: {0}")]
    Archive(String),

    #[error("no archive member matching {0}")]
    MemberNotFound(String),

    #[error("content guard '{0}' not found, not the expected file")]
    GuardMissing(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("none of the target columns found (header: {0})")]
    NoTargetColumns(String),

    #[error("no rows matched the category filter")]
    NoMatchingRows,

    #[error("row '{0}' not found")]
    RowNotFound(String),

    #[error("non-numeric value for {field}: '{value}'")]
    InvalidNumber { field: String, value: String },

    #[error("invalid spreadsheet: {0}")]
    Sheet(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("no dated records in payload")]
    NoRecords,
}

/// Turns one downloaded payload into records.
pub trait SourceParser: Send + Sync {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError>;
}

/// Parse a numeric cell as published by the exchanges: surrounding quotes and
/// whitespace ignored, comma grouping stripped ("25,20,07,360").
///
/// Empty or non-numeric cells yield `None`.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Like [`parse_number`], but an unparseable cell is an error naming `field`.
pub(crate) fn require_number(field: &str, cell: &str) -> Result<f64, ParseError> {
    parse_number(cell).ok_or_else(|| ParseError::InvalidNumber {
        field: field.to_string(),
        value: cell.trim().to_string(),
    })
}

/// Decode as UTF-8, dropping invalid sequences (some archives carry stray
/// Latin-1 bytes in their title rows).
pub(crate) fn decode_lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).replace('\u{FFFD}', "")
}
