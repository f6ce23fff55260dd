//! Legacy `.xls` category-turnover sheets (NSE F&O and equity segments).
//!
//! The first worksheet lists participant categories one per row: category
//! name in column B, buy turnover in C, sell turnover in D (Rs. crore).

use super::{parse_number, DatedRecord, ParseError, SourceParser};
use crate::domain::{DateKey, MetricRecord};
use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, XlsError};
use chrono::NaiveDate;
use std::io::Cursor;

const LABEL_COL: u32 = 1;
const BUY_COL: u32 = 2;
const SELL_COL: u32 = 3;

/// Extracts buy/sell for one category row and derives their mean.
#[derive(Debug, Clone)]
pub struct RetailSheetParser {
    label: String,
    buy_metric: String,
    sell_metric: String,
    avg_metric: String,
}

impl RetailSheetParser {
    pub fn new(
        label: impl Into<String>,
        buy_metric: impl Into<String>,
        sell_metric: impl Into<String>,
        avg_metric: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            buy_metric: buy_metric.into(),
            sell_metric: sell_metric.into(),
            avg_metric: avg_metric.into(),
        }
    }

    /// Row lookup on an already-decoded sheet.
    pub fn read_range(&self, range: &Range<Data>) -> Result<MetricRecord, ParseError> {
        let (Some(start), Some(end)) = (range.start(), range.end()) else {
            return Err(ParseError::RowNotFound(self.label.clone()));
        };

        let row = (start.0..=end.0)
            .find(|&r| {
                range
                    .get_value((r, LABEL_COL))
                    .is_some_and(|cell| cell_text(cell).eq_ignore_ascii_case(&self.label))
            })
            .ok_or_else(|| ParseError::RowNotFound(self.label.clone()))?;

        let buy = self.number_at(range, row, BUY_COL, &self.buy_metric)?;
        let sell = self.number_at(range, row, SELL_COL, &self.sell_metric)?;
        tracing::debug!(label = %self.label, buy, sell, "category row found");

        let mut record = MetricRecord::new();
        record.insert(self.buy_metric.clone(), buy);
        record.insert(self.sell_metric.clone(), sell);
        record.insert(self.avg_metric.clone(), (buy + sell) / 2.0);
        Ok(record)
    }

    fn number_at(
        &self,
        range: &Range<Data>,
        row: u32,
        col: u32,
        metric: &str,
    ) -> Result<f64, ParseError> {
        let cell = range.get_value((row, col)).unwrap_or(&Data::Empty);
        cell_number(cell).ok_or_else(|| ParseError::InvalidNumber {
            field: metric.to_string(),
            value: cell_text(cell),
        })
    }
}

impl SourceParser for RetailSheetParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let mut workbook: Xls<Cursor<Vec<u8>>> = open_workbook_from_rs(Cursor::new(raw.to_vec()))
            .map_err(|e: XlsError| ParseError::Sheet(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| ParseError::Sheet("workbook has no sheets".into()))?
            .map_err(|e: XlsError| ParseError::Sheet(e.to_string()))?;

        let record = self.read_range(&range)?;
        Ok(vec![(DateKey::new(requested), record)])
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        _ => String::new(),
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) if f.is_finite() => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => parse_number(s),
        _ => None,
    }
}
