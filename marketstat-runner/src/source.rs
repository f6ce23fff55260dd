//! Source descriptions: where a source's data lives, how to read it and how
//! its metrics become output columns.

use chrono::{Datelike, NaiveDate};
use marketstat_core::domain::{Exchange, MetricRecord};
use marketstat_core::parse::SourceParser;
use std::fmt;

/// Cell rendering for a metric in the consolidated CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// Counts, quantities, contracts: 0 decimals.
    Integer,
    /// Money amounts and prices: 2 decimals.
    Currency,
    /// Ratios and precise averages: 4 decimals.
    Ratio,
}

impl NumberFormat {
    pub fn format(&self, value: f64) -> String {
        match self {
            NumberFormat::Integer => format!("{value:.0}"),
            NumberFormat::Currency => format!("{value:.2}"),
            NumberFormat::Ratio => format!("{value:.4}"),
        }
    }
}

/// One output column: a metric of the source's records and its CSV header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub metric: String,
    pub header: String,
    pub format: NumberFormat,
}

impl ColumnSpec {
    pub fn new(metric: impl Into<String>, header: impl Into<String>, format: NumberFormat) -> Self {
        Self {
            metric: metric.into(),
            header: header.into(),
            format,
        }
    }

    /// The formatted cell for `record`, or "" if the metric is absent.
    pub fn cell(&self, record: Option<&MetricRecord>) -> String {
        record
            .and_then(|r| r.get(&self.metric))
            .map(|v| self.format.format(v))
            .unwrap_or_default()
    }
}

/// Which dates a source can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Published per date and kept: walk every date in the range.
    Archive,
    /// Only reports the current state: one request per run.
    Snapshot,
}

/// Which header set the source's session sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// File downloads with browser-like headers.
    Download,
    /// JSON APIs.
    Api,
}

/// Everything the collection loop needs to know about one source.
pub struct SourceSpec {
    /// Stable id; also names the cache file.
    pub id: String,
    pub exchange: Exchange,
    pub url_template: String,
    pub kind: RequestKind,
    pub coverage: Coverage,
    /// Leading bytes a valid payload must start with.
    pub magic: Option<Vec<u8>>,
    pub parser: Box<dyn SourceParser>,
    pub columns: Vec<ColumnSpec>,
}

impl SourceSpec {
    /// Request URL for `date`. `today` caps month ranges.
    pub fn request_url(&self, date: NaiveDate, today: NaiveDate) -> String {
        render_url(&self.url_template, date, today)
    }

    /// Metric names the source is expected to produce, in column order.
    pub fn metrics(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.metric.as_str()).collect()
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.header.as_str())
    }
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("id", &self.id)
            .field("exchange", &self.exchange)
            .field("url_template", &self.url_template)
            .field("coverage", &self.coverage)
            .field("columns", &self.columns.len())
            .finish_non_exhaustive()
    }
}

// ── URL templates ────────────────────────────────────────────────────

/// Expand the date placeholders in `template`.
///
/// `{DDMMYYYY}`, `{DDMMYY}`, `{YYYYMMDD}`: the date itself. `{MON}` (`Feb`),
/// `{YYYY}`, `{YY}`: its month and year. `{FROM}` / `{TO}`: first and last
/// day of its month as `DD-MM-YYYY`, the last day capped at `today`.
pub fn render_url(template: &str, date: NaiveDate, today: NaiveDate) -> String {
    let (first, last) = month_bounds(date);
    let to = last.min(today).max(first);
    template
        .replace("{DDMMYYYY}", &date.format("%d%m%Y").to_string())
        .replace("{DDMMYY}", &date.format("%d%m%y").to_string())
        .replace("{YYYYMMDD}", &date.format("%Y%m%d").to_string())
        .replace("{MON}", &date.format("%b").to_string())
        .replace("{YYYY}", &date.format("%Y").to_string())
        .replace("{YY}", &date.format("%y").to_string())
        .replace("{FROM}", &first.format("%d-%m-%Y").to_string())
        .replace("{TO}", &to.format("%d-%m-%Y").to_string())
}

fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(date);
    (first, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn formats_by_column_kind() {
        assert_eq!(NumberFormat::Integer.format(1234.6), "1235");
        assert_eq!(NumberFormat::Currency.format(1234.5), "1234.50");
        assert_eq!(NumberFormat::Ratio.format(0.98766), "0.9877");
    }

    #[test]
    fn absent_metric_is_empty_cell() {
        let col = ColumnSpec::new("NO_OF_CONT", "NSE_NO_OF_CONT", NumberFormat::Integer);
        let rec: MetricRecord = [("NO_OF_TRADE", 1.0)].into_iter().collect();
        assert_eq!(col.cell(Some(&rec)), "");
        assert_eq!(col.cell(None), "");
    }

    #[test]
    fn renders_daily_placeholders() {
        let date = d(2025, 2, 3);
        assert_eq!(render_url("fo{DDMMYYYY}.zip", date, date), "fo03022025.zip");
        assert_eq!(render_url("cat_{DDMMYY}.xls", date, date), "cat_030225.xls");
        assert_eq!(render_url("MS_{YYYYMMDD}-01.csv", date, date), "MS_20250203-01.csv");
    }

    #[test]
    fn renders_month_placeholders() {
        let date = d(2025, 2, 3);
        assert_eq!(
            render_url("month={MON}&year={YY}", date, d(2026, 1, 1)),
            "month=Feb&year=25"
        );
        assert_eq!(render_url("year={YYYY}", date, date), "year=2025");
        assert_eq!(
            render_url("from={FROM}&to={TO}", date, d(2026, 1, 1)),
            "from=01-02-2025&to=28-02-2025"
        );
    }

    #[test]
    fn month_range_is_capped_at_today() {
        assert_eq!(
            render_url("{FROM}..{TO}", d(2025, 12, 9), d(2025, 12, 10)),
            "01-12-2025..10-12-2025"
        );
        assert_eq!(month_bounds(d(2024, 2, 10)).1, d(2024, 2, 29));
        assert_eq!(month_bounds(d(2025, 12, 31)).1, d(2025, 12, 31));
    }
}
