//! NSE / BSE JSON APIs: month-wide historical reports, the market-turnover
//! snapshot and single-value statistics.

use super::{parse_number, DatedRecord, ParseError, SourceParser};
use crate::domain::{DateKey, MetricRecord};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Date formats seen across the historical APIs, tried in order.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d %b %Y",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
];

/// How many `data` wrappers may sit above the record list.
const MAX_DATA_DEPTH: usize = 2;

/// A metric and the field names it may appear under, in preference order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricField {
    pub metric: String,
    pub alternates: Vec<String>,
}

impl MetricField {
    pub fn new(metric: impl Into<String>, alternates: &[&str]) -> Self {
        Self {
            metric: metric.into(),
            alternates: alternates.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn read(&self, record: &Value) -> Option<f64> {
        self.alternates
            .iter()
            .find_map(|name| record.get(name).and_then(json_number))
    }
}

/// A list of dated records, one per trading day.
///
/// The list is found under up to two levels of `data`; each record may wrap
/// its fields in a nested `data` object. Records whose date cannot be parsed
/// are dropped.
#[derive(Debug, Clone)]
pub struct JsonRecordsParser {
    date_fields: Vec<String>,
    date_formats: Vec<String>,
    fields: Vec<MetricField>,
}

impl JsonRecordsParser {
    pub fn new(date_fields: &[&str], fields: Vec<MetricField>) -> Self {
        Self {
            date_fields: date_fields.iter().map(|f| f.to_string()).collect(),
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|f| f.to_string()).collect(),
            fields,
        }
    }

    pub fn with_date_formats(mut self, formats: &[&str]) -> Self {
        self.date_formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }

    fn record_date(&self, record: &Value) -> Option<NaiveDate> {
        let text = self
            .date_fields
            .iter()
            .filter_map(|f| record.get(f).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())?;
        parse_date_with(text, &self.date_formats)
    }
}

impl SourceParser for JsonRecordsParser {
    fn parse(&self, raw: &[u8], _requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let root: Value = serde_json::from_slice(raw).map_err(|e| ParseError::Json(e.to_string()))?;
        let items = find_list(&root, MAX_DATA_DEPTH)
            .ok_or_else(|| ParseError::Malformed("no record list under 'data'".into()))?;

        let mut out = Vec::new();
        let mut undated = 0usize;
        for item in items {
            let record = unwrap_data(item);
            let Some(date) = self.record_date(record) else {
                undated += 1;
                continue;
            };
            let metrics: MetricRecord = self
                .fields
                .iter()
                .filter_map(|f| f.read(record).map(|v| (f.metric.clone(), v)))
                .collect();
            if !metrics.is_empty() {
                out.push((DateKey::new(date), metrics));
            }
        }

        if undated > 0 {
            tracing::debug!(undated, "dropped records without a parseable date");
        }
        if out.is_empty() {
            return Err(ParseError::NoRecords);
        }
        Ok(out)
    }
}

/// One number from a fixed location, keyed by the requested date.
///
/// Paths are dot-separated; numeric segments index arrays
/// (`Table.0.Inv_count`). The first path that resolves to a number wins.
#[derive(Debug, Clone)]
pub struct JsonScalarParser {
    metric: String,
    paths: Vec<String>,
}

impl JsonScalarParser {
    pub fn new(metric: impl Into<String>, paths: &[&str]) -> Self {
        Self {
            metric: metric.into(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl SourceParser for JsonScalarParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let root: Value = serde_json::from_slice(raw).map_err(|e| ParseError::Json(e.to_string()))?;
        let value = self
            .paths
            .iter()
            .find_map(|path| lookup(&root, path).and_then(json_number))
            .ok_or_else(|| {
                ParseError::Malformed(format!("no numeric value at {}", self.paths.join(" | ")))
            })?;

        let mut record = MetricRecord::new();
        record.insert(self.metric.clone(), value);
        Ok(vec![(DateKey::new(requested), record)])
    }
}

/// Market-turnover snapshot: one item per segment with an order count.
///
/// The record is keyed by the first item's `updatedOn` timestamp, not by the
/// requested date: the API reports the most recent session.
#[derive(Debug, Clone, Default)]
pub struct SegmentOrdersParser;

impl SegmentOrdersParser {
    pub const EQUITY_ORDERS: &'static str = "EQUITY_TOTAL_NO_OF_ORDERS";
    pub const FO_ORDERS: &'static str = "FO_TOTAL_NO_OF_ORDERS";
    pub const COMMODITY_ORDERS: &'static str = "COMMODITY_TOTAL_NO_OF_ORDERS";
    pub const MF_ORDERS: &'static str = "MF_NO_OF_ORDERS";
    pub const MF_TURNOVER: &'static str = "MF_NOTIONAL_TURNOVER";

    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    Equity,
    EquityDerivatives,
    Commodity,
    MutualFund,
}

fn classify(name: &str) -> Option<Segment> {
    let name = name.to_lowercase();
    if name.contains("equit") && !name.contains("deriv") {
        Some(Segment::Equity)
    } else if name.contains("equity") && name.contains("deriv") {
        Some(Segment::EquityDerivatives)
    } else if name.contains("commodity") {
        Some(Segment::Commodity)
    } else if name.contains("mutual") || name.contains("mf") {
        Some(Segment::MutualFund)
    } else {
        None
    }
}

impl SourceParser for SegmentOrdersParser {
    fn parse(&self, raw: &[u8], _requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let root: Value = serde_json::from_slice(raw).map_err(|e| ParseError::Json(e.to_string()))?;
        let items = find_list(&root, MAX_DATA_DEPTH)
            .ok_or_else(|| ParseError::Malformed("no segment list under 'data'".into()))?;

        let date = items
            .iter()
            .filter_map(|item| item.get("updatedOn").and_then(Value::as_str))
            .find_map(|ts| parse_date_with(ts.trim(), DEFAULT_DATE_FORMATS))
            .ok_or_else(|| ParseError::Malformed("no parseable 'updatedOn' timestamp".into()))?;

        let mut record = MetricRecord::new();
        for item in items {
            let name = item.get("segment").and_then(Value::as_str).unwrap_or("").trim();
            let orders = item.get("noOfOrders").and_then(json_number);
            tracing::debug!(segment = name, orders, "turnover segment");

            let Some(segment) = classify(name) else {
                continue;
            };
            let metric = match segment {
                Segment::Equity => Self::EQUITY_ORDERS,
                Segment::EquityDerivatives => Self::FO_ORDERS,
                Segment::Commodity => Self::COMMODITY_ORDERS,
                Segment::MutualFund => {
                    if let Some(value) = item.get("totalValue").and_then(json_number) {
                        record.insert(Self::MF_TURNOVER, value);
                    }
                    Self::MF_ORDERS
                }
            };
            if let Some(orders) = orders {
                record.insert(metric, orders);
            }
        }

        if record.is_empty() {
            return Err(ParseError::NoRecords);
        }
        Ok(vec![(DateKey::new(date), record)])
    }
}

// ── JSON helpers ─────────────────────────────────────────────────────

/// A JSON number, or a string holding one (comma grouping allowed).
pub fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Parse `text` with the first matching format. Formats carrying a time part
/// are parsed as timestamps and truncated to the date.
pub fn parse_date_with<S: AsRef<str>>(text: &str, formats: &[S]) -> Option<NaiveDate> {
    formats.iter().find_map(|fmt| {
        let fmt: &str = fmt.as_ref();
        if fmt.contains("%H") {
            NaiveDateTime::parse_from_str(text, fmt).ok().map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(text, fmt).ok()
        }
    })
}

fn find_list(value: &Value, depth: usize) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) if depth > 0 => map.get("data").and_then(|inner| find_list(inner, depth - 1)),
        _ => None,
    }
}

fn unwrap_data(record: &Value) -> &Value {
    match record.get("data") {
        Some(inner) if inner.is_object() => inner,
        _ => record,
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |node, segment| match node {
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    fn cm_parser() -> JsonRecordsParser {
        JsonRecordsParser::new(
            &["F_TIMESTAMP", "CDT_DATE_ORDER", "date"],
            vec![
                MetricField::new("CM_NOS_OF_TRADES", &["CDT_NOS_OF_TRADES", "NOS_OF_TRADES"]),
                MetricField::new("CM_TRADES_VALUES", &["CDT_TRADES_VALUES", "TRADES_VALUES"]),
            ],
        )
    }

    #[test]
    fn reads_month_of_nested_records() {
        let raw = bytes(json!({
            "data": [
                {"data": {"F_TIMESTAMP": "03-Feb-2025", "CDT_NOS_OF_TRADES": 1200, "CDT_TRADES_VALUES": "1,05,000.50"}},
                {"F_TIMESTAMP": "", "CDT_DATE_ORDER": "04-Feb-2025", "NOS_OF_TRADES": "900"},
                {"F_TIMESTAMP": "Total", "CDT_NOS_OF_TRADES": 2100}
            ]
        }));
        let out = cm_parser().parse(&raw, d(2025, 2, 3)).unwrap();
        assert_eq!(out.len(), 2);

        assert_eq!(out[0].0, DateKey::new(d(2025, 2, 3)));
        assert_eq!(out[0].1.get("CM_NOS_OF_TRADES"), Some(1200.0));
        assert_eq!(out[0].1.get("CM_TRADES_VALUES"), Some(105_000.5));

        assert_eq!(out[1].0, DateKey::new(d(2025, 2, 4)));
        assert_eq!(out[1].1.get("CM_NOS_OF_TRADES"), Some(900.0));
        assert_eq!(out[1].1.get("CM_TRADES_VALUES"), None);
    }

    #[test]
    fn finds_list_two_levels_down() {
        let raw = bytes(json!({"data": {"data": [{"date": "2025-02-05", "NOS_OF_TRADES": 1}]}}));
        let out = cm_parser().parse(&raw, d(2025, 2, 1)).unwrap();
        assert_eq!(out[0].0, DateKey::new(d(2025, 2, 5)));
    }

    #[test]
    fn empty_month_is_no_records() {
        let raw = bytes(json!({"data": []}));
        assert_eq!(cm_parser().parse(&raw, d(2025, 2, 1)), Err(ParseError::NoRecords));
    }

    #[test]
    fn rejects_html_payload() {
        assert!(matches!(
            cm_parser().parse(b"<html>Access Denied</html>", d(2025, 2, 1)),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn date_formats_tried_in_order() {
        assert_eq!(parse_date_with("03 Feb 2025", DEFAULT_DATE_FORMATS), Some(d(2025, 2, 3)));
        assert_eq!(parse_date_with("03/02/2025", DEFAULT_DATE_FORMATS), Some(d(2025, 2, 3)));
        assert_eq!(
            parse_date_with("2025-02-03 15:30:00", DEFAULT_DATE_FORMATS),
            Some(d(2025, 2, 3))
        );
        assert_eq!(parse_date_with("Feb 2025", DEFAULT_DATE_FORMATS), None);
    }

    #[test]
    fn scalar_reads_first_matching_path() {
        let nse = JsonScalarParser::new("NSE_REG_INVESTORS", &["data.regInvestors", "regInvestors"]);
        let raw = bytes(json!({"data": {"regInvestors": "25,20,07,360"}}));
        let out = nse.parse(&raw, d(2025, 2, 3)).unwrap();
        assert_eq!(out[0].0, DateKey::new(d(2025, 2, 3)));
        assert_eq!(out[0].1.get("NSE_REG_INVESTORS"), Some(252_007_360.0));

        let raw = bytes(json!({"regInvestors": 11}));
        assert_eq!(nse.parse(&raw, d(2025, 2, 3)).unwrap()[0].1.get("NSE_REG_INVESTORS"), Some(11.0));
    }

    #[test]
    fn scalar_indexes_arrays() {
        let bse = JsonScalarParser::new("BSE_REG_INVESTORS", &["Table.0.Inv_count"]);
        let raw = bytes(json!({"Table": [{"Inv_count": 244653920}]}));
        assert_eq!(
            bse.parse(&raw, d(2025, 2, 3)).unwrap()[0].1.get("BSE_REG_INVESTORS"),
            Some(244_653_920.0)
        );
        let raw = bytes(json!({"Table": []}));
        assert!(matches!(bse.parse(&raw, d(2025, 2, 3)), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn segments_map_to_order_metrics() {
        let raw = bytes(json!({
            "data": {"data": [
                {"segment": "Equities", "noOfOrders": 1000, "totalValue": 5, "updatedOn": "2025-02-07 17:00:00"},
                {"segment": "Equity Derivatives", "noOfOrders": "2,000", "updatedOn": "2025-02-07 17:00:00"},
                {"segment": "Commodity Derivatives", "noOfOrders": 30},
                {"segment": "Mutual Fund", "noOfOrders": 40, "totalValue": 12.5},
                {"segment": "Currency Derivatives", "noOfOrders": 99}
            ], "timeStamp": "07-Feb-2025"}
        }));
        // Requested on Saturday; the snapshot belongs to Friday.
        let out = SegmentOrdersParser::new().parse(&raw, d(2025, 2, 8)).unwrap();
        assert_eq!(out.len(), 1);
        let (key, rec) = &out[0];
        assert_eq!(*key, DateKey::new(d(2025, 2, 7)));
        assert_eq!(rec.get(SegmentOrdersParser::EQUITY_ORDERS), Some(1000.0));
        assert_eq!(rec.get(SegmentOrdersParser::FO_ORDERS), Some(2000.0));
        assert_eq!(rec.get(SegmentOrdersParser::COMMODITY_ORDERS), Some(30.0));
        assert_eq!(rec.get(SegmentOrdersParser::MF_ORDERS), Some(40.0));
        assert_eq!(rec.get(SegmentOrdersParser::MF_TURNOVER), Some(12.5));
        assert_eq!(rec.len(), 5);
    }

    #[test]
    fn segments_without_timestamp_are_rejected() {
        let raw = bytes(json!({"data": {"data": [{"segment": "Equities", "noOfOrders": 1}]}}));
        assert!(matches!(
            SegmentOrdersParser::new().parse(&raw, d(2025, 2, 7)),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn classifies_segment_names() {
        assert_eq!(classify("Equities"), Some(Segment::Equity));
        assert_eq!(classify("EQUITY DERIVATIVES"), Some(Segment::EquityDerivatives));
        assert_eq!(classify("Commodity"), Some(Segment::Commodity));
        assert_eq!(classify("MF"), Some(Segment::MutualFund));
        assert_eq!(classify("Interest Rate Futures"), None);
    }
}
