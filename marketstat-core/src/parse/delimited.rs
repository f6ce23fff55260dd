//! Plain CSV downloads: the BSE derivatives bhavcopy summary and the NSE
//! participant-wise volume file.

use super::{decode_lossy, parse_number, require_number, DatedRecord, ParseError, SourceParser};
use crate::domain::{DateKey, MetricRecord};
use chrono::NaiveDate;

/// How far into the payload the content guard must appear.
const GUARD_WINDOW: usize = 100;

/// A metric read from a column located by header name, falling back to a
/// fixed index when the header is renamed or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedColumn {
    pub metric: String,
    pub header: String,
    pub fallback: usize,
}

impl NamedColumn {
    pub fn new(metric: impl Into<String>, header: impl Into<String>, fallback: usize) -> Self {
        Self {
            metric: metric.into(),
            header: header.into(),
            fallback,
        }
    }

    fn resolve(&self, header: &[String]) -> usize {
        column_index(header, &self.header).unwrap_or(self.fallback)
    }
}

/// Sums selected columns over rows whose category cell is in an allowed set.
///
/// The payload must carry `guard` within its first 100 bytes; anything else
/// (typically an HTML error page served with 200) is rejected.
#[derive(Debug, Clone)]
pub struct FilteredCsvParser {
    guard: String,
    category: NamedColumn,
    allowed: Vec<String>,
    columns: Vec<NamedColumn>,
}

impl FilteredCsvParser {
    pub fn new(
        guard: impl Into<String>,
        category_header: impl Into<String>,
        category_fallback: usize,
        allowed: &[&str],
        columns: Vec<NamedColumn>,
    ) -> Self {
        Self {
            guard: guard.into(),
            category: NamedColumn::new("", category_header, category_fallback),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            columns,
        }
    }
}

impl SourceParser for FilteredCsvParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        if !contains_within(raw, self.guard.as_bytes(), GUARD_WINDOW) {
            return Err(ParseError::GuardMissing(self.guard.clone()));
        }
        let rows = read_rows(&decode_lossy(raw))?;
        if rows.len() < 2 {
            return Err(ParseError::Malformed(format!(
                "expected a header and data rows, got {} line(s)",
                rows.len()
            )));
        }

        let header = &rows[0];
        let category_idx = self.category.resolve(header);
        let indices: Vec<usize> = self.columns.iter().map(|c| c.resolve(header)).collect();

        let mut sums = vec![0.0; self.columns.len()];
        let mut matched = 0usize;
        for row in &rows[1..] {
            let category = row.get(category_idx).map(|c| c.trim()).unwrap_or("");
            if !self.allowed.iter().any(|a| a == category) {
                continue;
            }
            for (sum, &idx) in sums.iter_mut().zip(&indices) {
                if let Some(v) = row.get(idx).and_then(|c| parse_number(c)) {
                    *sum += v;
                }
            }
            matched += 1;
        }

        if matched == 0 {
            return Err(ParseError::NoMatchingRows);
        }
        tracing::debug!(rows = matched, "category rows summed");

        let record = self
            .columns
            .iter()
            .zip(sums)
            .map(|(c, sum)| (c.metric.clone(), sum))
            .collect::<MetricRecord>();
        Ok(vec![(DateKey::new(requested), record)])
    }
}

/// Reads one labelled row out of a CSV whose header sits below a title line.
///
/// The header is the first row containing `marker`; the data row is the first
/// row after it whose first cell equals `label` (case-insensitive).
#[derive(Debug, Clone)]
pub struct LabelledRowParser {
    marker: String,
    label: String,
    columns: Vec<NamedColumn>,
}

impl LabelledRowParser {
    pub fn new(marker: impl Into<String>, label: impl Into<String>, columns: Vec<NamedColumn>) -> Self {
        Self {
            marker: marker.into(),
            label: label.into(),
            columns,
        }
    }
}

impl SourceParser for LabelledRowParser {
    fn parse(&self, raw: &[u8], requested: NaiveDate) -> Result<Vec<DatedRecord>, ParseError> {
        let rows = read_rows(&decode_lossy(raw))?;
        let header_at = rows
            .iter()
            .position(|row| row.iter().any(|cell| cell.contains(&self.marker)))
            .ok_or_else(|| {
                ParseError::Malformed(format!("header row containing '{}' not found", self.marker))
            })?;
        let header = &rows[header_at];

        let row = rows[header_at + 1..]
            .iter()
            .find(|row| {
                row.first()
                    .is_some_and(|c| c.trim().eq_ignore_ascii_case(&self.label))
            })
            .ok_or_else(|| ParseError::RowNotFound(self.label.clone()))?;

        let mut record = MetricRecord::new();
        for column in &self.columns {
            let idx = column.resolve(header);
            let cell = row.get(idx).ok_or_else(|| {
                ParseError::Malformed(format!(
                    "row '{}' has no column {idx} for {}",
                    self.label, column.metric
                ))
            })?;
            record.insert(column.metric.clone(), require_number(&column.metric, cell)?);
        }
        Ok(vec![(DateKey::new(requested), record)])
    }
}

// ── CSV helpers ──────────────────────────────────────────────────────

/// Split CSV text into trimmed rows, dropping rows whose cells are all blank.
///
/// Rows may have differing widths; exchange files often carry a title line
/// above the real header.
pub(crate) fn read_rows(text: &str) -> Result<Vec<Vec<String>>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ParseError::Malformed(format!("CSV: {e}")))?;
        if record.iter().all(|cell| cell.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Position of the header cell equal to `name` (after trimming).
pub(crate) fn column_index(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h.trim() == name)
}

fn contains_within(haystack: &[u8], needle: &[u8], window: usize) -> bool {
    if needle.is_empty() {
        return true;
    }
    let head = &haystack[..haystack.len().min(window)];
    head.windows(needle.len()).any(|w| w == needle)
}
