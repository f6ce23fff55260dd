//! Merge every source's cache into one date-ordered table.

use crate::source::SourceSpec;
use marketstat_core::data::{CacheError, SourceCache};
use marketstat_core::domain::{DateKey, MetricRecord};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Header of the first column.
pub const DATE_HEADER: &str = "Date";

/// One source's cached records together with its column layout.
pub struct SourceTable<'a> {
    pub spec: &'a SourceSpec,
    pub records: BTreeMap<DateKey, MetricRecord>,
}

impl<'a> SourceTable<'a> {
    pub fn new(spec: &'a SourceSpec, records: BTreeMap<DateKey, MetricRecord>) -> Self {
        Self { spec, records }
    }

    /// Snapshot of the source's cache file as it is on disk now.
    pub fn load(spec: &'a SourceSpec, cache_path: &Path) -> Result<Self, CacheError> {
        let cache = SourceCache::open(cache_path)?;
        let records = cache.iter().map(|(k, r)| (*k, r.clone())).collect();
        Ok(Self::new(spec, records))
    }
}

/// The consolidated output: `Date` followed by every source's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedTable {
    pub header: Vec<String>,
    pub rows: Vec<ConsolidatedRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedRow {
    pub date: DateKey,
    pub cells: Vec<String>,
}

impl ConsolidatedRow {
    /// The row as written to CSV, date first.
    pub fn to_record(&self) -> Vec<String> {
        std::iter::once(self.date.display())
            .chain(self.cells.iter().cloned())
            .collect()
    }
}

impl ConsolidatedTable {
    pub fn first_date(&self) -> Option<DateKey> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<DateKey> {
        self.rows.last().map(|r| r.date)
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    /// The cell under `header` on `date`, if both exist.
    pub fn cell(&self, date: DateKey, header: &str) -> Option<&str> {
        let col = self.header.iter().position(|h| h == header)?.checked_sub(1)?;
        let row = self.rows.iter().find(|r| r.date == date)?;
        row.cells.get(col).map(String::as_str)
    }
}

/// One row per date present in any table, ascending by calendar date.
/// A source without a record for a date contributes empty cells.
pub fn consolidate(tables: &[SourceTable<'_>]) -> ConsolidatedTable {
    let header = std::iter::once(DATE_HEADER.to_string())
        .chain(
            tables
                .iter()
                .flat_map(|t| t.spec.headers().map(str::to_string)),
        )
        .collect();

    let dates: BTreeSet<DateKey> = tables
        .iter()
        .flat_map(|t| t.records.keys().copied())
        .collect();

    let rows = dates
        .into_iter()
        .map(|date| ConsolidatedRow {
            date,
            cells: tables
                .iter()
                .flat_map(|t| {
                    let record = t.records.get(&date);
                    t.spec.columns.iter().map(move |c| c.cell(record))
                })
                .collect(),
        })
        .collect();

    ConsolidatedTable { header, rows }
}

/// Load every source's cache (located by `cache_path`) and consolidate them.
pub fn consolidate_from_disk(
    sources: &[SourceSpec],
    cache_path: impl Fn(&str) -> std::path::PathBuf,
) -> Result<ConsolidatedTable, CacheError> {
    let tables = sources
        .iter()
        .map(|spec| SourceTable::load(spec, &cache_path(&spec.id)))
        .collect::<Result<Vec<_>, _>>()?;
    let table = consolidate(&tables);
    tracing::info!(
        sources = tables.len(),
        rows = table.rows.len(),
        columns = table.column_count(),
        "consolidated"
    );
    Ok(table)
}
