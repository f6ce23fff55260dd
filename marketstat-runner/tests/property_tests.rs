//! Property tests for consolidation.
//!
//! 1. Rows are strictly ascending by calendar date whatever order the caches
//!    were filled in
//! 2. Every cached date appears exactly once, across all sources
//! 3. Every row has one cell per header column

use chrono::{Duration, NaiveDate};
use marketstat_core::data::SourceCache;
use marketstat_core::domain::{DateKey, MetricRecord};
use marketstat_runner::{build_catalog, consolidate, CollectorConfig, SourceTable};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Strategies ───────────────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..800).prop_map(|offset| NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + Duration::days(offset))
}

fn arb_dates() -> impl Strategy<Value = Vec<NaiveDate>> {
    prop::collection::vec(arb_date(), 0..40)
}

fn record(value: f64) -> MetricRecord {
    let mut r = MetricRecord::new();
    r.insert("NO_OF_CONT", value);
    r.insert("BSE_TTL_TRADED_QTY", value);
    r
}

fn fill(dates: &[NaiveDate]) -> SourceCache {
    let mut cache = SourceCache::with_entries("unused.json", []);
    for (i, date) in dates.iter().enumerate() {
        cache.insert(DateKey::new(*date), record(i as f64));
    }
    cache
}

fn snapshot(cache: &SourceCache) -> std::collections::BTreeMap<DateKey, MetricRecord> {
    cache.iter().map(|(k, r)| (*k, r.clone())).collect()
}

// ── 1./2./3. ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn rows_are_chronological_and_complete(nse in arb_dates(), bse in arb_dates()) {
        let catalog = build_catalog(&CollectorConfig::default());
        let (nse_spec, bse_spec) = (&catalog[0], &catalog[1]);

        let tables = [
            SourceTable::new(nse_spec, snapshot(&fill(&nse))),
            SourceTable::new(bse_spec, snapshot(&fill(&bse))),
        ];
        let table = consolidate(&tables);

        for pair in table.rows.windows(2) {
            prop_assert!(pair[0].date < pair[1].date);
        }

        let expected: BTreeSet<DateKey> = nse.iter().chain(&bse).map(|d| DateKey::new(*d)).collect();
        let actual: BTreeSet<DateKey> = table.rows.iter().map(|r| r.date).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(table.rows.len(), table.rows.iter().map(|r| r.date).collect::<BTreeSet<_>>().len());

        for row in &table.rows {
            prop_assert_eq!(row.to_record().len(), table.header.len());
        }
    }

    #[test]
    fn insertion_order_does_not_matter(dates in arb_dates()) {
        let catalog = build_catalog(&CollectorConfig::default());
        let spec = &catalog[0];

        let mut reversed = dates.clone();
        reversed.reverse();
        let mut forward = SourceCache::with_entries("unused.json", []);
        let mut backward = SourceCache::with_entries("unused.json", []);
        for date in &dates {
            forward.insert(DateKey::new(*date), record(1.0));
        }
        for date in &reversed {
            backward.insert(DateKey::new(*date), record(1.0));
        }

        let a = consolidate(&[SourceTable::new(spec, snapshot(&forward))]);
        let b = consolidate(&[SourceTable::new(spec, snapshot(&backward))]);
        prop_assert_eq!(a, b);
    }
}
