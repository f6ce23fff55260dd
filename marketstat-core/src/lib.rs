//! Marketstat Core: calendar, records, fetching, parsing and caching.
//!
//! This crate holds everything a single source collector needs:
//! - Domain types (date keys, metric records, per-exchange trading calendars)
//! - A resilient HTTP fetcher with cookie-seeded sessions, bounded retry and
//!   magic-byte validation
//! - Source parsers for zipped CSV archives, raw CSV, legacy `.xls` sheets and
//!   nested JSON APIs
//! - The append-only JSON cache that memoizes already-collected dates

pub mod data;
pub mod domain;
pub mod parse;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the types handed between collectors and the
    /// consolidator are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::DateKey>();
        require_sync::<domain::DateKey>();
        require_send::<domain::MetricRecord>();
        require_sync::<domain::MetricRecord>();
        require_send::<domain::TradingCalendar>();
        require_sync::<domain::TradingCalendar>();
        require_send::<data::SourceCache>();
        require_sync::<data::SourceCache>();
        require_send::<data::FetchError>();
        require_sync::<data::FetchError>();
        require_send::<parse::ParseError>();
        require_sync::<parse::ParseError>();
    }

    /// Parsers are shared behind trait objects, so the trait must stay
    /// object-safe and thread-safe.
    #[test]
    fn source_parser_is_object_safe() {
        fn _check(parser: &dyn parse::SourceParser, raw: &[u8]) {
            let date = chrono::NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
            let _ = parser.parse(raw, date);
        }
    }
}
