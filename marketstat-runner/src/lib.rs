//! Marketstat Runner: source catalog, collection, consolidation and export.
//!
//! This crate builds on `marketstat-core` to provide:
//! - TOML configuration with defaults for every field
//! - The catalog of NSE/BSE sources and their output columns
//! - The per-source collection loop with request memoization and checkpoints
//! - Consolidation of all caches into one date-ordered table
//! - Atomic CSV export with a BLAKE3 manifest, and a cache status report

pub mod catalog;
pub mod collector;
pub mod config;
pub mod consolidate;
pub mod export;
pub mod source;
pub mod status;

pub use catalog::{build_catalog, selected_sources, source_ids};
pub use collector::{
    collect_sources, collect_with, CollectError, CollectProgress, CollectSummary, CollectWindow,
    CollectionStats, Collector, DateOutcome, SilentProgress, StdoutProgress,
};
pub use config::{CollectorConfig, ConfigError, Endpoints, ExchangeConfig, HttpConfig};
pub use consolidate::{
    consolidate, consolidate_from_disk, ConsolidatedRow, ConsolidatedTable, SourceTable,
    DATE_HEADER,
};
pub use export::{export_table, read_manifest, render_csv, ExportError, ExportManifest};
pub use source::{render_url, ColumnSpec, Coverage, NumberFormat, RequestKind, SourceSpec};
pub use status::{status_report, CacheState, OutputState, SourceStatus, StatusReport};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<CollectorConfig>();
        assert_sync::<CollectorConfig>();
    }

    #[test]
    fn source_spec_is_send_sync() {
        assert_send::<SourceSpec>();
        assert_sync::<SourceSpec>();
    }

    #[test]
    fn results_are_send_sync() {
        assert_send::<CollectionStats>();
        assert_sync::<CollectionStats>();
        assert_send::<ConsolidatedTable>();
        assert_sync::<ConsolidatedTable>();
        assert_send::<ExportManifest>();
        assert_send::<CollectError>();
        assert_sync::<CollectError>();
    }
}
