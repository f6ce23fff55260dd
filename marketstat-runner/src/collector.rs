//! The collection loop: walk a date range for one source, fetch what is not
//! cached yet, parse it and append the result to the source's cache.

use crate::config::{CollectorConfig, ConfigError};
use crate::source::{Coverage, RequestKind, SourceSpec};
use chrono::NaiveDate;
use marketstat_core::data::{
    CacheError, Fetch, FetchError, ReqwestSessionFactory, ResilientFetcher, SourceCache,
    TransportError,
};
use marketstat_core::domain::{DateKey, MetricRecord, TradingCalendar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that stop one source's collection. Per-date failures never do.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open session for {source_id}: {reason}")]
    Session { source_id: String, reason: String },
}

/// Per-source counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub source: String,
    /// Dates (or snapshot records) considered.
    pub total: usize,
    /// Newly stored records.
    pub processed: usize,
    /// Already in the cache.
    pub cached: usize,
    /// Not a trading day.
    pub skipped: usize,
    /// Fetch or parse failed, or the payload had no record for the date.
    pub failed: usize,
    /// Stored records missing some expected metrics.
    pub degraded: usize,
    /// Distinct requests issued through the fetcher.
    pub requests: usize,
    /// Outcome of every date considered, in walk order.
    #[serde(skip)]
    pub dates: Vec<(DateKey, DateOutcome)>,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// What happened to one date (or snapshot record) in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOutcome {
    /// Fetched, parsed and stored.
    Collected,
    /// Already in the cache.
    Cached,
    /// Weekend or exchange holiday.
    NonTrading,
    /// Not published, fetch or parse failed, or no record for the date.
    Failed,
}

impl CollectionStats {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Count `outcome` for `key` and emit its progress line.
    pub fn record(&mut self, key: DateKey, outcome: DateOutcome) {
        self.total += 1;
        match outcome {
            DateOutcome::Collected => {
                self.processed += 1;
                tracing::info!(source = %self.source, date = %key, "OK collected");
            }
            DateOutcome::Cached => {
                self.cached += 1;
                tracing::info!(source = %self.source, date = %key, "SKIP cached");
            }
            DateOutcome::NonTrading => {
                self.skipped += 1;
                tracing::info!(source = %self.source, date = %key, "SKIP non-trading day");
            }
            DateOutcome::Failed => {
                self.failed += 1;
                tracing::warn!(source = %self.source, date = %key, "FAIL no data");
            }
        }
        self.dates.push((key, outcome));
    }

    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            source = %self.source,
            total = self.total,
            processed = self.processed,
            cached = self.cached,
            skipped = self.skipped,
            failed = self.failed,
            degraded = self.degraded,
            requests = self.requests,
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "collection finished"
        );
    }
}

/// Date range for one run. `today` decides where snapshot sources land and
/// caps month-range requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub today: NaiveDate,
}

impl CollectWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> Self {
        Self { start, end, today }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

type Outcome = Result<BTreeMap<DateKey, MetricRecord>, String>;

/// Collects one source into `cache`.
///
/// Each distinct request URL is fetched at most once per call; every date it
/// covers is served from that one response. The cache is saved every
/// `checkpoint_every` new records and once more at the end.
pub struct Collector<'a> {
    spec: &'a SourceSpec,
    calendar: &'a TradingCalendar,
    checkpoint_every: usize,
    outcomes: HashMap<String, Outcome>,
    since_checkpoint: usize,
}

impl<'a> Collector<'a> {
    pub fn new(spec: &'a SourceSpec, calendar: &'a TradingCalendar, checkpoint_every: usize) -> Self {
        Self {
            spec,
            calendar,
            checkpoint_every: checkpoint_every.max(1),
            outcomes: HashMap::new(),
            since_checkpoint: 0,
        }
    }

    pub fn run(
        &mut self,
        fetcher: &mut dyn Fetch,
        cache: &mut SourceCache,
        window: CollectWindow,
    ) -> Result<CollectionStats, CacheError> {
        let started = Instant::now();
        let mut stats = CollectionStats::new(&self.spec.id);

        match self.spec.coverage {
            Coverage::Archive => self.walk_range(fetcher, cache, window, &mut stats)?,
            Coverage::Snapshot => self.take_snapshot(fetcher, cache, window, &mut stats)?,
        }

        if cache.is_dirty() {
            cache.save()?;
        }
        stats.elapsed = started.elapsed();
        Ok(stats)
    }

    fn walk_range(
        &mut self,
        fetcher: &mut dyn Fetch,
        cache: &mut SourceCache,
        window: CollectWindow,
        stats: &mut CollectionStats,
    ) -> Result<(), CacheError> {
        for date in window.start.iter_days().take_while(|d| *d <= window.end) {
            let key = DateKey::new(date);

            if cache.contains(&key) {
                stats.record(key, DateOutcome::Cached);
                continue;
            }
            if !self.calendar.is_trading_day(date) {
                stats.record(key, DateOutcome::NonTrading);
                continue;
            }

            let url = self.spec.request_url(date, window.today);
            let record = match self.outcome(fetcher, &url, date, stats) {
                Ok(records) => records.get(&key).cloned(),
                Err(_) => None,
            };
            match record {
                Some(record) => self.store(cache, key, record, stats)?,
                None => stats.record(key, DateOutcome::Failed),
            }
        }
        Ok(())
    }

    fn take_snapshot(
        &mut self,
        fetcher: &mut dyn Fetch,
        cache: &mut SourceCache,
        window: CollectWindow,
        stats: &mut CollectionStats,
    ) -> Result<(), CacheError> {
        if !window.contains(window.today) {
            tracing::debug!(source = %self.spec.id, today = %window.today, "today outside range, snapshot not taken");
            return Ok(());
        }

        let url = self.spec.request_url(window.today, window.today);
        let records = match self.outcome(fetcher, &url, window.today, stats) {
            Ok(records) => records.clone(),
            Err(_) => {
                stats.record(DateKey::new(window.today), DateOutcome::Failed);
                return Ok(());
            }
        };

        for (key, record) in records {
            if cache.contains(&key) {
                stats.record(key, DateOutcome::Cached);
            } else if !self.calendar.is_trading_day(key.date()) {
                stats.record(key, DateOutcome::NonTrading);
            } else {
                self.store(cache, key, record, stats)?;
            }
        }
        Ok(())
    }

    /// The parsed payload behind `url`, fetching it on first use.
    fn outcome(
        &mut self,
        fetcher: &mut dyn Fetch,
        url: &str,
        requested: NaiveDate,
        stats: &mut CollectionStats,
    ) -> &Outcome {
        if !self.outcomes.contains_key(url) {
            stats.requests += 1;
            let outcome = self.fetch_and_parse(fetcher, url, requested);
            self.outcomes.insert(url.to_string(), outcome);
        }
        &self.outcomes[url]
    }

    fn fetch_and_parse(&self, fetcher: &mut dyn Fetch, url: &str, requested: NaiveDate) -> Outcome {
        let source = &self.spec.id;
        let raw = match fetcher.fetch(url, self.spec.magic.as_deref()) {
            Ok(raw) => raw,
            Err(e @ FetchError::NotFound { .. }) => {
                tracing::debug!(source = %source, date = %requested, "not published");
                return Err(e.to_string());
            }
            Err(e) => {
                tracing::warn!(source = %source, date = %requested, error = %e, "fetch failed");
                return Err(e.to_string());
            }
        };

        match self.spec.parser.parse(&raw, requested) {
            Ok(records) => Ok(records.into_iter().collect()),
            Err(e) => {
                tracing::warn!(source = %source, date = %requested, error = %e, "parse failed");
                Err(e.to_string())
            }
        }
    }

    fn store(
        &mut self,
        cache: &mut SourceCache,
        key: DateKey,
        record: MetricRecord,
        stats: &mut CollectionStats,
    ) -> Result<(), CacheError> {
        let missing = record.missing(&self.spec.metrics());
        if !missing.is_empty() {
            tracing::warn!(source = %self.spec.id, date = %key, missing = ?missing, "degraded record");
            stats.degraded += 1;
        }
        if cache.insert(key, record) {
            stats.record(key, DateOutcome::Collected);
            self.since_checkpoint += 1;
            if self.since_checkpoint >= self.checkpoint_every {
                cache.save()?;
                tracing::debug!(source = %self.spec.id, entries = cache.len(), "checkpoint");
                self.since_checkpoint = 0;
            }
        } else {
            stats.record(key, DateOutcome::Cached);
        }
        Ok(())
    }
}

// ── Orchestration ────────────────────────────────────────────────────

/// Progress callback for multi-source collection.
pub trait CollectProgress {
    /// Called before a source is collected.
    fn on_start(&self, source: &str, index: usize, total: usize);

    /// Called when a source finishes, successfully or not.
    fn on_complete(
        &self,
        source: &str,
        index: usize,
        total: usize,
        result: &Result<CollectionStats, CollectError>,
    );

    /// Called after the last source.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Prints one line per source to stdout.
pub struct StdoutProgress;

impl CollectProgress for StdoutProgress {
    fn on_start(&self, source: &str, index: usize, total: usize) {
        println!("[{}/{}] Collecting {source}...", index + 1, total);
    }

    fn on_complete(
        &self,
        source: &str,
        _index: usize,
        _total: usize,
        result: &Result<CollectionStats, CollectError>,
    ) {
        match result {
            Ok(s) => println!(
                "  OK: {source}: {} new, {} cached, {} skipped, {} failed",
                s.processed, s.cached, s.skipped, s.failed
            ),
            Err(e) => println!("  FAIL: {source}: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize) {
        println!("\nCollected {succeeded}/{total} sources ({failed} failed)");
    }
}

/// Reports nothing.
pub struct SilentProgress;

impl CollectProgress for SilentProgress {
    fn on_start(&self, _: &str, _: usize, _: usize) {}
    fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<CollectionStats, CollectError>) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {}
}

/// Outcome of a multi-source run.
#[derive(Debug, Default)]
pub struct CollectSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stats: Vec<CollectionStats>,
    pub errors: Vec<(String, CollectError)>,
}

impl CollectSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// New records across all sources.
    pub fn processed(&self) -> usize {
        self.stats.iter().map(|s| s.processed).sum()
    }
}

/// Collect every source in `sources`, each with its own fetcher from
/// `open_fetcher`. A source that cannot start (bad cache, no session) is
/// recorded and the rest continue.
pub fn collect_with<F>(
    config: &CollectorConfig,
    sources: &[SourceSpec],
    today: NaiveDate,
    progress: &dyn CollectProgress,
    mut open_fetcher: F,
) -> CollectSummary
where
    F: FnMut(&SourceSpec) -> Result<Box<dyn Fetch>, CollectError>,
{
    let window = CollectWindow::new(config.start_date, config.end_or(today), today);
    let total = sources.len();
    let mut summary = CollectSummary {
        total,
        ..CollectSummary::default()
    };

    for (i, spec) in sources.iter().enumerate() {
        progress.on_start(&spec.id, i, total);
        let result = collect_one(config, spec, window, &mut open_fetcher);
        progress.on_complete(&spec.id, i, total, &result);

        match result {
            Ok(stats) => {
                stats.log_summary("collect");
                summary.succeeded += 1;
                summary.stats.push(stats);
            }
            Err(e) => {
                tracing::error!(source = %spec.id, error = %e, "source aborted");
                summary.failed += 1;
                summary.errors.push((spec.id.clone(), e));
            }
        }
    }

    progress.on_batch_complete(summary.succeeded, summary.failed, total);
    summary
}

fn collect_one<F>(
    config: &CollectorConfig,
    spec: &SourceSpec,
    window: CollectWindow,
    open_fetcher: &mut F,
) -> Result<CollectionStats, CollectError>
where
    F: FnMut(&SourceSpec) -> Result<Box<dyn Fetch>, CollectError>,
{
    let calendar = config.calendar(spec.exchange)?;
    let mut cache = SourceCache::open(config.cache_path(&spec.id))?;
    tracing::info!(source = %spec.id, cached = cache.len(), "cache loaded");

    let mut fetcher = open_fetcher(spec)?;
    let mut collector = Collector::new(spec, &calendar, config.checkpoint_every);
    Ok(collector.run(fetcher.as_mut(), &mut cache, window)?)
}

/// Collect `sources` against the live exchanges.
pub fn collect_sources(
    config: &CollectorConfig,
    sources: &[SourceSpec],
    today: NaiveDate,
    progress: &dyn CollectProgress,
) -> CollectSummary {
    collect_with(config, sources, today, progress, |spec| {
        let profile = config.session_profile(&spec.id, spec.exchange, spec.kind == RequestKind::Api);
        let fetcher = ResilientFetcher::new(ReqwestSessionFactory::new(profile), config.http.retry_policy())
            .map_err(|e: TransportError| CollectError::Session {
                source_id: spec.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(fetcher) as Box<dyn Fetch>)
    })
}
