//! Cache and output health report.

use crate::config::CollectorConfig;
use crate::export::{read_manifest, ExportManifest};
use crate::source::SourceSpec;
use marketstat_core::data::SourceCache;
use marketstat_core::domain::DateKey;
use std::fmt;
use std::path::PathBuf;

/// State of one source's cache file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStatus {
    pub id: String,
    pub path: PathBuf,
    pub state: CacheState,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Missing,
    Loaded {
        entries: usize,
        first: Option<DateKey>,
        last: Option<DateKey>,
        /// Entries missing some of the source's expected metrics.
        degraded: usize,
    },
    Unreadable(String),
}

/// State of the consolidated CSV against its manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputState {
    /// No CSV written yet.
    Missing,
    /// CSV present but no readable manifest beside it.
    Unverified(String),
    /// Hash matches the manifest.
    Verified(ExportManifest),
    /// The CSV changed after the manifest was written.
    Mismatch(ExportManifest),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub sources: Vec<SourceStatus>,
    pub output: PathBuf,
    pub output_state: OutputState,
}

pub fn source_status(config: &CollectorConfig, spec: &SourceSpec) -> SourceStatus {
    let path = config.cache_path(&spec.id);
    let state = if !path.exists() {
        CacheState::Missing
    } else {
        match SourceCache::open(&path) {
            Ok(cache) => {
                let expected = spec.metrics();
                CacheState::Loaded {
                    entries: cache.len(),
                    first: cache.first_date(),
                    last: cache.last_date(),
                    degraded: cache
                        .iter()
                        .filter(|(_, r)| !r.is_complete(&expected))
                        .count(),
                }
            }
            Err(e) => CacheState::Unreadable(e.to_string()),
        }
    };
    SourceStatus {
        id: spec.id.clone(),
        path,
        state,
    }
}

pub fn output_state(config: &CollectorConfig) -> OutputState {
    let output = &config.output;
    let csv = match std::fs::read(output) {
        Ok(bytes) => bytes,
        Err(_) => return OutputState::Missing,
    };
    match read_manifest(output) {
        Ok(manifest) if manifest.matches(&csv) => OutputState::Verified(manifest),
        Ok(manifest) => OutputState::Mismatch(manifest),
        Err(e) => OutputState::Unverified(e.to_string()),
    }
}

pub fn status_report(config: &CollectorConfig, sources: &[SourceSpec]) -> StatusReport {
    StatusReport {
        sources: sources.iter().map(|s| source_status(config, s)).collect(),
        output: config.output.clone(),
        output_state: output_state(config),
    }
}

impl StatusReport {
    /// True when every cache loads and the output, if present, verifies.
    pub fn is_healthy(&self) -> bool {
        let caches_ok = self
            .sources
            .iter()
            .all(|s| !matches!(s.state, CacheState::Unreadable(_)));
        let output_ok = matches!(
            self.output_state,
            OutputState::Missing | OutputState::Verified(_)
        );
        caches_ok && output_ok
    }
}

fn date_or_dash(date: Option<DateKey>) -> String {
    date.map(|d| d.display()).unwrap_or_else(|| "-".into())
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22} {:>8} {:>12} {:>12} {:>9}",
            "source", "entries", "first", "last", "degraded"
        )?;
        for s in &self.sources {
            match &s.state {
                CacheState::Missing => writeln!(f, "{:<22} {:>8}", s.id, "(none)")?,
                CacheState::Loaded {
                    entries,
                    first,
                    last,
                    degraded,
                } => writeln!(
                    f,
                    "{:<22} {:>8} {:>12} {:>12} {:>9}",
                    s.id,
                    entries,
                    date_or_dash(*first),
                    date_or_dash(*last),
                    degraded
                )?,
                CacheState::Unreadable(reason) => {
                    writeln!(f, "{:<22} UNREADABLE: {reason}", s.id)?
                }
            }
        }

        let output = self.output.display();
        match &self.output_state {
            OutputState::Missing => writeln!(f, "\noutput {output}: not written yet"),
            OutputState::Unverified(reason) => {
                writeln!(f, "\noutput {output}: present, unverified ({reason})")
            }
            OutputState::Verified(m) => writeln!(
                f,
                "\noutput {output}: {} rows x {} columns, {}..{}, hash OK",
                m.rows,
                m.columns,
                m.first_date.as_deref().unwrap_or("-"),
                m.last_date.as_deref().unwrap_or("-")
            ),
            OutputState::Mismatch(m) => writeln!(
                f,
                "\noutput {output}: HASH MISMATCH (manifest written {})",
                m.written_at.to_rfc3339()
            ),
        }
    }
}
