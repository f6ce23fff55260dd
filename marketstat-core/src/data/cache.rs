//! Per-source JSON cache: the durable memo of "this date was collected".
//!
//! Layout: one pretty-printed JSON object per source,
//! `{ "DDMMYYYY": { "METRIC": value, ... }, ... }`.
//!
//! Features:
//! - Missing file loads as an empty cache
//! - Append-only: an existing date is never overwritten
//! - Atomic writes (write to .tmp, rename into place)
//!
//! The whole file is loaded and rewritten on every save. That is fine for the
//! hundreds of dates this tool deals with; it is the first thing to revisit if
//! a source ever grows to tens of thousands of entries.

use crate::domain::{DateKey, MetricRecord};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("cache {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to write cache {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },
}

/// Date-keyed cache for a single source.
#[derive(Debug, Clone)]
pub struct SourceCache {
    path: PathBuf,
    entries: BTreeMap<DateKey, MetricRecord>,
    dirty: bool,
}

impl SourceCache {
    /// Load the cache at `path`; a missing file is an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self::with_entries(path, []));
        }

        let content = fs::read_to_string(&path).map_err(|e| CacheError::Read {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content).map_err(|e| CacheError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?
        };

        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    /// A cache pre-populated with `entries`, not yet written anywhere.
    pub fn with_entries(
        path: impl Into<PathBuf>,
        entries: impl IntoIterator<Item = (DateKey, MetricRecord)>,
    ) -> Self {
        Self {
            path: path.into(),
            entries: entries.into_iter().collect(),
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &DateKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &DateKey) -> Option<&MetricRecord> {
        self.entries.get(key)
    }

    /// Insert a record for a date not yet cached.
    ///
    /// Returns false (and leaves the cache untouched) if the date is present.
    pub fn insert(&mut self, key: DateKey, record: MetricRecord) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, record);
        self.dirty = true;
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unsaved inserts since the last load/save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cached dates in chronological order.
    pub fn keys(&self) -> impl Iterator<Item = &DateKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateKey, &MetricRecord)> {
        self.entries.iter()
    }

    pub fn first_date(&self) -> Option<DateKey> {
        self.entries.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<DateKey> {
        self.entries.keys().next_back().copied()
    }

    /// Rewrite the whole file atomically.
    pub fn save(&mut self) -> Result<(), CacheError> {
        let write_err = |reason: String| CacheError::Write {
            path: self.path.clone(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| write_err(format!("failed to create dir: {e}")))?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| write_err(format!("serialization: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| write_err(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            write_err(format!("atomic rename failed: {e}"))
        })?;

        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(y: i32, m: u32, d: u32) -> DateKey {
        DateKey::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn record(v: f64) -> MetricRecord {
        [("NO_OF_TRADE", v)].into_iter().collect()
    }

    #[test]
    fn missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SourceCache::open(dir.path().join("nse_fo_cache.json")).unwrap();
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn save_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/bse_fo_cache.json");

        let mut cache = SourceCache::open(&path).unwrap();
        assert!(cache.insert(key(2025, 2, 3), record(8.0)));
        assert!(cache.is_dirty());
        cache.save().unwrap();
        assert!(!cache.is_dirty());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = SourceCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(
            reopened.get(&key(2025, 2, 3)).unwrap().get("NO_OF_TRADE"),
            Some(8.0)
        );
    }

    #[test]
    fn insert_never_overwrites() {
        let mut cache = SourceCache::with_entries("unused.json", [(key(2025, 2, 3), record(1.0))]);
        assert!(!cache.insert(key(2025, 2, 3), record(2.0)));
        assert_eq!(
            cache.get(&key(2025, 2, 3)).unwrap().get("NO_OF_TRADE"),
            Some(1.0)
        );
        assert!(!cache.is_dirty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SourceCache::open(&path),
            Err(CacheError::Corrupt { .. })
        ));
    }

    #[test]
    fn reads_files_written_by_earlier_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nse_mfss_cache.json");
        fs::write(
            &path,
            r#"{
  "03032025": {"MF_NOS_OF_SUB_ORDER": 120, "MF_TOT_SUB_AMT": 55.5},
  "28022025": {"MF_NOS_OF_SUB_ORDER": 98, "MF_TOT_SUB_AMT": 41.25}
}"#,
        )
        .unwrap();

        let cache = SourceCache::open(&path).unwrap();
        assert_eq!(cache.first_date(), Some(key(2025, 2, 28)));
        assert_eq!(cache.last_date(), Some(key(2025, 3, 3)));
    }
}
