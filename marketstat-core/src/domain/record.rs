//! MetricRecord: named numeric metrics for one source on one date.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat mapping of metric name to value.
///
/// Each source has a fixed set of expected metric names. A record that lacks
/// some of them is "degraded": it is still cached, but collectors log the
/// missing names via [`MetricRecord::missing`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord(BTreeMap<String, f64>);

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a metric. Non-finite values are dropped (JSON cannot hold them).
    ///
    /// Returns whether the value was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.0.insert(name.into(), value);
        true
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Expected metric names that are absent from this record.
    pub fn missing<'a>(&self, expected: &[&'a str]) -> Vec<&'a str> {
        expected
            .iter()
            .copied()
            .filter(|name| !self.0.contains_key(*name))
            .collect()
    }

    pub fn is_complete(&self, expected: &[&str]) -> bool {
        expected.iter().all(|name| self.0.contains_key(*name))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for MetricRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}
