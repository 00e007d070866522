use fxhash::FxHashMap;

use super::series::Series;
use crate::data::{MetricKey, Sample, SampleRange};

/// Read access to stored samples, used by the rule evaluator
pub trait SampleSource {
    /// Samples for `key` with `start <= timestamp <= end`
    fn query(&self, key: &MetricKey, start: i64, end: i64) -> SampleRange;

    /// Most recent sample for `key`
    fn latest(&self, key: &MetricKey) -> Option<Sample>;
}

/// In-memory mapping from metric key to series.
///
/// The store itself is not synchronized; [`crate::engine::Engine`] wraps it
/// in a lock shared with the alert state table.
#[derive(Debug, Default)]
pub struct SampleStore {
    series: FxHashMap<MetricKey, Series>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one sample. Fails if `timestamp` is not after the newest sample
    /// already stored for `key`; the series is unchanged in that case.
    pub fn append(&mut self, key: &MetricKey, timestamp: i64, value: f64) -> Result<(), StoreError> {
        let series = self.series.entry(key.clone()).or_default();

        if series.push(Sample::new(timestamp, value)) {
            Ok(())
        } else {
            Err(StoreError::OutOfOrder {
                key: key.to_string(),
                timestamp,
                last: series.last_timestamp().unwrap_or(timestamp),
            })
        }
    }

    /// Append many samples, collecting rejections instead of stopping at the first
    pub fn append_batch<I>(&mut self, samples: I) -> AppendOutcome
    where
        I: IntoIterator<Item = (MetricKey, Sample)>,
    {
        let mut outcome = AppendOutcome::default();

        for (key, sample) in samples {
            match self.append(&key, sample.timestamp, sample.value) {
                Ok(()) => outcome.appended += 1,
                Err(e) => {
                    tracing::debug!(error = %e, "Rejected sample");
                    outcome.out_of_order += 1;
                }
            }
        }

        outcome
    }

    pub fn query(&self, key: &MetricKey, start: i64, end: i64) -> SampleRange {
        self.series
            .get(key)
            .map(|s| s.range(start, end))
            .unwrap_or_default()
    }

    pub fn latest(&self, key: &MetricKey) -> Option<Sample> {
        self.series.get(key).and_then(Series::latest)
    }

    /// Remove every sample older than `cutoff` across all series.
    /// Series left empty are dropped. Returns the number of samples removed.
    pub fn evict_before(&mut self, cutoff: i64) -> usize {
        let mut removed = 0;
        self.series.retain(|_, series| {
            removed += series.evict_before(cutoff);
            !series.is_empty()
        });
        removed
    }

    pub fn contains(&self, key: &MetricKey) -> bool {
        self.series.contains_key(key)
    }

    /// All series keys, sorted by canonical form
    pub fn keys(&self) -> Vec<MetricKey> {
        let mut keys: Vec<MetricKey> = self.series.keys().cloned().collect();
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        keys
    }

    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            series: self.series.len(),
            ..Default::default()
        };

        for series in self.series.values() {
            stats.samples += series.len();
            if let Some(oldest) = series.oldest() {
                stats.oldest_timestamp = Some(
                    stats
                        .oldest_timestamp
                        .map_or(oldest.timestamp, |t| t.min(oldest.timestamp)),
                );
            }
            if let Some(newest) = series.latest() {
                stats.newest_timestamp = Some(
                    stats
                        .newest_timestamp
                        .map_or(newest.timestamp, |t| t.max(newest.timestamp)),
                );
            }
        }

        stats
    }
}

impl SampleSource for SampleStore {
    fn query(&self, key: &MetricKey, start: i64, end: i64) -> SampleRange {
        SampleStore::query(self, key, start, end)
    }

    fn latest(&self, key: &MetricKey) -> Option<Sample> {
        SampleStore::latest(self, key)
    }
}

/// Result of a batch append
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub appended: usize,
    pub out_of_order: usize,
}

/// Store statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub series: usize,
    pub samples: usize,
    pub oldest_timestamp: Option<i64>,
    pub newest_timestamp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Out-of-order sample for {key}: timestamp {timestamp} <= last stored {last}")]
    OutOfOrder {
        key: String,
        timestamp: i64,
        last: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> MetricKey {
        MetricKey::with_labels(name, [("instance", "localhost:9100")])
    }

    #[test]
    fn test_query_returns_appended_in_order() {
        let mut store = SampleStore::new();
        let k = key("node_load1");

        let input: Vec<(i64, f64)> = (0..50).map(|i| (i * 15_000, i as f64 * 0.5)).collect();
        for &(ts, v) in &input {
            store.append(&k, ts, v).unwrap();
        }

        let out: Vec<(i64, f64)> = store
            .query(&k, i64::MIN, i64::MAX)
            .iter()
            .map(|s| (s.timestamp, s.value))
            .collect();
        assert_eq!(out, input);
    }

    #[test]
    fn test_out_of_order_rejected_and_series_unchanged() {
        let mut store = SampleStore::new();
        let k = key("cpu");

        store.append(&k, 1000, 1.0).unwrap();
        store.append(&k, 2000, 2.0).unwrap();

        assert!(matches!(
            store.append(&k, 2000, 9.0),
            Err(StoreError::OutOfOrder { timestamp: 2000, last: 2000, .. })
        ));
        assert!(matches!(
            store.append(&k, 1500, 9.0),
            Err(StoreError::OutOfOrder { .. })
        ));

        let values: Vec<f64> = store.query(&k, 0, 10_000).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_series_are_independent() {
        let mut store = SampleStore::new();
        store.append(&key("a"), 1000, 1.0).unwrap();
        store.append(&key("b"), 500, 1.0).unwrap();

        assert_eq!(store.stats().series, 2);
        assert_eq!(store.stats().samples, 2);
    }

    #[test]
    fn test_query_unknown_key_is_empty() {
        let store = SampleStore::new();
        assert!(store.query(&key("missing"), 0, 1000).is_empty());
        assert!(store.latest(&key("missing")).is_none());
    }

    #[test]
    fn test_append_batch_counts_rejections() {
        let mut store = SampleStore::new();
        let k = key("m");

        let outcome = store.append_batch(vec![
            (k.clone(), Sample::new(10, 1.0)),
            (k.clone(), Sample::new(10, 2.0)),
            (k.clone(), Sample::new(20, 3.0)),
        ]);

        assert_eq!(
            outcome,
            AppendOutcome {
                appended: 2,
                out_of_order: 1
            }
        );
    }

    #[test]
    fn test_evict_before_boundary() {
        let mut store = SampleStore::new();
        let k = key("m");
        for ts in [100, 200, 300, 400] {
            store.append(&k, ts, 1.0).unwrap();
        }

        assert_eq!(store.evict_before(50), 0);
        assert_eq!(store.evict_before(300), 2);

        let remaining: Vec<i64> = store.query(&k, 0, 1000).iter().map(|s| s.timestamp).collect();
        assert_eq!(remaining, vec![300, 400]);
    }

    #[test]
    fn test_evict_drops_empty_series() {
        let mut store = SampleStore::new();
        store.append(&key("old"), 10, 1.0).unwrap();
        store.append(&key("new"), 1000, 1.0).unwrap();

        store.evict_before(500);

        assert!(!store.contains(&key("old")));
        assert!(store.contains(&key("new")));
        assert_eq!(store.keys(), vec![key("new")]);
    }

    #[test]
    fn test_query_snapshot_survives_eviction() {
        let mut store = SampleStore::new();
        let k = key("m");
        store.append(&k, 10, 1.0).unwrap();
        store.append(&k, 20, 2.0).unwrap();

        let range = store.query(&k, 0, 100);
        store.evict_before(100);

        assert_eq!(range.len(), 2);
        assert!(store.query(&k, 0, 100).is_empty());
    }

    #[test]
    fn test_stats_timestamps() {
        let mut store = SampleStore::new();
        store.append(&key("a"), 100, 1.0).unwrap();
        store.append(&key("a"), 400, 1.0).unwrap();
        store.append(&key("b"), 50, 1.0).unwrap();

        let stats = store.stats();
        assert_eq!(stats.oldest_timestamp, Some(50));
        assert_eq!(stats.newest_timestamp, Some(400));
        assert_eq!(stats.samples, 3);
    }
}
