use std::collections::VecDeque;

use crate::data::{Sample, SampleRange};

/// Time-ordered samples for a single metric key.
///
/// Timestamps are strictly increasing; appends that would break this are
/// rejected by the store before they reach the series.
#[derive(Debug, Default)]
pub struct Series {
    samples: VecDeque<Sample>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp of the newest sample
    pub fn last_timestamp(&self) -> Option<i64> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn oldest(&self) -> Option<Sample> {
        self.samples.front().copied()
    }

    /// Push a sample. Returns false (and leaves the series untouched) if the
    /// timestamp does not advance past the newest sample.
    pub fn push(&mut self, sample: Sample) -> bool {
        if let Some(last) = self.last_timestamp() {
            if sample.timestamp <= last {
                return false;
            }
        }
        self.samples.push_back(sample);
        true
    }

    /// Samples with `start <= timestamp <= end`
    pub fn range(&self, start: i64, end: i64) -> SampleRange {
        if start > end {
            return SampleRange::empty();
        }

        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp <= end);
        if lo >= hi {
            return SampleRange::empty();
        }

        self.samples
            .range(lo..hi)
            .copied()
            .collect::<Vec<_>>()
            .into()
    }

    /// Drop samples older than `cutoff`; returns how many were removed
    pub fn evict_before(&mut self, cutoff: i64) -> usize {
        let count = self.samples.partition_point(|s| s.timestamp < cutoff);
        self.samples.drain(..count);
        count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
