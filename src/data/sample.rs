use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single observation: epoch milliseconds and a value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Result of a range query.
///
/// Owns a snapshot of the matching samples, so it can be iterated any number
/// of times and outlives the lock that produced it. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct SampleRange {
    samples: Arc<[Sample]>,
}

impl Default for SampleRange {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl SampleRange {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

impl From<Vec<Sample>> for SampleRange {
    fn from(samples: Vec<Sample>) -> Self {
        Self {
            samples: samples.into(),
        }
    }
}

impl<'a> IntoIterator for &'a SampleRange {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
