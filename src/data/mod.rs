//! Core metric data types shared by the store, scraper and rule evaluator.

pub mod key;
pub mod sample;

pub use key::{Labels, MetricKey};
pub use sample::{Sample, SampleRange};
