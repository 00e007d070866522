pub mod series;
pub mod store;

pub use series::Series;
pub use store::{AppendOutcome, SampleSource, SampleStore, StoreError, StoreStats};
