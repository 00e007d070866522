//! Periscope: Metrics Scraping and Threshold Alerting Engine
//!
//! A small single-process monitoring engine. It periodically scrapes
//! text-exposition metrics from HTTP targets, keeps recent samples in a
//! bounded in-memory store, evaluates threshold rules against them and
//! sends notifications when alerts start or stop firing.
//!
//! # Features
//!
//! - **Concurrent Scraping**: Bounded fan-out with a per-target timeout
//! - **In-Memory Store**: Ordered samples per series with retention eviction
//! - **Threshold Rules**: Latest value, rate over a window, and ratio expressions
//! - **Alert Lifecycle**: Inactive, pending and firing states with a `for` duration
//! - **Notifications**: Log and webhook sinks
//!
//! # Example
//!
//! ```no_run
//! use periscope::data::MetricKey;
//! use periscope::rules::{Comparator, Condition, Expr, Rule};
//! use periscope::Engine;
//! use std::time::Duration;
//!
//! let rule = Rule::new(
//!     "QueueBacklog",
//!     Condition::new(Expr::latest(MetricKey::bare("queue_depth")), Comparator::GreaterThan, 100.0),
//! );
//! let engine = Engine::new(vec![rule], Duration::from_secs(3600));
//!
//! engine.append(&MetricKey::bare("queue_depth"), 1_000, 250.0).unwrap();
//! for notification in engine.evaluate(2_000) {
//!     println!("{} is {}", notification.alert_name, notification.state.as_str());
//! }
//! ```

pub mod alerts;
pub mod api;
pub mod data;
pub mod engine;
pub mod metrics;
pub mod rules;
pub mod scrape;
pub mod storage;

// Re-export commonly used types
pub use alerts::{Notification, NotifyState};
pub use data::{MetricKey, Sample};
pub use engine::{Engine, EngineConfig};
pub use rules::{Comparator, Condition, Expr, Rule};
pub use storage::{SampleStore, StoreError};
