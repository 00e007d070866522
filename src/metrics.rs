//! Process-wide counters for per-tick errors and activity.
//!
//! Nothing that goes wrong inside a tick is returned to a caller; it ends up
//! here instead and is served on `/stats`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counters {
    scrapes: AtomicU64,
    scrape_failures: AtomicU64,
    samples_appended: AtomicU64,
    out_of_order_samples: AtomicU64,
    malformed_lines: AtomicU64,
    evaluations: AtomicU64,
    insufficient_data: AtomicU64,
    division_by_zero: AtomicU64,
    notifications_sent: AtomicU64,
    notification_failures: AtomicU64,
    samples_evicted: AtomicU64,
}

macro_rules! counter {
    ($incr:ident, $add:ident, $get:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $add(&self, n: u64) {
            self.$field.fetch_add(n, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.$field.load(Ordering::Relaxed)
        }
    };
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(incr_scrapes, add_scrapes, scrapes, scrapes);
    counter!(incr_scrape_failures, add_scrape_failures, scrape_failures, scrape_failures);
    counter!(incr_samples_appended, add_samples_appended, samples_appended, samples_appended);
    counter!(incr_out_of_order, add_out_of_order, out_of_order_samples, out_of_order_samples);
    counter!(incr_malformed_lines, add_malformed_lines, malformed_lines, malformed_lines);
    counter!(incr_evaluations, add_evaluations, evaluations, evaluations);
    counter!(incr_insufficient_data, add_insufficient_data, insufficient_data, insufficient_data);
    counter!(incr_division_by_zero, add_division_by_zero, division_by_zero, division_by_zero);
    counter!(incr_notifications_sent, add_notifications_sent, notifications_sent, notifications_sent);
    counter!(
        incr_notification_failures,
        add_notification_failures,
        notification_failures,
        notification_failures
    );
    counter!(incr_samples_evicted, add_samples_evicted, samples_evicted, samples_evicted);

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot::from(self)
    }
}

/// Point-in-time copy of [`Counters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CounterSnapshot {
    pub scrapes: u64,
    pub scrape_failures: u64,
    pub samples_appended: u64,
    pub out_of_order_samples: u64,
    pub malformed_lines: u64,
    pub evaluations: u64,
    pub insufficient_data: u64,
    pub division_by_zero: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub samples_evicted: u64,
}

impl From<&Counters> for CounterSnapshot {
    fn from(c: &Counters) -> Self {
        Self {
            scrapes: c.scrapes(),
            scrape_failures: c.scrape_failures(),
            samples_appended: c.samples_appended(),
            out_of_order_samples: c.out_of_order_samples(),
            malformed_lines: c.malformed_lines(),
            evaluations: c.evaluations(),
            insufficient_data: c.insufficient_data(),
            division_by_zero: c.division_by_zero(),
            notifications_sent: c.notifications_sent(),
            notification_failures: c.notification_failures(),
            samples_evicted: c.samples_evicted(),
        }
    }
}
