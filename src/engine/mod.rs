//! The engine instance shared by every periodic task.
//!
//! Holds the sample store and the alert state table behind one lock. The
//! lock is taken for a single append batch, query, eviction or transition
//! and never held across an `.await`.

pub mod config;
pub mod scheduler;

pub use config::{load_rules, ConfigError, EngineConfig};
pub use scheduler::Scheduler;

use std::time::Duration;

use parking_lot::Mutex;

use crate::alerts::{AlertManager, AlertState, Notification};
use crate::data::{MetricKey, Sample, SampleRange};
use crate::metrics::Counters;
use crate::rules::{evaluate_condition, EvalError, Rule};
use crate::storage::{AppendOutcome, SampleSource, SampleStore, StoreError, StoreStats};

struct EngineState {
    store: SampleStore,
    alerts: AlertManager,
}

pub struct Engine {
    state: Mutex<EngineState>,
    rules: Vec<Rule>,
    retention: Duration,
    counters: Counters,
}

impl Engine {
    pub fn new(rules: Vec<Rule>, retention: Duration) -> Self {
        Self {
            state: Mutex::new(EngineState {
                store: SampleStore::new(),
                alerts: AlertManager::new(),
            }),
            rules,
            retention,
            counters: Counters::new(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.rules.clone(), config.retention)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn append(&self, key: &MetricKey, timestamp: i64, value: f64) -> Result<(), StoreError> {
        let result = self.state.lock().store.append(key, timestamp, value);
        match result {
            Ok(()) => self.counters.incr_samples_appended(),
            Err(_) => self.counters.incr_out_of_order(),
        }
        result
    }

    /// Append a batch under a single lock acquisition
    pub fn append_batch(&self, samples: Vec<(MetricKey, Sample)>) -> AppendOutcome {
        let outcome = self.state.lock().store.append_batch(samples);
        self.counters.add_samples_appended(outcome.appended as u64);
        self.counters.add_out_of_order(outcome.out_of_order as u64);
        outcome
    }

    pub fn query(&self, key: &MetricKey, start: i64, end: i64) -> SampleRange {
        self.state.lock().store.query(key, start, end)
    }

    pub fn latest(&self, key: &MetricKey) -> Option<Sample> {
        self.state.lock().store.latest(key)
    }

    pub fn keys(&self) -> Vec<MetricKey> {
        self.state.lock().store.keys()
    }

    pub fn store_stats(&self) -> StoreStats {
        self.state.lock().store.stats()
    }

    /// Evaluate every rule at `now` and return the notifications produced.
    ///
    /// Each rule reads the store through its own short-lived lock
    /// acquisitions; its state transition takes the lock once more.
    pub fn evaluate(&self, now: i64) -> Vec<Notification> {
        let mut notifications = Vec::new();

        for rule in &self.rules {
            self.counters.incr_evaluations();
            let result = evaluate_condition(&rule.condition, self, now);

            match &result {
                Ok(_) => {}
                Err(e @ EvalError::InsufficientData(_)) => {
                    self.counters.incr_insufficient_data();
                    tracing::debug!(rule = %rule.name, error = %e, "Rule treated as false");
                }
                Err(e @ EvalError::DivisionByZero(_)) => {
                    self.counters.incr_division_by_zero();
                    tracing::debug!(rule = %rule.name, error = %e, "Rule skipped this tick");
                }
            }

            if let Some(notification) = self.state.lock().alerts.observe(rule, &result, now) {
                notifications.push(notification);
            }
        }

        notifications
    }

    /// Oldest timestamp eviction at `now` may keep.
    ///
    /// Never newer than the longest rule lookback, so a rule window is
    /// always fully populated.
    pub fn eviction_cutoff(&self, now: i64) -> i64 {
        let longest_lookback = self
            .rules
            .iter()
            .map(|r| r.condition.expr.lookback())
            .max()
            .unwrap_or(Duration::ZERO);
        let keep = self.retention.max(longest_lookback);
        now.saturating_sub(i64::try_from(keep.as_millis()).unwrap_or(i64::MAX))
    }

    /// Drop samples that fell out of retention; returns how many were removed
    pub fn evict(&self, now: i64) -> usize {
        let cutoff = self.eviction_cutoff(now);
        let removed = self.evict_before(cutoff);
        if removed > 0 {
            tracing::debug!(cutoff, removed, "Evicted samples");
        }
        removed
    }

    pub fn evict_before(&self, cutoff: i64) -> usize {
        let removed = self.state.lock().store.evict_before(cutoff);
        self.counters.add_samples_evicted(removed as u64);
        removed
    }

    pub fn alert_state(&self, rule_name: &str) -> Option<AlertState> {
        self.state.lock().alerts.get(rule_name).cloned()
    }

    pub fn alert_states(&self) -> Vec<(String, AlertState)> {
        self.state.lock().alerts.states()
    }

    pub fn firing_count(&self) -> usize {
        self.state.lock().alerts.firing_count()
    }
}

impl SampleSource for Engine {
    fn query(&self, key: &MetricKey, start: i64, end: i64) -> SampleRange {
        Engine::query(self, key, start, end)
    }

    fn latest(&self, key: &MetricKey) -> Option<Sample> {
        Engine::latest(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertStatus, NotifyState};
    use crate::rules::{Comparator, Condition, Expr};

    fn error_ratio_rule() -> Rule {
        Rule::new(
            "HighErrorRatio",
            Condition::new(
                Expr::ratio(MetricKey::bare("errors_total"), MetricKey::bare("requests_total")),
                Comparator::GreaterThan,
                0.1,
            ),
        )
    }

    fn cpu_rate_rule(for_secs: u64) -> Rule {
        Rule::new(
            "CpuBusy",
            Condition::new(
                Expr::rate(MetricKey::bare("cpu_seconds_total"), Duration::from_secs(60)),
                Comparator::GreaterOrEqual,
                0.5,
            ),
        )
        .with_for(Duration::from_secs(for_secs))
    }

    #[test]
    fn test_append_counts() {
        let engine = Engine::new(vec![], Duration::from_secs(60));
        let key = MetricKey::bare("m");

        engine.append(&key, 10, 1.0).unwrap();
        assert!(engine.append(&key, 10, 1.0).is_err());

        let snap = engine.counters().snapshot();
        assert_eq!(snap.samples_appended, 1);
        assert_eq!(snap.out_of_order_samples, 1);
    }

    #[test]
    fn test_evaluate_fires_rate_rule_after_for() {
        let engine = Engine::new(vec![cpu_rate_rule(120)], Duration::from_secs(3600));
        let key = MetricKey::bare("cpu_seconds_total");

        // 0.75 cpu-seconds per second
        for i in 0..=10 {
            engine.append(&key, i * 30_000, i as f64 * 22.5).unwrap();
        }

        assert!(engine.evaluate(60_000).is_empty());
        assert_eq!(engine.alert_state("CpuBusy").unwrap().status, AlertStatus::Pending);
        assert!(engine.evaluate(120_000).is_empty());

        let notes = engine.evaluate(180_000);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].state, NotifyState::Firing);
        assert_eq!(notes[0].value, Some(0.75));
        assert_eq!(engine.firing_count(), 1);
    }

    #[test]
    fn test_evaluate_division_by_zero_is_skipped() {
        let engine = Engine::new(vec![error_ratio_rule()], Duration::from_secs(60));
        engine.append(&MetricKey::bare("errors_total"), 1000, 5.0).unwrap();
        engine.append(&MetricKey::bare("requests_total"), 1000, 0.0).unwrap();

        assert!(engine.evaluate(1000).is_empty());
        assert!(engine.alert_state("HighErrorRatio").is_none());
        assert_eq!(engine.counters().division_by_zero(), 1);
        assert_eq!(engine.counters().evaluations(), 1);
    }

    #[test]
    fn test_evaluate_insufficient_data_counted() {
        let engine = Engine::new(vec![cpu_rate_rule(0)], Duration::from_secs(60));

        assert!(engine.evaluate(1000).is_empty());
        assert_eq!(engine.counters().insufficient_data(), 1);
        assert_eq!(
            engine.alert_state("CpuBusy").unwrap().status,
            AlertStatus::Inactive
        );
    }

    #[test]
    fn test_eviction_cutoff_respects_rule_lookback() {
        let engine = Engine::new(vec![cpu_rate_rule(0)], Duration::from_secs(30));
        // Rate window (60s) is longer than retention (30s)
        assert_eq!(engine.eviction_cutoff(100_000), 40_000);

        let engine = Engine::new(vec![cpu_rate_rule(0)], Duration::from_secs(600));
        assert_eq!(engine.eviction_cutoff(1_000_000), 400_000);
    }

    #[test]
    fn test_evict_keeps_rule_window() {
        let engine = Engine::new(vec![cpu_rate_rule(0)], Duration::from_secs(10));
        let key = MetricKey::bare("cpu_seconds_total");
        for i in 0..=4 {
            engine.append(&key, i * 30_000, i as f64 * 30.0).unwrap();
        }

        let removed = engine.evict(120_000);
        assert_eq!(removed, 2);
        assert_eq!(engine.query(&key, 0, i64::MAX).len(), 3);
        assert_eq!(engine.counters().samples_evicted(), 2);

        // Rule window [60s, 120s] still intact
        let notes = engine.evaluate(120_000);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_evict_before_boundary() {
        let engine = Engine::new(vec![], Duration::from_secs(60));
        let key = MetricKey::bare("m");
        for ts in [1000, 2000, 3000] {
            engine.append(&key, ts, 1.0).unwrap();
        }

        assert_eq!(engine.evict_before(2000), 1);
        let left: Vec<i64> = engine.query(&key, 0, 10_000).iter().map(|s| s.timestamp).collect();
        assert_eq!(left, vec![2000, 3000]);
        assert_eq!(engine.evict_before(500), 0);
    }
}
