//! Alert state table
//!
//! Holds one [`AlertState`] per rule and turns evaluation results into
//! state transitions and notifications.

use std::collections::HashMap;

use super::notifier::{Notification, NotifyState};
use super::state::{AlertState, AlertTransition};
use crate::rules::{EvalError, Evaluation, Rule};

#[derive(Debug, Default)]
pub struct AlertManager {
    states: HashMap<String, AlertState>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one evaluation result for `rule` at time `now`.
    ///
    /// Insufficient data counts as a false condition and clears the last
    /// value. Division by zero leaves the state untouched for this tick.
    pub fn observe(
        &mut self,
        rule: &Rule,
        result: &Result<Evaluation, EvalError>,
        now: i64,
    ) -> Option<Notification> {
        let (condition, value) = match result {
            Ok(evaluation) => (evaluation.triggered, Some(evaluation.value)),
            Err(EvalError::InsufficientData(_)) => (false, None),
            Err(EvalError::DivisionByZero(_)) => return None,
        };

        let state = self.states.entry(rule.name.clone()).or_default();
        state.last_value = value;

        let transition = state.step(condition, now, rule.for_ms())?;
        let notify_state = match transition {
            AlertTransition::Fired => NotifyState::Firing,
            AlertTransition::Resolved => NotifyState::Resolved,
        };

        tracing::info!(
            rule = %rule.name,
            state = ?notify_state,
            value = ?state.last_value,
            "Alert state changed"
        );

        Some(Notification::for_rule(rule, notify_state, state.last_value, now))
    }

    pub fn get(&self, rule_name: &str) -> Option<&AlertState> {
        self.states.get(rule_name)
    }

    /// All known states, sorted by rule name
    pub fn states(&self) -> Vec<(String, AlertState)> {
        let mut states: Vec<(String, AlertState)> = self
            .states
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    pub fn firing_count(&self) -> usize {
        self.states.values().filter(|s| s.is_firing()).count()
    }
}
