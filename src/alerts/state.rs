//! Per-rule alert state machine

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Inactive,
    Pending,
    Firing,
}

/// Transition that produces a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTransition {
    Fired,
    Resolved,
}

/// Current state of one rule's alert
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    pub status: AlertStatus,
    /// When the condition first became true in the current run (epoch millis)
    pub active_since: Option<i64>,
    /// When the alert last moved to firing
    pub fired_at: Option<i64>,
    /// Last tick the rule was observed
    pub last_evaluated: Option<i64>,
    /// Value from the last observed tick; `None` when data was missing
    pub last_value: Option<f64>,
}

impl AlertState {
    /// Advance the state machine with this tick's condition result.
    ///
    /// Pending becomes Firing once `now - active_since >= for_ms`; with a
    /// zero `for_ms` an inactive alert fires on its first true tick.
    pub fn step(&mut self, condition: bool, now: i64, for_ms: i64) -> Option<AlertTransition> {
        self.last_evaluated = Some(now);

        match (self.status, condition) {
            (AlertStatus::Inactive, false) => None,
            (AlertStatus::Inactive, true) => {
                self.active_since = Some(now);
                self.status = AlertStatus::Pending;
                self.promote_if_due(now, for_ms)
            }
            (AlertStatus::Pending, true) => self.promote_if_due(now, for_ms),
            (AlertStatus::Pending, false) => {
                self.reset();
                None
            }
            (AlertStatus::Firing, true) => None,
            (AlertStatus::Firing, false) => {
                self.reset();
                Some(AlertTransition::Resolved)
            }
        }
    }

    fn promote_if_due(&mut self, now: i64, for_ms: i64) -> Option<AlertTransition> {
        let since = self.active_since.unwrap_or(now);
        if now.saturating_sub(since) >= for_ms {
            self.status = AlertStatus::Firing;
            self.fired_at = Some(now);
            Some(AlertTransition::Fired)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.status = AlertStatus::Inactive;
        self.active_since = None;
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}
