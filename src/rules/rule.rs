//! Rule definitions

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::{Labels, MetricKey};
use crate::engine::config::duration_ms;

/// Alerting rule: a named threshold condition plus the time it must hold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub condition: Condition,
    /// How long the condition must hold before the alert fires
    #[serde(rename = "for_ms", with = "duration_ms", default)]
    pub for_duration: Duration,
    /// Labels attached to every notification for this rule
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Rule {
    pub fn new(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition,
            for_duration: Duration::ZERO,
            labels: Labels::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Set the "for" duration
    pub fn with_for(mut self, duration: Duration) -> Self {
        self.for_duration = duration;
        self
    }

    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(name.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(name.into(), value.into());
        self
    }

    pub fn for_ms(&self) -> i64 {
        i64::try_from(self.for_duration.as_millis()).unwrap_or(i64::MAX)
    }
}

/// `threshold(expr, comparator, value)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub expr: Expr,
    pub comparator: Comparator,
    pub threshold: f64,
}

impl Condition {
    pub fn new(expr: Expr, comparator: Comparator, threshold: f64) -> Self {
        Self {
            expr,
            comparator,
            threshold,
        }
    }
}

/// Numeric expressions a condition can be built on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Most recent value of a series
    Latest { key: MetricKey },
    /// Per-second increase over a trailing window
    Rate {
        key: MetricKey,
        #[serde(rename = "window_ms", with = "duration_ms")]
        window: Duration,
    },
    /// latest(numerator) / latest(denominator)
    Ratio {
        numerator: MetricKey,
        denominator: MetricKey,
    },
}

impl Expr {
    pub fn latest(key: MetricKey) -> Self {
        Expr::Latest { key }
    }

    pub fn rate(key: MetricKey, window: Duration) -> Self {
        Expr::Rate { key, window }
    }

    pub fn ratio(numerator: MetricKey, denominator: MetricKey) -> Self {
        Expr::Ratio {
            numerator,
            denominator,
        }
    }

    /// How far back in time this expression reads samples
    pub fn lookback(&self) -> Duration {
        match self {
            Expr::Rate { window, .. } => *window,
            Expr::Latest { .. } | Expr::Ratio { .. } => Duration::ZERO,
        }
    }

    /// Series this expression reads
    pub fn keys(&self) -> Vec<&MetricKey> {
        match self {
            Expr::Latest { key } | Expr::Rate { key, .. } => vec![key],
            Expr::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Latest { key } => write!(f, "{}", key),
            Expr::Rate { key, window } => write!(f, "rate({}[{}s])", key, window.as_secs()),
            Expr::Ratio {
                numerator,
                denominator,
            } => write!(f, "{} / {}", numerator, denominator),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparator {
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::GreaterOrEqual => value >= threshold,
            Comparator::LessThan => value < threshold,
            Comparator::LessOrEqual => value <= threshold,
            Comparator::Equal => value == threshold,
            Comparator::NotEqual => value != threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::GreaterThan => ">",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessThan => "<",
            Comparator::LessOrEqual => "<=",
            Comparator::Equal => "==",
            Comparator::NotEqual => "!=",
        }
    }
}
