//! Expression evaluation against stored samples

use super::rule::{Condition, Expr};
use crate::storage::SampleSource;

/// Outcome of evaluating a condition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Value of the underlying expression
    pub value: f64,
    /// Whether the comparator held
    pub triggered: bool,
}

/// Evaluate a numeric expression at time `now` (epoch millis)
pub fn evaluate_expr<S>(expr: &Expr, source: &S, now: i64) -> Result<f64, EvalError>
where
    S: SampleSource + ?Sized,
{
    match expr {
        Expr::Latest { key } => source
            .latest(key)
            .map(|s| s.value)
            .ok_or_else(|| EvalError::InsufficientData(key.to_string())),

        Expr::Rate { key, window } => {
            let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
            let range = source.query(key, now.saturating_sub(window_ms), now);

            match (range.first(), range.last()) {
                (Some(first), Some(last)) if range.len() >= 2 => {
                    let seconds = window_ms as f64 / 1000.0;
                    Ok((last.value - first.value) / seconds)
                }
                _ => Err(EvalError::InsufficientData(key.to_string())),
            }
        }

        Expr::Ratio {
            numerator,
            denominator,
        } => {
            let num = source
                .latest(numerator)
                .ok_or_else(|| EvalError::InsufficientData(numerator.to_string()))?;
            let den = source
                .latest(denominator)
                .ok_or_else(|| EvalError::InsufficientData(denominator.to_string()))?;

            if den.value == 0.0 {
                return Err(EvalError::DivisionByZero(denominator.to_string()));
            }
            Ok(num.value / den.value)
        }
    }
}

/// Evaluate a threshold condition
pub fn evaluate_condition<S>(condition: &Condition, source: &S, now: i64) -> Result<Evaluation, EvalError>
where
    S: SampleSource + ?Sized,
{
    let value = evaluate_expr(&condition.expr, source, now)?;
    Ok(Evaluation {
        value,
        triggered: condition.comparator.compare(value, condition.threshold),
    })
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Not enough samples to compute a value; the rule counts as false
    #[error("Insufficient data for {0}")]
    InsufficientData(String),

    /// Denominator was zero; the result is undefined and the rule is skipped
    #[error("Division by zero: latest value of {0} is 0")]
    DivisionByZero(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetricKey;
    use crate::rules::Comparator;
    use crate::storage::SampleStore;
    use std::time::Duration;

    fn requests() -> MetricKey {
        MetricKey::with_labels("http_requests_total", [("instance", "app:5000")])
    }

    #[test]
    fn test_rate_two_samples() {
        let mut store = SampleStore::new();
        store.append(&requests(), 0, 10.0).unwrap();
        store.append(&requests(), 60_000, 70.0).unwrap();

        let expr = Expr::rate(requests(), Duration::from_secs(60));
        assert_eq!(evaluate_expr(&expr, &store, 60_000).unwrap(), 1.0);
    }

    #[test]
    fn test_rate_uses_window_only() {
        let mut store = SampleStore::new();
        store.append(&requests(), 0, 0.0).unwrap();
        store.append(&requests(), 60_000, 100.0).unwrap();
        store.append(&requests(), 90_000, 130.0).unwrap();
        store.append(&requests(), 120_000, 160.0).unwrap();

        // window [60s, 120s]: (160 - 100) / 60
        let expr = Expr::rate(requests(), Duration::from_secs(60));
        assert_eq!(evaluate_expr(&expr, &store, 120_000).unwrap(), 1.0);
    }

    #[test]
    fn test_rate_insufficient_data() {
        let mut store = SampleStore::new();
        let expr = Expr::rate(requests(), Duration::from_secs(60));

        assert!(matches!(
            evaluate_expr(&expr, &store, 60_000),
            Err(EvalError::InsufficientData(_))
        ));

        store.append(&requests(), 30_000, 5.0).unwrap();
        assert!(matches!(
            evaluate_expr(&expr, &store, 60_000),
            Err(EvalError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_ratio() {
        let mut store = SampleStore::new();
        let avail = MetricKey::bare("node_memory_MemAvailable_bytes");
        let total = MetricKey::bare("node_memory_MemTotal_bytes");
        store.append(&avail, 1000, 1.0e9).unwrap();
        store.append(&total, 1000, 4.0e9).unwrap();

        let expr = Expr::ratio(avail, total);
        assert_eq!(evaluate_expr(&expr, &store, 2000).unwrap(), 0.25);
    }

    #[test]
    fn test_ratio_division_by_zero() {
        let mut store = SampleStore::new();
        let errors = MetricKey::bare("errors_total");
        let total = MetricKey::bare("requests_total");
        store.append(&errors, 1000, 3.0).unwrap();
        store.append(&total, 1000, 0.0).unwrap();

        let condition = Condition::new(Expr::ratio(errors, total), Comparator::GreaterThan, 0.1);
        assert!(matches!(
            evaluate_condition(&condition, &store, 1000),
            Err(EvalError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_ratio_missing_side() {
        let mut store = SampleStore::new();
        let errors = MetricKey::bare("errors_total");
        store.append(&errors, 1000, 3.0).unwrap();

        let expr = Expr::ratio(errors, MetricKey::bare("requests_total"));
        assert!(matches!(
            evaluate_expr(&expr, &store, 1000),
            Err(EvalError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_threshold_condition() {
        let mut store = SampleStore::new();
        let load = MetricKey::bare("node_load1");
        store.append(&load, 1000, 4.0).unwrap();

        let gt = Condition::new(Expr::latest(load.clone()), Comparator::GreaterThan, 4.0);
        let ge = Condition::new(Expr::latest(load), Comparator::GreaterOrEqual, 4.0);

        let result = evaluate_condition(&gt, &store, 1000).unwrap();
        assert_eq!(result.value, 4.0);
        assert!(!result.triggered);
        assert!(evaluate_condition(&ge, &store, 1000).unwrap().triggered);
    }
}
