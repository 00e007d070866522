//! Alerting rules and their evaluation
//!
//! A rule is a threshold over one of a fixed set of expression kinds:
//! latest value, per-second rate over a window, or the ratio of two series.

pub mod evaluator;
pub mod rule;

pub use evaluator::{evaluate_condition, evaluate_expr, EvalError, Evaluation};
pub use rule::{Comparator, Condition, Expr, Rule};
