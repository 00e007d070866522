//! Engine configuration
//!
//! The engine consumes an already-built [`EngineConfig`]. How it is
//! assembled (environment, files) is up to the binary; [`load_rules`] is the
//! one file-reading helper offered here.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alerts::NotifyTarget;
use crate::rules::{Expr, Rule};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scrape targets, `host:port` or full URLs
    pub targets: Vec<String>,
    #[serde(rename = "scrape_interval_ms", with = "duration_ms")]
    pub scrape_interval: Duration,
    /// Per-target fetch timeout
    #[serde(rename = "scrape_timeout_ms", with = "duration_ms")]
    pub scrape_timeout: Duration,
    /// Upper bound on concurrent target fetches
    pub max_concurrent_scrapes: usize,
    #[serde(rename = "evaluation_interval_ms", with = "duration_ms")]
    pub evaluation_interval: Duration,
    #[serde(rename = "eviction_interval_ms", with = "duration_ms")]
    pub eviction_interval: Duration,
    /// How long samples are kept
    #[serde(rename = "retention_ms", with = "duration_ms")]
    pub retention: Duration,
    pub rules: Vec<Rule>,
    pub notify: Vec<NotifyTarget>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            scrape_interval: Duration::from_secs(15),
            scrape_timeout: Duration::from_secs(10),
            max_concurrent_scrapes: num_cpus::get() * 4,
            evaluation_interval: Duration::from_secs(15),
            eviction_interval: Duration::from_secs(60),
            retention: Duration::from_secs(60 * 60),
            rules: Vec::new(),
            notify: vec![NotifyTarget::Log],
        }
    }
}

impl EngineConfig {
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Check everything the engine relies on without re-checking later
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("scrape_interval", self.scrape_interval),
            ("scrape_timeout", self.scrape_timeout),
            ("evaluation_interval", self.evaluation_interval),
            ("eviction_interval", self.eviction_interval),
            ("retention", self.retention),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(field));
            }
        }

        if self.scrape_timeout >= self.scrape_interval {
            return Err(ConfigError::Invalid(format!(
                "scrape_timeout ({:?}) must be shorter than scrape_interval ({:?})",
                self.scrape_timeout, self.scrape_interval
            )));
        }

        if self.max_concurrent_scrapes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_scrapes must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.trim().is_empty() {
                return Err(ConfigError::Invalid("empty scrape target".to_string()));
            }
            if !seen.insert(target.as_str()) {
                return Err(ConfigError::DuplicateTarget(target.clone()));
            }
        }

        let mut names = HashSet::new();
        for rule in &self.rules {
            if rule.name.is_empty() {
                return Err(ConfigError::Invalid("rule with empty name".to_string()));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(ConfigError::DuplicateRule(rule.name.clone()));
            }
            if !rule.condition.threshold.is_finite() {
                return Err(ConfigError::InvalidRule {
                    rule: rule.name.clone(),
                    reason: "threshold must be finite".to_string(),
                });
            }
            if let Expr::Rate { window, .. } = &rule.condition.expr {
                if window.is_zero() {
                    return Err(ConfigError::InvalidRule {
                        rule: rule.name.clone(),
                        reason: "rate window must be positive".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Read a JSON array of rules from a file
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<Rule>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Duplicate scrape target: {0}")]
    DuplicateTarget(String),

    #[error("Duplicate rule name: {0}")]
    DuplicateRule(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Durations as integer milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MetricKey;
    use crate::rules::{Comparator, Condition};
    use std::io::Write;

    fn load_rule(name: &str) -> Rule {
        Rule::new(
            name,
            Condition::new(
                Expr::latest(MetricKey::bare("node_load1")),
                Comparator::GreaterThan,
                4.0,
            ),
        )
    }

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.max_concurrent_scrapes >= 1);
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = EngineConfig {
            scrape_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("scrape_interval"))
        ));
    }

    #[test]
    fn test_rejects_timeout_not_shorter_than_interval() {
        let config = EngineConfig {
            scrape_interval: Duration::from_secs(10),
            scrape_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = EngineConfig {
            scrape_timeout: Duration::from_secs(9),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicates() {
        let config = EngineConfig::default()
            .with_targets(vec!["a:9100".into(), "a:9100".into()]);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateTarget(_))));

        let config = EngineConfig::default().with_rules(vec![load_rule("x"), load_rule("x")]);
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateRule(_))));
    }

    #[test]
    fn test_rejects_zero_rate_window() {
        let rule = Rule::new(
            "r",
            Condition::new(
                Expr::rate(MetricKey::bare("c"), Duration::ZERO),
                Comparator::GreaterThan,
                1.0,
            ),
        );
        let config = EngineConfig::default().with_rules(vec![rule]);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidRule { .. })));
    }

    #[test]
    fn test_config_from_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"targets": ["localhost:9100"], "scrape_interval_ms": 5000, "scrape_timeout_ms": 2000}"#,
        )
        .unwrap();

        assert_eq!(config.targets, vec!["localhost:9100".to_string()]);
        assert_eq!(config.scrape_interval, Duration::from_secs(5));
        assert_eq!(config.retention, Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rules_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{
                "name": "NodeDown",
                "condition": {{
                    "expr": {{"kind": "latest", "key": {{"name": "up", "labels": {{"instance": "localhost:9100"}}}}}},
                    "comparator": "==",
                    "threshold": 0
                }},
                "for_ms": 60000
            }}]"#
        )
        .unwrap();

        let rules = load_rules(file.path()).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "NodeDown");
        assert_eq!(rules[0].for_duration, Duration::from_secs(60));
    }

    #[test]
    fn test_load_rules_errors() {
        assert!(matches!(
            load_rules("/nonexistent/rules.json"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(load_rules(file.path()), Err(ConfigError::Parse { .. })));
    }
}
