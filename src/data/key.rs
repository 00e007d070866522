use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Label set sorted by label name
pub type Labels = BTreeMap<String, String>;

/// Identity of a series: metric name plus its sorted label set.
///
/// Equality and hashing go through the canonical string form
/// (`name{a="1",b="2"}`), which is computed once at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "KeyParts", into = "KeyParts")]
pub struct MetricKey {
    name: String,
    labels: Labels,
    canonical: String,
}

#[derive(Serialize, Deserialize)]
struct KeyParts {
    name: String,
    #[serde(default)]
    labels: Labels,
}

impl From<KeyParts> for MetricKey {
    fn from(parts: KeyParts) -> Self {
        MetricKey::new(parts.name, parts.labels)
    }
}

impl From<MetricKey> for KeyParts {
    fn from(key: MetricKey) -> Self {
        KeyParts {
            name: key.name,
            labels: key.labels,
        }
    }
}

impl MetricKey {
    pub fn new(name: impl Into<String>, labels: Labels) -> Self {
        let name = name.into();
        let canonical = canonical_form(&name, &labels);
        Self {
            name,
            labels,
            canonical,
        }
    }

    /// Key without labels
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Labels::new())
    }

    /// Build a key from `(name, value)` label pairs in any order
    pub fn with_labels<K, V>(name: impl Into<String>, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let labels = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(name, labels)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Copy of this key with one label added (or replaced)
    pub fn with_label(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut labels = self.labels.clone();
        labels.insert(name.into(), value.into());
        Self::new(self.name.clone(), labels)
    }
}

fn canonical_form(name: &str, labels: &Labels) -> String {
    if labels.is_empty() {
        return name.to_string();
    }

    let mut out = String::with_capacity(name.len() + labels.len() * 16);
    out.push_str(name);
    out.push('{');
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(k);
        out.push_str("=\"");
        escape_label_value(v, &mut out);
        out.push('"');
    }
    out.push('}');
    out
}

fn escape_label_value(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
}

impl PartialEq for MetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for MetricKey {}

impl Hash for MetricKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}
