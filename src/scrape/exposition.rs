//! Text exposition parser
//!
//! Accepts lines of the form
//!
//! ```text
//! # HELP http_requests_total Total requests
//! http_requests_total{method="GET",code="200"} 1027 1395066363000
//! process_open_fds 12
//! ```
//!
//! Comment and blank lines are ignored. A line that cannot be parsed is
//! reported in [`Exposition::errors`] and skipped; the rest of the body is
//! still used.

use std::sync::OnceLock;

use regex::Regex;

use crate::data::{Labels, MetricKey};

fn metric_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_:][a-zA-Z0-9_:]*$").expect("valid regex"))
}

fn label_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"))
}

/// One parsed exposition line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    pub key: MetricKey,
    pub value: f64,
    /// Explicit timestamp in epoch milliseconds, if the line carried one
    pub timestamp: Option<i64>,
}

/// Parsed exposition body
#[derive(Debug, Default)]
pub struct Exposition {
    pub samples: Vec<ParsedSample>,
    /// Malformed lines as (1-based line number, error)
    pub errors: Vec<(usize, ParseError)>,
}

impl Exposition {
    pub fn malformed_count(&self) -> usize {
        self.errors.len()
    }
}

/// Parse a whole exposition body
pub fn parse_exposition(body: &str) -> Exposition {
    let mut exposition = Exposition::default();

    for (idx, line) in body.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(sample)) => exposition.samples.push(sample),
            Ok(None) => {}
            Err(e) => exposition.errors.push((idx + 1, e)),
        }
    }

    exposition
}

/// Parse a single line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<ParsedSample>, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or(ParseError::MissingValue)?;
    let name = &line[..name_end];
    if !metric_name_re().is_match(name) {
        return Err(ParseError::InvalidMetricName(name.to_string()));
    }

    let mut rest = &line[name_end..];
    let labels = if rest.starts_with('{') {
        let (labels, after) = parse_labels(&rest[1..])?;
        rest = after;
        labels
    } else {
        Labels::new()
    };

    let mut tokens = rest.split_whitespace();
    let value = tokens
        .next()
        .ok_or(ParseError::MissingValue)
        .and_then(parse_value)?;
    let timestamp = match tokens.next() {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ParseError::InvalidTimestamp(raw.to_string()))?,
        ),
        None => None,
    };
    if let Some(extra) = tokens.next() {
        return Err(ParseError::TrailingInput(extra.to_string()));
    }

    Ok(Some(ParsedSample {
        key: MetricKey::new(name, labels),
        value,
        timestamp,
    }))
}

/// Parse the inside of `{...}`; `input` starts just after the opening brace.
/// Returns the labels and the remainder after the closing brace.
fn parse_labels(input: &str) -> Result<(Labels, &str), ParseError> {
    let mut labels = Labels::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or(ParseError::UnterminatedLabels)?;
        let label_name = rest[..eq].trim();
        if !label_name_re().is_match(label_name) {
            return Err(ParseError::InvalidLabelName(label_name.to_string()));
        }

        rest = rest[eq + 1..].trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| ParseError::UnquotedLabelValue(label_name.to_string()))?;

        let (value, after) = parse_quoted(rest)?;
        if labels.insert(label_name.to_string(), value).is_some() {
            return Err(ParseError::DuplicateLabel(label_name.to_string()));
        }

        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err(ParseError::UnterminatedLabels);
        }
    }
}

/// Read an escaped label value up to its closing quote
fn parse_quoted(input: &str) -> Result<(String, &str), ParseError> {
    let mut value = String::new();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '"')) => value.push('"'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, other)) => {
                    value.push('\\');
                    value.push(other);
                }
                None => break,
            },
            c => value.push(c),
        }
    }

    Err(ParseError::UnterminatedLabels)
}

fn parse_value(raw: &str) -> Result<f64, ParseError> {
    match raw {
        "NaN" => Ok(f64::NAN),
        "+Inf" | "Inf" => Ok(f64::INFINITY),
        "-Inf" => Ok(f64::NEG_INFINITY),
        _ => raw
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidValue(raw.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid metric name: {0:?}")]
    InvalidMetricName(String),

    #[error("Invalid label name: {0:?}")]
    InvalidLabelName(String),

    #[error("Label {0:?} has an unquoted value")]
    UnquotedLabelValue(String),

    #[error("Duplicate label: {0:?}")]
    DuplicateLabel(String),

    #[error("Unterminated label set")]
    UnterminatedLabels,

    #[error("Missing sample value")]
    MissingValue,

    #[error("Invalid sample value: {0:?}")]
    InvalidValue(String),

    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Unexpected trailing input: {0:?}")]
    TrailingInput(String),
}
