//! Periodic target scraping

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::stream::{self, StreamExt};

use super::exposition::parse_exposition;
use super::source::{ExpositionSource, ScrapeError};
use crate::data::{MetricKey, Sample};
use crate::engine::Engine;

/// Label added to every scraped series to tell targets apart
pub const INSTANCE_LABEL: &str = "instance";

pub const UP_METRIC: &str = "up";
pub const SAMPLES_SCRAPED_METRIC: &str = "scrape_samples_scraped";
pub const SCRAPE_ERRORS_METRIC: &str = "scrape_errors_total";

/// Outcome of scraping a single target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub success: bool,
    pub samples: usize,
    pub appended: usize,
    pub out_of_order: usize,
    pub malformed: usize,
}

/// Totals for one scrape tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub appended: usize,
    pub out_of_order: usize,
    pub malformed: usize,
}

impl ScrapeSummary {
    fn add(&mut self, report: &TargetReport) {
        self.targets += 1;
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.appended += report.appended;
        self.out_of_order += report.out_of_order;
        self.malformed += report.malformed;
    }
}

/// Scrapes a fixed list of targets into an [`Engine`]
pub struct Scraper {
    source: Arc<dyn ExpositionSource>,
    targets: Vec<String>,
    timeout: Duration,
    max_concurrency: usize,
    /// Cumulative fetch failures per target
    error_totals: DashMap<String, u64>,
}

impl Scraper {
    pub fn new(
        source: Arc<dyn ExpositionSource>,
        targets: Vec<String>,
        timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        Self {
            source,
            targets,
            timeout,
            max_concurrency,
            error_totals: DashMap::new(),
        }
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Number of failed fetches recorded for `target`
    pub fn error_total(&self, target: &str) -> u64 {
        self.error_totals.get(target).map(|v| *v).unwrap_or(0)
    }

    /// Scrape every target once, stamping samples with `now` unless the
    /// exposition carries its own timestamps.
    ///
    /// Targets are fetched concurrently. A slow or failing target only
    /// affects its own report.
    pub async fn scrape_once(&self, engine: &Engine, now: i64) -> ScrapeSummary {
        let limit = self.targets.len().min(self.max_concurrency).max(1);

        let reports: Vec<TargetReport> = stream::iter(self.targets.iter().cloned())
            .map(|target| async move { self.scrape_target(engine, &target, now).await })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut summary = ScrapeSummary::default();
        for report in &reports {
            summary.add(report);
        }

        tracing::debug!(
            targets = summary.targets,
            failed = summary.failed,
            appended = summary.appended,
            "Scrape tick complete"
        );

        summary
    }

    async fn scrape_target(&self, engine: &Engine, target: &str, now: i64) -> TargetReport {
        let counters = engine.counters();
        counters.incr_scrapes();
        let started = Instant::now();

        let fetched = match tokio::time::timeout(self.timeout, self.source.fetch(target)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::Timeout {
                target: target.to_string(),
                after: self.timeout,
            }),
        };

        let mut report = TargetReport {
            target: target.to_string(),
            success: false,
            samples: 0,
            appended: 0,
            out_of_order: 0,
            malformed: 0,
        };

        let mut batch: Vec<(MetricKey, Sample)> = Vec::new();

        match fetched {
            Ok(body) => {
                let exposition = parse_exposition(&body);
                report.success = true;
                report.samples = exposition.samples.len();
                report.malformed = exposition.malformed_count();

                if report.malformed > 0 {
                    counters.add_malformed_lines(report.malformed as u64);
                    for (line, error) in &exposition.errors {
                        tracing::debug!(instance = %target, line, error = %error, "Skipped malformed line");
                    }
                }

                batch.reserve(exposition.samples.len() + 3);
                for parsed in exposition.samples {
                    let key = if parsed.key.label(INSTANCE_LABEL).is_some() {
                        parsed.key
                    } else {
                        parsed.key.with_label(INSTANCE_LABEL, target)
                    };
                    batch.push((key, Sample::new(parsed.timestamp.unwrap_or(now), parsed.value)));
                }
            }
            Err(e) => {
                counters.incr_scrape_failures();
                *self.error_totals.entry(target.to_string()).or_insert(0) += 1;
                tracing::warn!(instance = %target, error = %e, "Scrape failed");
            }
        }

        let instance = [(INSTANCE_LABEL, target)];
        batch.push((
            MetricKey::with_labels(UP_METRIC, instance),
            Sample::new(now, if report.success { 1.0 } else { 0.0 }),
        ));
        batch.push((
            MetricKey::with_labels(SAMPLES_SCRAPED_METRIC, instance),
            Sample::new(now, report.samples as f64),
        ));
        batch.push((
            MetricKey::with_labels(SCRAPE_ERRORS_METRIC, instance),
            Sample::new(now, self.error_total(target) as f64),
        ));

        let outcome = engine.append_batch(batch);
        report.appended = outcome.appended;
        report.out_of_order = outcome.out_of_order;

        tracing::trace!(
            instance = %target,
            elapsed_ms = started.elapsed().as_millis() as u64,
            appended = report.appended,
            "Scraped target"
        );

        report
    }
}
