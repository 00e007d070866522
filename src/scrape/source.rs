//! Where expositions come from

use std::time::Duration;

use futures::future::BoxFuture;

/// Fetches the raw exposition body for a target
pub trait ExpositionSource: Send + Sync {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<String, ScrapeError>>;
}

/// Fetches expositions over HTTP
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// The client timeout is a backstop; the scraper applies its own
    /// per-target timeout around every fetch.
    pub fn new(timeout: Duration) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("periscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ScrapeError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl ExpositionSource for HttpSource {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<String, ScrapeError>> {
        Box::pin(async move {
            let url = target_url(target);

            let response = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "text/plain")
                .send()
                .await
                .map_err(|e| ScrapeError::Unreachable {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(ScrapeError::Status {
                    target: target.to_string(),
                    status: response.status().as_u16(),
                });
            }

            response.text().await.map_err(|e| ScrapeError::Unreachable {
                target: target.to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// `host:port` targets are scraped at `http://host:port/metrics`; anything
/// with a scheme is used as given.
pub fn target_url(target: &str) -> String {
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("http://{}/metrics", target.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    #[error("Target {target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("Target {target} returned status {status}")]
    Status { target: String, status: u16 },

    #[error("Target {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("HTTP client error: {0}")]
    Client(String),
}
