//! Notification delivery for alerts

use std::collections::{BTreeMap, HashMap};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::data::Labels;
use crate::metrics::Counters;
use crate::rules::Rule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyState {
    Firing,
    Resolved,
}

impl NotifyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyState::Firing => "firing",
            NotifyState::Resolved => "resolved",
        }
    }
}

/// A firing or resolved alert, as handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub alert_name: String,
    pub state: NotifyState,
    /// Rule labels plus `alertname`
    pub labels: Labels,
    pub annotations: BTreeMap<String, String>,
    /// Expression value at the transition; `None` if it had no data
    pub value: Option<f64>,
    /// Epoch millis of the evaluation that caused the transition
    pub timestamp: i64,
}

impl Notification {
    pub fn for_rule(rule: &Rule, state: NotifyState, value: Option<f64>, timestamp: i64) -> Self {
        let mut labels = rule.labels.clone();
        labels.insert("alertname".to_string(), rule.name.clone());

        Self {
            alert_name: rule.name.clone(),
            state,
            labels,
            annotations: rule.annotations.clone(),
            value,
            timestamp,
        }
    }
}

/// Receiver of alert notifications.
///
/// Delivery is fire-and-forget from the engine's point of view: failures are
/// logged and counted, never retried. Retrying is up to the sink.
pub trait NotificationSink: Send + Sync {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifierError>>;
}

/// Deliver one notification, logging and counting the outcome
pub async fn deliver(sink: &dyn NotificationSink, notification: &Notification, counters: &Counters) {
    match sink.notify(notification).await {
        Ok(()) => counters.incr_notifications_sent(),
        Err(e) => {
            counters.incr_notification_failures();
            tracing::error!(
                alert = %notification.alert_name,
                state = notification.state.as_str(),
                error = %e,
                "Failed to send notification"
            );
        }
    }
}

/// Notification target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Sink that fans a notification out to a list of targets
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    pub fn new(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    async fn notify_all(&self, notification: &Notification) -> Result<(), NotifierError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(notification, target).await {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NotifierError::Multiple(errors)),
        }
    }

    async fn notify_target(
        &self,
        notification: &Notification,
        target: &NotifyTarget,
    ) -> Result<(), NotifierError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    alert = %notification.alert_name,
                    state = notification.state.as_str(),
                    labels = ?notification.labels,
                    value = ?notification.value,
                    "Alert {}",
                    notification.state.as_str()
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => {
                self.send_webhook(notification, url, headers).await
            }
        }
    }

    async fn send_webhook(
        &self,
        notification: &Notification,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "alert_name": notification.alert_name,
            "state": notification.state,
            "labels": notification.labels,
            "annotations": notification.annotations,
            "value": notification.value,
            "timestamp": notification.timestamp,
        });

        let mut request = self.client.post(url).json(&payload);
        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            alert = %notification.alert_name,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(vec![NotifyTarget::Log])
    }
}

impl NotificationSink for Notifier {
    fn notify<'a>(&'a self, notification: &'a Notification) -> BoxFuture<'a, Result<(), NotifierError>> {
        Box::pin(self.notify_all(notification))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}
