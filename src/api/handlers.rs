use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::alerts::{AlertState, AlertStatus};
use crate::data::{Labels, MetricKey, Sample};
use crate::engine::Engine;
use crate::metrics::CounterSnapshot;
use crate::rules::Rule;
use crate::storage::StoreStats;

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<Engine>,
    pub targets: Vec<String>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub targets: usize,
    pub rules: usize,
    pub firing: usize,
    pub store: StoreStats,
    pub counters: CounterSnapshot,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        targets: state.targets.len(),
        rules: state.engine.rules().len(),
        firing: state.engine.firing_count(),
        store: state.engine.store_stats(),
        counters: state.engine.counters().snapshot(),
    })
}

// ============================================================================
// Alerts & Rules
// ============================================================================

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertInfo>,
}

#[derive(Serialize)]
pub struct AlertInfo {
    pub rule: String,
    pub expr: String,
    #[serde(flatten)]
    pub state: AlertState,
}

impl AlertInfo {
    fn new(rule: &Rule, state: AlertState) -> Self {
        Self {
            rule: rule.name.clone(),
            expr: format!(
                "{} {} {}",
                rule.condition.expr,
                rule.condition.comparator.symbol(),
                rule.condition.threshold
            ),
            state,
        }
    }
}

/// Every configured rule with its current state; rules never evaluated
/// report as inactive.
pub async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    let mut known: HashMap<String, AlertState> = state.engine.alert_states().into_iter().collect();

    let alerts = state
        .engine
        .rules()
        .iter()
        .map(|rule| AlertInfo::new(rule, known.remove(&rule.name).unwrap_or_default()))
        .collect();

    Json(AlertsResponse { alerts })
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<AlertInfo>, ApiError> {
    let rule = state
        .engine
        .rules()
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| ApiError::NotFound(format!("Rule '{}' not found", name)))?;

    let alert_state = state.engine.alert_state(&rule.name).unwrap_or_default();
    Ok(Json(AlertInfo::new(rule, alert_state)))
}

#[derive(Serialize)]
pub struct FiringResponse {
    pub firing: Vec<String>,
}

pub async fn list_firing(State(state): State<Arc<AppState>>) -> Json<FiringResponse> {
    let firing = state
        .engine
        .alert_states()
        .into_iter()
        .filter(|(_, s)| s.status == AlertStatus::Firing)
        .map(|(name, _)| name)
        .collect();

    Json(FiringResponse { firing })
}

#[derive(Serialize)]
pub struct RulesResponse {
    pub rules: Vec<Rule>,
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.engine.rules().to_vec(),
    })
}

// ============================================================================
// Series
// ============================================================================

#[derive(Serialize)]
pub struct SeriesResponse {
    pub series: Vec<MetricKey>,
}

pub async fn list_series(State(state): State<Arc<AppState>>) -> Json<SeriesResponse> {
    Json(SeriesResponse {
        series: state.engine.keys(),
    })
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    pub key: String,
    pub samples: Vec<Sample>,
}

/// Samples for one series; an unknown series yields an empty list
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let start = request.start.unwrap_or(i64::MIN);
    let end = request.end.unwrap_or(i64::MAX);
    if start > end {
        return Err(ApiError::BadRequest(format!(
            "start ({}) is after end ({})",
            start, end
        )));
    }

    let key = MetricKey::new(request.name, request.labels);
    let samples = state.engine.query(&key, start, end).as_slice().to_vec();

    Ok(Json(QueryResponse {
        key: key.to_string(),
        samples,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
