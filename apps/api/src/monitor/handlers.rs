use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::monitor::HealthReport;
use crate::state::AppState;

/// GET /monitor/health
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.monitor.check_all().await)
}

/// GET /monitor/services
pub async fn handle_services(State(state): State<AppState>) -> Json<Value> {
    let services: Vec<Value> = state
        .monitor
        .targets()
        .iter()
        .map(|t| json!({"key": t.key, "name": t.name, "url": t.url}))
        .collect();
    Json(json!({
        "total": services.len(),
        "services": services,
    }))
}
