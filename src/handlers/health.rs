//! Liveness and status endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub storage: HealthStatus,
    pub version: String,
    pub uptime_seconds: i64,
    pub timestamp: DateTime<Utc>,
}

/// Pings the store; the in-memory backend is always up.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match &state.db {
        Some(db) => match crate::db::check_connection(db).await {
            Ok(()) => HealthStatus::Up,
            Err(_) => HealthStatus::Down,
        },
        None => HealthStatus::Up,
    };
    let now = Utc::now();
    let info = HealthInfo {
        status: storage,
        storage,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (now - state.started_at).num_seconds(),
        timestamp: now,
    };
    let status_code = match storage {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(info))
}

/// Returns build and version information
pub async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "environment": state.config.environment,
        "storage_backend": state.config.storage_backend,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
