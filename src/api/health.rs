use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::database;
use crate::AppState;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    /// `connected`, `unavailable` or `in_memory`
    pub database: String,
    pub providers: Vec<String>,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let database = match &state.db_pool {
        Some(pool) => match database::health_check(pool).await {
            Ok(()) => "connected",
            Err(_) => "unavailable",
        },
        None => "in_memory",
    };
    let healthy = database != "unavailable";

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version,
        environment: state.environment.clone(),
        database: database.to_string(),
        providers: state
            .orchestrator
            .providers()
            .iter()
            .map(|p| p.to_string())
            .collect(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}
