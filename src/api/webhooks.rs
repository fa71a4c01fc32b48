use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::payments::types::Provider;
use crate::payments::webhook::receive_webhook;
use crate::AppState;

/// `POST /api/webhooks/:provider`
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let Ok(provider) = provider.parse::<Provider>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown provider" })),
        );
    };

    receive_webhook(&state.orchestrator, provider, &headers, &body).await
}
