use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{FieldError, PaymentError};
use crate::payments::types::PaymentInitiationRequest;
use crate::AppState;

/// `POST /api/payments/initiate`
pub async fn initiate_payment(
    State(state): State<AppState>,
    payload: Result<Json<PaymentInitiationRequest>, JsonRejection>,
) -> Result<Json<Value>, PaymentError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Unreadable payment initiation request");
        PaymentError::Validation(vec![FieldError::new("body", rejection.body_text())])
    })?;

    let session = state.orchestrator.initiate(request).await?;

    Ok(Json(json!({
        "success": true,
        "provider": session.provider,
        "session_id": session.session_id,
        "order_id": session.order_id,
        "redirect_url": session.redirect_url,
        "expires_at": session.expires_at,
        "status": session.status,
    })))
}
