//! Webhook entry point shared by every provider
//!
//! Signatures are verified on the raw body before anything is parsed or any
//! order is touched. Only processing failures are answered with a 5xx, so the
//! provider retries those and nothing else.

use crate::error::PaymentError;
use crate::payments::audit::{AuditEntry, AuditSource};
use crate::payments::orchestrator::PaymentOrchestrator;
use crate::payments::signature::extract_signature;
use crate::payments::types::{Provider, ProviderEvent};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Best-effort event type of a payload the adapter did not map
fn event_type_of(payload: &Value) -> String {
    ["/type", "/event_type", "/event"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .unwrap_or("unknown")
        .to_string()
}

fn acknowledged() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "received": true })))
}

/// Verify, parse and apply one provider callback
pub async fn receive_webhook(
    orchestrator: &PaymentOrchestrator,
    provider: Provider,
    headers: &HeaderMap,
    body: &[u8],
) -> (StatusCode, Json<Value>) {
    let adapter = match orchestrator.adapter(provider) {
        Ok(adapter) => adapter,
        Err(_) => {
            warn!(provider = %provider, "Webhook for unconfigured provider");
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "unknown provider" })),
            );
        }
    };

    let header_names = adapter.signature_headers();
    let signature = extract_signature(headers, header_names);

    if !adapter.verify_signature(body, signature) {
        let err = PaymentError::SignatureInvalid;
        warn!(provider = %provider, error = %err, "Rejected webhook");
        let presence: Map<String, Value> = header_names
            .iter()
            .map(|name| (name.to_string(), Value::Bool(headers.contains_key(*name))))
            .collect();
        orchestrator
            .audit()
            .record(
                AuditEntry::new(provider, "webhook.invalid_signature", AuditSource::Webhook)
                    .payload(json!({ "headers": presence, "body_length": body.len() })),
            )
            .await;
        return (err.status_code(), Json(json!({ "error": err.public_message() })));
    }

    let payload: Value = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(provider = %provider, error = %e, "Signed webhook body is not JSON");
            orchestrator
                .audit()
                .record(
                    AuditEntry::new(provider, "webhook.malformed", AuditSource::Webhook)
                        .payload(json!({ "error": e.to_string() })),
                )
                .await;
            return acknowledged();
        }
    };

    let event = match adapter.parse_webhook(&payload) {
        Ok(Some(event)) => ProviderEvent::Canonical(event),
        Ok(None) => ProviderEvent::Unhandled {
            provider,
            event_type: event_type_of(&payload),
            payload,
        },
        Err(e) => {
            warn!(provider = %provider, error = %e, "Malformed webhook event");
            orchestrator
                .audit()
                .record(
                    AuditEntry::new(provider, "webhook.malformed", AuditSource::Webhook)
                        .payload(json!({ "error": e.to_string(), "raw": payload })),
                )
                .await;
            return acknowledged();
        }
    };

    match orchestrator.handle_webhook(event).await {
        Ok(outcome) => {
            info!(provider = %provider, outcome = ?outcome, "Webhook processed");
            acknowledged()
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "processing failed" })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_lookup() {
        assert_eq!(event_type_of(&json!({ "type": "charge.refunded" })), "charge.refunded");
        assert_eq!(
            event_type_of(&json!({ "event_type": "checkout.expired" })),
            "checkout.expired"
        );
        assert_eq!(event_type_of(&json!({ "data": {} })), "unknown");
    }
}
