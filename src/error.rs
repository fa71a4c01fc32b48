//! Error taxonomy for payment initiation and webhook handling

use crate::database::error::DatabaseError;
use crate::payments::state::PaymentStatus;
use crate::payments::types::Provider;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

/// A single offending request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Caller-supplied request is malformed
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// Network failure, timeout or 5xx from the provider
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable { provider: Provider, message: String },

    /// The provider rejected the request (4xx)
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: Provider, message: String },

    /// Webhook signature missing or not produced with the configured secret
    #[error("invalid signature")]
    SignatureInvalid,

    #[error("malformed {provider} webhook: {message}")]
    MalformedWebhook { provider: Provider, message: String },

    #[error("order {order_id} is {current}, ignoring {attempted}")]
    StaleTransition {
        order_id: String,
        current: PaymentStatus,
        attempted: PaymentStatus,
    },

    #[error("order {order_id} is already paid")]
    AlreadyPaid { order_id: String },

    #[error("unsupported payment provider: {0}")]
    UnsupportedProvider(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ProviderUnavailable { .. } => true,
            PaymentError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_)
            | PaymentError::SignatureInvalid
            | PaymentError::MalformedWebhook { .. }
            | PaymentError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            PaymentError::AlreadyPaid { .. } | PaymentError::StaleTransition { .. } => {
                StatusCode::CONFLICT
            }
            PaymentError::ProviderUnavailable { .. }
            | PaymentError::InvalidRequest { .. }
            | PaymentError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to an HTTP caller
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::ProviderUnavailable { .. } | PaymentError::InvalidRequest { .. } => {
                "payment provider error".to_string()
            }
            PaymentError::Database(_) => "internal error".to_string(),
            PaymentError::MalformedWebhook { .. } => "invalid webhook".to_string(),
            PaymentError::Validation(_) => "validation_failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            PaymentError::Validation(fields) => json!({
                "success": false,
                "error": "validation_failed",
                "fields": fields,
            }),
            other => json!({
                "success": false,
                "error": other.public_message(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::DatabaseErrorKind;

    #[test]
    fn test_provider_errors_are_redacted() {
        let err = PaymentError::InvalidRequest {
            provider: Provider::Stripe,
            message: "No such price: price_123 (sk_live_abc)".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "payment provider error");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_summary() {
        let err = PaymentError::Validation(vec![
            FieldError::new("amount", "must be greater than zero"),
            FieldError::new("items", "must contain at least one item"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: amount must be greater than zero, items must contain at least one item"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_bad_signature_is_client_error() {
        let err = PaymentError::SignatureInvalid;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "invalid signature");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryability_follows_database_error() {
        let err: PaymentError = DatabaseError::new(DatabaseErrorKind::PoolExhausted).into();
        assert!(err.is_retryable());
        assert!(PaymentError::ProviderUnavailable {
            provider: Provider::Wave,
            message: "timeout".to_string(),
        }
        .is_retryable());
    }
}
