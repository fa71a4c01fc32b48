//! Payment provider implementations
//!
//! Concrete implementations of the ProviderAdapter trait for each provider,
//! plus the request plumbing they share.

pub mod mobile_money;
pub mod stripe;
pub mod wave;

pub use mobile_money::{MobileMoneyConfig, MobileMoneyProvider};
pub use stripe::{StripeConfig, StripeProvider};
pub use wave::{WaveConfig, WaveProvider};

use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::Provider;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{error, warn};

const MAX_LOGGED_BODY: usize = 512;

/// Send a provider API request exactly once and decode the JSON response
///
/// Transport failures, timeouts, 429 and 5xx map to `ProviderUnavailable`;
/// any other non-success status maps to `InvalidRequest`.
pub(crate) async fn send_request<T>(provider: Provider, request: RequestBuilder) -> PaymentResult<T>
where
    T: DeserializeOwned,
{
    let response = request.send().await.map_err(|e| {
        let message = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            format!("request failed: {}", e)
        };
        error!(provider = %provider, error = %e, "Provider request failed");
        PaymentError::ProviderUnavailable { provider, message }
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        error!(provider = %provider, error = %e, "Failed to read provider response");
        PaymentError::ProviderUnavailable {
            provider,
            message: format!("failed to read response: {}", e),
        }
    })?;

    if status.is_success() {
        return serde_json::from_str::<T>(&body).map_err(|e| {
            error!(provider = %provider, error = %e, "Failed to parse provider response");
            PaymentError::ProviderUnavailable {
                provider,
                message: format!("invalid response format: {}", e),
            }
        });
    }

    let detail = provider_error_message(&body)
        .unwrap_or_else(|| truncate(&body, MAX_LOGGED_BODY).to_string());

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(provider = %provider, %status, "Provider unavailable");
        Err(PaymentError::ProviderUnavailable {
            provider,
            message: format!("HTTP {}: {}", status, detail),
        })
    } else {
        warn!(provider = %provider, %status, detail = %detail, "Provider rejected request");
        Err(PaymentError::InvalidRequest {
            provider,
            message: format!("HTTP {}: {}", status, detail),
        })
    }
}

/// Pull a human-readable message out of a provider error body
fn provider_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.get("message"),
        value.get("error"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string));
    message
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Read a string field, accepting numbers as well
pub(crate) fn string_field(value: &serde_json::Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn malformed(provider: Provider, message: impl Into<String>) -> PaymentError {
    PaymentError::MalformedWebhook {
        provider,
        message: message.into(),
    }
}
