//! Wave mobile money checkout adapter

use super::{malformed, send_request, string_field};
use crate::error::PaymentResult;
use crate::payments::signature::{
    verify_hmac_sha256, TimestampedSignature, GENERIC_SIGNATURE_HEADER,
};
use crate::payments::traits::ProviderAdapter;
use crate::payments::types::{
    format_major_amount, parse_major_amount, CanonicalWebhookEvent, PaymentInitiationRequest,
    PaymentSession, Provider, SessionStatus, WebhookEventKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Wave provider configuration
#[derive(Debug, Clone)]
pub struct WaveConfig {
    pub api_key: String,
    pub webhook_secret: String,
    /// Wave API base URL (defaults to https://api.wave.com)
    pub base_url: String,
    pub tolerance_secs: i64,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            webhook_secret: String::new(),
            base_url: "https://api.wave.com".to_string(),
            tolerance_secs: 300,
        }
    }
}

impl WaveConfig {
    /// Read from environment; `None` when Wave is not configured
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("WAVE_API_KEY").ok()?;
        let webhook_secret = std::env::var("WAVE_WEBHOOK_SECRET").ok()?;
        let defaults = Self::default();

        Some(Self {
            api_key,
            webhook_secret,
            base_url: std::env::var("WAVE_BASE_URL").unwrap_or(defaults.base_url),
            tolerance_secs: std::env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tolerance_secs),
        })
    }
}

/// Wave payment provider
pub struct WaveProvider {
    config: WaveConfig,
    client: Client,
}

impl WaveProvider {
    pub fn new(config: WaveConfig, client: Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl ProviderAdapter for WaveProvider {
    fn provider(&self) -> Provider {
        Provider::Wave
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["wave-signature", GENERIC_SIGNATURE_HEADER]
    }

    async fn initiate(
        &self,
        request: &PaymentInitiationRequest,
        order_id: &str,
        _callback_url: &str,
    ) -> PaymentResult<PaymentSession> {
        let currency = request.currency_code();
        info!(
            "Initiating Wave checkout: {} {} order={}",
            request.amount, currency, order_id
        );

        // Wave takes the amount in major units, as a string.
        let payload = json!({
            "amount": format_major_amount(request.amount, &currency),
            "currency": currency,
            "client_reference": order_id,
            "success_url": request.success_url,
            "error_url": request.cancel_url,
        });

        let url = format!("{}/v1/checkout/sessions", self.config.base_url);
        let http = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload);

        let response: WaveCheckoutSession = send_request(Provider::Wave, http).await?;

        info!("Wave checkout created: session={}", response.id);

        Ok(PaymentSession {
            provider: Provider::Wave,
            session_id: response.id,
            order_id: order_id.to_string(),
            redirect_url: response.wave_launch_url,
            expires_at: response
                .when_expires
                .unwrap_or_else(|| Utc::now() + Duration::minutes(30)),
            status: SessionStatus::Pending,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let Some(header) = signature.and_then(TimestampedSignature::parse) else {
            return false;
        };

        if !header.within_tolerance(Utc::now().timestamp(), self.config.tolerance_secs) {
            warn!(
                event_timestamp = header.timestamp,
                "Wave webhook timestamp outside tolerance"
            );
            return false;
        }

        // Wave signs the timestamp immediately followed by the body.
        let timestamp = header.timestamp.to_string();
        header.signatures.iter().any(|candidate| {
            verify_hmac_sha256(
                &self.config.webhook_secret,
                &[timestamp.as_bytes(), payload],
                candidate,
            )
        })
    }

    fn parse_webhook(
        &self,
        payload: &serde_json::Value,
    ) -> PaymentResult<Option<CanonicalWebhookEvent>> {
        let event_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed(Provider::Wave, "missing event type"))?;

        let kind = match event_type {
            "checkout.session.completed" => WebhookEventKind::Completed,
            "checkout.session.payment_failed" => WebhookEventKind::Failed,
            _ => return Ok(None),
        };

        let data = payload
            .get("data")
            .ok_or_else(|| malformed(Provider::Wave, "missing data"))?;
        let order_id = string_field(data, "/client_reference")
            .ok_or_else(|| malformed(Provider::Wave, "missing client_reference"))?;
        let transaction_id = string_field(data, "/transaction_id")
            .or_else(|| string_field(data, "/id"))
            .ok_or_else(|| malformed(Provider::Wave, "missing transaction id"))?;
        let currency = string_field(data, "/currency").map(|c| c.to_ascii_uppercase());

        let amount = match (string_field(data, "/amount"), currency.as_deref()) {
            (Some(raw), Some(code)) => Some(
                parse_major_amount(&raw, code)
                    .ok_or_else(|| malformed(Provider::Wave, "unparseable amount"))?,
            ),
            _ => None,
        };

        Ok(Some(CanonicalWebhookEvent {
            provider: Provider::Wave,
            kind,
            provider_event_type: event_type.to_string(),
            transaction_id,
            order_id,
            session_id: string_field(data, "/id"),
            amount,
            currency,
            raw: payload.clone(),
        }))
    }
}

// Checkout session response
#[derive(Debug, Deserialize)]
struct WaveCheckoutSession {
    id: String,
    wave_launch_url: String,
    #[serde(default)]
    when_expires: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::signature::hmac_sha256;

    const SECRET: &str = "wave_sn_WHS_test";

    fn create_test_provider() -> WaveProvider {
        let config = WaveConfig {
            api_key: "wave_sn_prod_test".to_string(),
            webhook_secret: SECRET.to_string(),
            ..Default::default()
        };
        WaveProvider::new(config, Client::new())
    }

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mac = hmac_sha256(SECRET, &[timestamp.to_string().as_bytes(), payload]);
        format!("t={},v1={}", timestamp, hex::encode(mac))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let provider = create_test_provider();
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(body, Utc::now().timestamp());
        assert!(provider.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let provider = create_test_provider();
        let body = br#"{"type":"checkout.session.completed","amount":"5000"}"#.to_vec();
        let header = sign(&body, Utc::now().timestamp());
        let mut tampered = body.clone();
        let last = tampered.len() - 3;
        tampered[last] = b'9';
        assert!(!provider.verify_signature(&tampered, Some(&header)));
    }

    #[test]
    fn test_stripe_style_separator_rejected() {
        let provider = create_test_provider();
        let body = b"{}";
        let ts = Utc::now().timestamp();
        let mac = hmac_sha256(SECRET, &[ts.to_string().as_bytes(), b".", body]);
        let header = format!("t={},v1={}", ts, hex::encode(mac));
        assert!(!provider.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_missing_header_rejected() {
        let provider = create_test_provider();
        assert!(!provider.verify_signature(b"{}", None));
    }

    #[test]
    fn test_completed_event_parsed() {
        let provider = create_test_provider();
        let payload = json!({
            "id": "EV_1",
            "type": "checkout.session.completed",
            "data": {
                "id": "cos-1",
                "amount": "5000",
                "currency": "XOF",
                "client_reference": "ord_1",
                "payment_status": "succeeded",
                "transaction_id": "TCN_1"
            }
        });
        let event = provider.parse_webhook(&payload).unwrap().unwrap();
        assert_eq!(event.kind, WebhookEventKind::Completed);
        assert_eq!(event.order_id, "ord_1");
        assert_eq!(event.transaction_id, "TCN_1");
        assert_eq!(event.session_id.as_deref(), Some("cos-1"));
        assert_eq!(event.amount, Some(5000));
    }

    #[test]
    fn test_payment_failed_event_parsed() {
        let provider = create_test_provider();
        let payload = json!({
            "type": "checkout.session.payment_failed",
            "data": { "id": "cos-2", "client_reference": "ord_2" }
        });
        let event = provider.parse_webhook(&payload).unwrap().unwrap();
        assert_eq!(event.kind, WebhookEventKind::Failed);
        assert_eq!(event.transaction_id, "cos-2");
        assert_eq!(event.amount, None);
    }

    #[test]
    fn test_merchant_payment_is_unhandled() {
        let provider = create_test_provider();
        let payload = json!({ "type": "merchant.payment_received", "data": {} });
        assert!(provider.parse_webhook(&payload).unwrap().is_none());
    }
}
