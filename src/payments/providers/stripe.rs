//! Stripe card-network checkout adapter
//!
//! Creates hosted Checkout Sessions and verifies `Stripe-Signature` webhooks
//! (`t=<unix>,v1=<hex hmac-sha256("<t>.<body>")>`).

use super::{malformed, send_request, string_field};
use crate::error::{PaymentError, PaymentResult};
use crate::payments::signature::{
    verify_hmac_sha256, TimestampedSignature, GENERIC_SIGNATURE_HEADER,
};
use crate::payments::traits::ProviderAdapter;
use crate::payments::types::{
    CanonicalWebhookEvent, PaymentInitiationRequest, PaymentSession, Provider, SessionStatus,
    WebhookEventKind,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

/// Stripe refuses checkout sessions expiring sooner than this
const MIN_CHECKOUT_TTL_MINUTES: i64 = 30;

/// Stripe provider configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe API secret key
    pub secret_key: String,
    /// Signing secret of the webhook endpoint (`whsec_...`)
    pub webhook_secret: String,
    /// Stripe API base URL (defaults to https://api.stripe.com)
    pub base_url: String,
    /// Accepted clock skew for signed webhook timestamps
    pub tolerance_secs: i64,
    /// Lifetime of a checkout session
    pub checkout_ttl_minutes: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            base_url: "https://api.stripe.com".to_string(),
            tolerance_secs: 300,
            checkout_ttl_minutes: 60,
        }
    }
}

impl StripeConfig {
    /// Read from environment; `None` when Stripe is not configured
    pub fn from_env() -> Option<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY").ok()?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").ok()?;
        let defaults = Self::default();

        Some(Self {
            secret_key,
            webhook_secret,
            base_url: std::env::var("STRIPE_BASE_URL").unwrap_or(defaults.base_url),
            tolerance_secs: std::env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.tolerance_secs),
            checkout_ttl_minutes: std::env::var("CHECKOUT_TTL_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.checkout_ttl_minutes),
        })
    }
}

/// Stripe payment provider
pub struct StripeProvider {
    config: StripeConfig,
    client: Client,
}

impl StripeProvider {
    pub fn new(config: StripeConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn checkout_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(self.config.checkout_ttl_minutes.max(MIN_CHECKOUT_TTL_MINUTES))
    }
}

/// Form fields for `POST /v1/checkout/sessions`
fn checkout_form(
    request: &PaymentInitiationRequest,
    order_id: &str,
    expires_at: DateTime<Utc>,
) -> Vec<(String, String)> {
    let currency = request.currency_code().to_ascii_lowercase();
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer_email".to_string(), request.customer.email.clone()),
        ("client_reference_id".to_string(), order_id.to_string()),
        ("expires_at".to_string(), expires_at.timestamp().to_string()),
    ];

    for (i, item) in request.items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        form.push((format!("{}[price_data][currency]", prefix), currency.clone()));
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.to_string(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.display_name().to_string(),
        ));
        form.push((
            format!("{}[price_data][product_data][metadata][product_id]", prefix),
            item.product_id.clone(),
        ));
    }

    if let Some(serde_json::Value::Object(extra)) = &request.metadata {
        for (key, value) in extra {
            if key == "order_id" {
                continue;
            }
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            form.push((format!("metadata[{}]", key), value));
        }
    }
    form.push(("metadata[order_id]".to_string(), order_id.to_string()));
    form.push((
        "metadata[delivery_method]".to_string(),
        request.delivery_method.clone(),
    ));

    form
}

#[async_trait]
impl ProviderAdapter for StripeProvider {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["stripe-signature", GENERIC_SIGNATURE_HEADER]
    }

    async fn initiate(
        &self,
        request: &PaymentInitiationRequest,
        order_id: &str,
        _callback_url: &str,
    ) -> PaymentResult<PaymentSession> {
        info!(
            "Initiating Stripe checkout: {} {} order={}",
            request.amount,
            request.currency_code(),
            order_id
        );

        let form = checkout_form(request, order_id, self.checkout_expiry(Utc::now()));
        let url = format!("{}/v1/checkout/sessions", self.config.base_url);
        let http = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&form);

        let response: StripeCheckoutSession = send_request(Provider::Stripe, http).await?;

        let redirect_url = response.url.ok_or_else(|| PaymentError::ProviderUnavailable {
            provider: Provider::Stripe,
            message: "checkout session has no redirect url".to_string(),
        })?;
        let expires_at = Utc
            .timestamp_opt(response.expires_at, 0)
            .single()
            .unwrap_or_else(|| self.checkout_expiry(Utc::now()));

        info!("Stripe checkout created: session={}", response.id);

        Ok(PaymentSession {
            provider: Provider::Stripe,
            session_id: response.id,
            order_id: order_id.to_string(),
            redirect_url,
            expires_at,
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
                "Stripe webhook timestamp outside tolerance"
            );
            return false;
        }

        let timestamp = header.timestamp.to_string();
        header.signatures.iter().any(|candidate| {
            verify_hmac_sha256(
                &self.config.webhook_secret,
                &[timestamp.as_bytes(), b".", payload],
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
            .ok_or_else(|| malformed(Provider::Stripe, "missing event type"))?;

        let object = payload
            .pointer("/data/object")
            .ok_or_else(|| malformed(Provider::Stripe, "missing data.object"))?;

        let kind = match event_type {
            "checkout.session.completed" => {
                match object.get("payment_status").and_then(|v| v.as_str()) {
                    Some("paid") | Some("no_payment_required") => WebhookEventKind::Completed,
                    // Delayed methods settle later via async_payment_* events.
                    _ => WebhookEventKind::Processing,
                }
            }
            "checkout.session.async_payment_succeeded" => WebhookEventKind::Completed,
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                WebhookEventKind::Failed
            }
            _ => return Ok(None),
        };

        let order_id = string_field(object, "/metadata/order_id")
            .or_else(|| string_field(object, "/client_reference_id"))
            .ok_or_else(|| malformed(Provider::Stripe, "missing order reference"))?;
        let transaction_id = string_field(object, "/payment_intent")
            .or_else(|| string_field(object, "/id"))
            .ok_or_else(|| malformed(Provider::Stripe, "missing session id"))?;

        Ok(Some(CanonicalWebhookEvent {
            provider: Provider::Stripe,
            kind,
            provider_event_type: event_type.to_string(),
            transaction_id,
            order_id,
            session_id: string_field(object, "/id"),
            amount: object.get("amount_total").and_then(|v| v.as_i64()),
            currency: object
                .get("currency")
                .and_then(|v| v.as_str())
                .map(|c| c.to_ascii_uppercase()),
            raw: payload.clone(),
        }))
    }
}

// Checkout session response
#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    expires_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::signature::hmac_sha256;
    use crate::payments::types::{Customer, LineItem};
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn create_test_provider() -> StripeProvider {
        let config = StripeConfig {
            secret_key: "sk_test_key".to_string(),
            webhook_secret: SECRET.to_string(),
            ..Default::default()
        };
        StripeProvider::new(config, Client::new())
    }

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mac = hmac_sha256(SECRET, &[timestamp.to_string().as_bytes(), b".", payload]);
        format!("t={},v1={}", timestamp, hex::encode(mac))
    }

    fn completed_event() -> serde_json::Value {
        json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_1",
                "payment_status": "paid",
                "amount_total": 5000,
                "currency": "xof",
                "client_reference_id": "ord_fallback",
                "metadata": { "order_id": "ord_1" }
            }}
        })
    }

    #[test]
    fn test_valid_signature_accepted() {
        let provider = create_test_provider();
        let body = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let header = sign(body, Utc::now().timestamp());
        assert!(provider.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let provider = create_test_provider();
        let body = br#"{"id":"evt_1","amount_total":5000}"#.to_vec();
        let header = sign(&body, Utc::now().timestamp());
        let mut tampered = body.clone();
        tampered[10] ^= 0x01;
        assert!(!provider.verify_signature(&tampered, Some(&header)));
    }

    #[test]
    fn test_missing_or_malformed_header_rejected() {
        let provider = create_test_provider();
        let body = b"{}";
        assert!(!provider.verify_signature(body, None));
        assert!(!provider.verify_signature(body, Some("garbage")));
        assert!(!provider.verify_signature(body, Some("t=123,v1=zz")));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let provider = create_test_provider();
        let body = b"{}";
        let header = sign(body, Utc::now().timestamp() - 3600);
        assert!(!provider.verify_signature(body, Some(&header)));
    }

    #[test]
    fn test_completed_session_maps_to_completed() {
        let provider = create_test_provider();
        let event = provider.parse_webhook(&completed_event()).unwrap().unwrap();
        assert_eq!(event.kind, WebhookEventKind::Completed);
        assert_eq!(event.order_id, "ord_1");
        assert_eq!(event.transaction_id, "pi_1");
        assert_eq!(event.session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(event.amount, Some(5000));
        assert_eq!(event.currency.as_deref(), Some("XOF"));
    }

    #[test]
    fn test_unpaid_completion_is_processing() {
        let provider = create_test_provider();
        let mut payload = completed_event();
        payload["data"]["object"]["payment_status"] = json!("unpaid");
        let event = provider.parse_webhook(&payload).unwrap().unwrap();
        assert_eq!(event.kind, WebhookEventKind::Processing);
    }

    #[test]
    fn test_expired_session_maps_to_failed() {
        let provider = create_test_provider();
        let mut payload = completed_event();
        payload["type"] = json!("checkout.session.expired");
        let event = provider.parse_webhook(&payload).unwrap().unwrap();
        assert_eq!(event.kind, WebhookEventKind::Failed);
    }

    #[test]
    fn test_irrelevant_event_is_unhandled() {
        let provider = create_test_provider();
        let payload = json!({ "type": "customer.created", "data": { "object": {} } });
        assert!(provider.parse_webhook(&payload).unwrap().is_none());
    }

    #[test]
    fn test_missing_order_reference_is_malformed() {
        let provider = create_test_provider();
        let payload = json!({
            "type": "checkout.session.async_payment_failed",
            "data": { "object": { "id": "cs_1" } }
        });
        assert!(provider.parse_webhook(&payload).is_err());
    }

    #[test]
    fn test_checkout_form_fields() {
        let request = PaymentInitiationRequest {
            provider: Provider::Stripe,
            amount: 4000,
            currency: "eur".to_string(),
            customer: Customer {
                name: "Jo".to_string(),
                email: "jo@example.com".to_string(),
                phone: None,
            },
            items: vec![LineItem {
                product_id: "badge".to_string(),
                name: None,
                unit_amount: 2000,
                quantity: 2,
            }],
            delivery_method: "pickup".to_string(),
            success_url: "https://shop.example.com/ok".to_string(),
            cancel_url: "https://shop.example.com/cancel".to_string(),
            metadata: Some(json!({ "tenant": "acme", "order_id": "spoofed" })),
            order_id: None,
        };
        let expires_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let form = checkout_form(&request, "ord_9", expires_at);
        let get = |k: &str| {
            form.iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("client_reference_id"), Some("ord_9"));
        assert_eq!(get("metadata[order_id]"), Some("ord_9"));
        assert_eq!(get("metadata[tenant]"), Some("acme"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("eur"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("2000"));
        assert_eq!(get("line_items[0][price_data][product_data][name]"), Some("badge"));
        assert_eq!(get("expires_at"), Some("1700000000"));
        assert_eq!(form.iter().filter(|(k, _)| k == "metadata[order_id]").count(), 1);
    }

    #[test]
    fn test_checkout_expiry_has_floor() {
        let provider = StripeProvider::new(
            StripeConfig {
                checkout_ttl_minutes: 5,
                ..Default::default()
            },
            Client::new(),
        );
        let now = Utc::now();
        assert_eq!(provider.checkout_expiry(now), now + Duration::minutes(30));
    }
}
