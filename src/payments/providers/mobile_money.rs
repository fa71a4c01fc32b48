//! Mobile money aggregator adapter
//!
//! The aggregator fronts several operator wallets behind one hosted payment
//! page. Webhooks carry `X-MobileMoney-Signature: base64(hmac-sha256(body))`.

use super::{malformed, send_request, string_field};
use crate::error::PaymentResult;
use crate::payments::signature::{verify_hmac_sha256, GENERIC_SIGNATURE_HEADER};
use crate::payments::traits::ProviderAdapter;
use crate::payments::types::{
    CanonicalWebhookEvent, PaymentInitiationRequest, PaymentSession, Provider, SessionStatus,
    WebhookEventKind,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// Mobile money aggregator configuration
#[derive(Debug, Clone)]
pub struct MobileMoneyConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

impl MobileMoneyConfig {
    /// Read from environment; `None` when the aggregator is not configured
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_key: std::env::var("MOBILE_MONEY_API_KEY").ok()?,
            webhook_secret: std::env::var("MOBILE_MONEY_WEBHOOK_SECRET").ok()?,
            base_url: std::env::var("MOBILE_MONEY_BASE_URL").ok()?,
        })
    }
}

/// Mobile money aggregator provider
pub struct MobileMoneyProvider {
    config: MobileMoneyConfig,
    client: Client,
}

impl MobileMoneyProvider {
    pub fn new(config: MobileMoneyConfig, client: Client) -> Self {
        Self { config, client }
    }
}

fn payment_payload(
    request: &PaymentInitiationRequest,
    order_id: &str,
    callback_url: &str,
) -> serde_json::Value {
    let mut metadata = match &request.metadata {
        Some(serde_json::Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    metadata.insert("order_id".to_string(), json!(order_id));
    metadata.insert("delivery_method".to_string(), json!(request.delivery_method));

    let description = request
        .items
        .iter()
        .map(|item| format!("{} x{}", item.display_name(), item.quantity))
        .collect::<Vec<_>>()
        .join(", ");

    json!({
        "amount": request.amount,
        "currency": request.currency_code(),
        "order_id": order_id,
        "description": description,
        "customer": {
            "name": request.customer.name,
            "email": request.customer.email,
            "phone": request.customer.phone,
        },
        "callback_url": callback_url,
        "return_url": request.success_url,
        "cancel_url": request.cancel_url,
        "metadata": metadata,
    })
}

#[async_trait]
impl ProviderAdapter for MobileMoneyProvider {
    fn provider(&self) -> Provider {
        Provider::MobileMoney
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["x-mobile-money-signature", GENERIC_SIGNATURE_HEADER]
    }

    async fn initiate(
        &self,
        request: &PaymentInitiationRequest,
        order_id: &str,
        callback_url: &str,
    ) -> PaymentResult<PaymentSession> {
        info!(
            "Initiating mobile money payment: {} {} order={}",
            request.amount,
            request.currency_code(),
            order_id
        );

        let url = format!("{}/v1/payments", self.config.base_url);
        let http = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.config.api_key)
            .json(&payment_payload(request, order_id, callback_url));

        let response: MobileMoneyPayment = send_request(Provider::MobileMoney, http).await?;

        info!(
            "Mobile money payment created: payment_id={}",
            response.payment_id
        );

        Ok(PaymentSession {
            provider: Provider::MobileMoney,
            session_id: response.payment_id,
            order_id: order_id.to_string(),
            redirect_url: response.payment_url,
            expires_at: response
                .expires_at
                .unwrap_or_else(|| Utc::now() + Duration::minutes(30)),
            status: SessionStatus::Pending,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let Some(signature) = signature else {
            return false;
        };
        let encoded = signature.trim();
        let encoded = encoded.strip_prefix("sha256=").unwrap_or(encoded);
        let Ok(expected) = BASE64.decode(encoded) else {
            return false;
        };

        verify_hmac_sha256(&self.config.webhook_secret, &[payload], &expected)
    }

    fn parse_webhook(
        &self,
        payload: &serde_json::Value,
    ) -> PaymentResult<Option<CanonicalWebhookEvent>> {
        let event_type = payload
            .get("event_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| malformed(Provider::MobileMoney, "missing event_type"))?;

        let kind = match event_type {
            "checkout.completed" => WebhookEventKind::Completed,
            "checkout.failed" => WebhookEventKind::Failed,
            "checkout.processing" => WebhookEventKind::Processing,
            _ => return Ok(None),
        };

        let order_id = string_field(payload, "/metadata/order_id")
            .ok_or_else(|| malformed(Provider::MobileMoney, "missing metadata.order_id"))?;
        let transaction_id = string_field(payload, "/transaction_id")
            .or_else(|| string_field(payload, "/payment_id"))
            .ok_or_else(|| malformed(Provider::MobileMoney, "missing transaction_id"))?;

        Ok(Some(CanonicalWebhookEvent {
            provider: Provider::MobileMoney,
            kind,
            provider_event_type: event_type.to_string(),
            transaction_id,
            order_id,
            session_id: string_field(payload, "/payment_id"),
            amount: payload.get("amount").and_then(|v| v.as_i64()),
            currency: payload
                .get("currency")
                .and_then(|v| v.as_str())
                .map(|c| c.to_ascii_uppercase()),
            raw: payload.clone(),
        }))
    }
}

// Payment creation response
#[derive(Debug, Deserialize)]
struct MobileMoneyPayment {
    payment_id: String,
    payment_url: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}
