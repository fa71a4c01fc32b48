//! Payment provider trait definitions
//!
//! Defines the common interface that all payment provider adapters must implement.

use crate::error::PaymentResult;
use crate::payments::types::{
    CanonicalWebhookEvent, PaymentInitiationRequest, PaymentSession, Provider,
};
use async_trait::async_trait;

/// Trait for payment provider adapters
///
/// Stripe, Wave and the mobile money aggregator implement this trait so the
/// orchestrator can treat them uniformly.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to
    fn provider(&self) -> Provider;

    /// Header names that may carry the webhook signature, most specific first
    fn signature_headers(&self) -> &'static [&'static str];

    /// Create a checkout session with the provider
    ///
    /// Performs a single call and never retries, so a failure can never result
    /// in a second provider-side charge.
    ///
    /// # Arguments
    /// * `request` - Validated initiation request
    /// * `order_id` - Order the session pays for, echoed back in webhooks
    /// * `callback_url` - Webhook URL for providers that accept one per session
    async fn initiate(
        &self,
        request: &PaymentInitiationRequest,
        order_id: &str,
        callback_url: &str,
    ) -> PaymentResult<PaymentSession>;

    /// Validate webhook signature
    ///
    /// Operates on the raw body bytes. Returns `false` for an absent, malformed
    /// or wrong signature and never panics.
    fn verify_signature(&self, payload: &[u8], signature: Option<&str>) -> bool;

    /// Map a verified webhook body to a canonical event
    ///
    /// # Returns
    /// * `Ok(None)` - event type the platform does not act on
    /// * `Err(MalformedWebhook)` - a handled event type is missing required fields
    fn parse_webhook(&self, payload: &serde_json::Value)
        -> PaymentResult<Option<CanonicalWebhookEvent>>;
}
