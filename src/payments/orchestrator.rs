//! Payment Orchestrator
//!
//! Routes checkout requests to the selected provider adapter and reconciles
//! order payment state from verified provider webhooks. Webhook delivery is
//! at-least-once, so every state change goes through a conditional write and
//! replays resolve to [`WebhookOutcome::Duplicate`].

use crate::database::repository::{NewAttempt, OrderPayment, OrderStore};
use crate::error::{PaymentError, PaymentResult};
use crate::payments::audit::{AuditEntry, AuditLogWriter, AuditSource};
use crate::payments::notifications::{NotificationDispatcher, PaymentNotice};
use crate::payments::state::{classify_rejection, PaymentStatus, Rejection};
use crate::payments::traits::ProviderAdapter;
use crate::payments::types::{
    CanonicalWebhookEvent, PaymentInitiationRequest, PaymentSession, Provider, ProviderEvent,
    WebhookEventKind,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How a webhook was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "status")]
pub enum WebhookOutcome {
    /// The order moved into the given state
    Applied(PaymentStatus),
    /// Replayed delivery; the order already reflects it
    Duplicate,
    /// Conflicting signal for an order that has moved on
    Stale,
    /// Event for an earlier attempt than the one recorded on the order
    Superseded,
    /// Event type the platform does not act on
    Ignored,
    /// No order matches the event
    OrderNotFound,
    /// Amount or currency disagrees with the order
    Rejected,
}

fn payment_event_suffix(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "payment.pending",
        PaymentStatus::Processing => "payment.processing",
        PaymentStatus::Paid => "payment.succeeded",
        PaymentStatus::Failed => "payment.failed",
    }
}

pub struct PaymentOrchestrator {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
    store: Arc<dyn OrderStore>,
    audit: AuditLogWriter,
    notifier: Arc<dyn NotificationDispatcher>,
    public_origin: String,
}

impl PaymentOrchestrator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        audit: AuditLogWriter,
        notifier: Arc<dyn NotificationDispatcher>,
        public_origin: impl Into<String>,
    ) -> Self {
        let public_origin = public_origin.into().trim_end_matches('/').to_string();
        Self {
            adapters: HashMap::new(),
            store,
            audit,
            notifier,
            public_origin,
        }
    }

    /// Register an adapter, replacing any previous one for the same provider
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        info!(provider = %adapter.provider(), "Registered payment provider");
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn adapter(&self, provider: Provider) -> PaymentResult<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| PaymentError::UnsupportedProvider(provider.to_string()))
    }

    /// Providers with a registered adapter, in a stable order
    pub fn providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }

    pub fn audit(&self) -> &AuditLogWriter {
        &self.audit
    }

    /// Webhook URL a provider should call back for this deployment
    pub fn callback_url(&self, provider: Provider) -> String {
        format!("{}/api/webhooks/{}", self.public_origin, provider.as_str())
    }

    /// Start a checkout with the requested provider
    pub async fn initiate(
        &self,
        request: PaymentInitiationRequest,
    ) -> PaymentResult<PaymentSession> {
        request.validate()?;

        let provider = request.provider;
        let adapter = self.adapter(provider)?;

        let order_id = request
            .order_id
            .as_deref()
            .map(|id| id.trim().to_string())
            .unwrap_or_else(|| format!("ord_{}", Uuid::new_v4().simple()));

        let attempt = NewAttempt {
            order_id: order_id.clone(),
            provider,
            amount: request.amount,
            currency: request.currency_code(),
            customer_email: request.customer.email.trim().to_string(),
            customer_phone: request.customer.phone.clone(),
        };

        match self.store.begin_attempt(&attempt).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(order_id = %order_id, provider = %provider, "Initiation refused, order already paid");
                self.audit
                    .record(
                        AuditEntry::new(provider, "initiation.error", AuditSource::Api)
                            .order(&order_id)
                            .payload(json!({ "error": "order already paid" })),
                    )
                    .await;
                return Err(PaymentError::AlreadyPaid { order_id });
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Failed to record payment attempt");
                self.audit
                    .record(
                        AuditEntry::new(provider, "initiation.error", AuditSource::Api)
                            .order(&order_id)
                            .payload(json!({ "error": e.to_string() })),
                    )
                    .await;
                return Err(e.into());
            }
        }

        let callback_url = self.callback_url(provider);
        let session = match adapter.initiate(&request, &order_id, &callback_url).await {
            Ok(session) => session,
            Err(e) => {
                error!(
                    order_id = %order_id,
                    provider = %provider,
                    error = %e,
                    "Payment initiation failed"
                );
                self.audit
                    .record(
                        AuditEntry::new(provider, "initiation.error", AuditSource::Api)
                            .order(&order_id)
                            .payload(json!({
                                "error": e.to_string(),
                                "detail": format!("{:?}", e),
                                "amount": request.amount,
                                "currency": request.currency_code(),
                            })),
                    )
                    .await;
                return Err(e);
            }
        };

        let attached = self
            .store
            .attach_session(&order_id, provider, &session.session_id)
            .await;
        if !matches!(attached, Ok(true)) {
            let reason = match attached {
                Err(e) => e.to_string(),
                _ => "order no longer accepts a session".to_string(),
            };
            warn!(
                order_id = %order_id,
                session_id = %session.session_id,
                reason = %reason,
                "Could not attach provider session to order"
            );
            self.audit
                .record(
                    AuditEntry::new(provider, "session.record_error", AuditSource::System)
                        .order(&order_id)
                        .payment(&session.session_id)
                        .payload(json!({ "error": reason })),
                )
                .await;
        }

        self.audit
            .record(
                AuditEntry::new(provider, "initiation.success", AuditSource::Api)
                    .order(&order_id)
                    .payment(&session.session_id)
                    .payload(json!({
                        "amount": request.amount,
                        "currency": request.currency_code(),
                        "redirect_url": session.redirect_url,
                        "expires_at": session.expires_at,
                    })),
            )
            .await;

        info!(
            order_id = %order_id,
            provider = %provider,
            session_id = %session.session_id,
            "Payment session created"
        );

        Ok(session)
    }

    /// Apply a verified provider event to the order it refers to
    ///
    /// Returns `Err` only for failures the provider should retry.
    pub async fn handle_webhook(&self, event: ProviderEvent) -> PaymentResult<WebhookOutcome> {
        let event = match event {
            ProviderEvent::Unhandled {
                provider,
                event_type,
                payload,
            } => {
                info!(provider = %provider, event_type = %event_type, "Ignoring unhandled webhook event");
                self.audit
                    .record(
                        AuditEntry::new(provider, "webhook.unhandled", AuditSource::Webhook)
                            .payload(json!({ "event_type": event_type, "payload": payload })),
                    )
                    .await;
                return Ok(WebhookOutcome::Ignored);
            }
            ProviderEvent::Canonical(event) => event,
        };

        let order = match self.store.find_order(&event.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(
                    provider = %event.provider,
                    order_id = %event.order_id,
                    "Webhook references unknown order"
                );
                self.record_event(&event, "webhook.order_not_found", json!({ "raw": event.raw }))
                    .await;
                return Ok(WebhookOutcome::OrderNotFound);
            }
            Err(e) => return Err(self.webhook_failure(&event, e.into()).await),
        };

        if !order.is_current_attempt(event.provider, event.session_id.as_deref()) {
            return Ok(self.superseded(&event, &order).await);
        }

        if event.kind == WebhookEventKind::Completed && !amount_matches(&order, &event) {
            warn!(
                order_id = %order.order_id,
                expected_amount = order.amount,
                expected_currency = %order.currency,
                received_amount = ?event.amount,
                received_currency = ?event.currency,
                "Completed payment does not match order total"
            );
            self.record_event(
                &event,
                "webhook.amount_mismatch",
                json!({
                    "expected": { "amount": order.amount, "currency": order.currency },
                    "received": { "amount": event.amount, "currency": event.currency },
                }),
            )
            .await;
            return Ok(WebhookOutcome::Rejected);
        }

        let target = PaymentStatus::from(event.kind);
        let updated = match self
            .store
            .transition_status(
                &event.order_id,
                event.provider,
                event.session_id.as_deref(),
                target,
                &event.transaction_id,
            )
            .await
        {
            Ok(updated) => updated,
            Err(e) => return Err(self.webhook_failure(&event, e.into()).await),
        };

        match updated {
            Some(order) => {
                info!(
                    order_id = %order.order_id,
                    provider = %event.provider,
                    status = %target,
                    "Payment status updated"
                );
                self.record_event(
                    &event,
                    payment_event_suffix(target),
                    json!({ "event_type": event.provider_event_type, "raw": event.raw }),
                )
                .await;

                if target == PaymentStatus::Paid {
                    self.notifier.payment_confirmed(PaymentNotice {
                        order_id: order.order_id.clone(),
                        provider: event.provider,
                        transaction_id: event.transaction_id.clone(),
                        amount: order.amount,
                        currency: order.currency.clone(),
                        customer_email: order.customer_email.clone(),
                        customer_phone: order.customer_phone.clone(),
                        paid_at: order.paid_at.unwrap_or_else(Utc::now),
                    });
                }

                Ok(WebhookOutcome::Applied(target))
            }
            None => {
                // Lost the compare-and-set: classify against the current state.
                let current = match self.store.find_order(&event.order_id).await {
                    Ok(Some(current)) => current,
                    Ok(None) => order,
                    Err(e) => return Err(self.webhook_failure(&event, e.into()).await),
                };
                // A new attempt may have started between the read and the write.
                if !current.is_current_attempt(event.provider, event.session_id.as_deref()) {
                    return Ok(self.superseded(&event, &current).await);
                }
                let current = current.payment_status;

                match classify_rejection(current, target) {
                    Rejection::Duplicate => {
                        info!(
                            order_id = %event.order_id,
                            status = %current,
                            "Duplicate webhook delivery"
                        );
                        self.record_event(
                            &event,
                            "webhook.duplicate",
                            json!({ "event_type": event.provider_event_type, "status": current }),
                        )
                        .await;
                        Ok(WebhookOutcome::Duplicate)
                    }
                    Rejection::Stale => {
                        let err = PaymentError::StaleTransition {
                            order_id: event.order_id.clone(),
                            current,
                            attempted: target,
                        };
                        warn!(error = %err, "Stale webhook transition");
                        self.record_event(
                            &event,
                            "webhook.stale_transition",
                            json!({
                                "event_type": event.provider_event_type,
                                "current": current,
                                "attempted": target,
                            }),
                        )
                        .await;
                        Ok(WebhookOutcome::Stale)
                    }
                }
            }
        }
    }

    async fn superseded(
        &self,
        event: &CanonicalWebhookEvent,
        order: &OrderPayment,
    ) -> WebhookOutcome {
        warn!(
            order_id = %event.order_id,
            provider = %event.provider,
            session_id = ?event.session_id,
            current_provider = ?order.payment_provider,
            current_session_id = ?order.provider_session_id,
            "Webhook belongs to a superseded payment attempt"
        );
        self.record_event(
            event,
            "webhook.superseded",
            json!({
                "event_type": event.provider_event_type,
                "session_id": event.session_id,
                "current": {
                    "provider": order.payment_provider,
                    "session_id": order.provider_session_id,
                    "status": order.payment_status,
                },
            }),
        )
        .await;
        WebhookOutcome::Superseded
    }

    async fn record_event(
        &self,
        event: &CanonicalWebhookEvent,
        suffix: &str,
        payload: serde_json::Value,
    ) {
        self.audit
            .record(
                AuditEntry::new(event.provider, suffix, AuditSource::Webhook)
                    .order(&event.order_id)
                    .transaction(&event.transaction_id)
                    .payload(payload),
            )
            .await;
    }

    async fn webhook_failure(
        &self,
        event: &CanonicalWebhookEvent,
        err: PaymentError,
    ) -> PaymentError {
        error!(
            provider = %event.provider,
            order_id = %event.order_id,
            error = %err,
            "Webhook processing failed"
        );
        self.record_event(event, "webhook.error", json!({ "error": err.to_string() }))
            .await;
        err
    }
}

fn amount_matches(order: &OrderPayment, event: &CanonicalWebhookEvent) -> bool {
    let amount_ok = event.amount.map_or(true, |amount| amount == order.amount);
    let currency_ok = event
        .currency
        .as_deref()
        .map_or(true, |currency| currency.trim().eq_ignore_ascii_case(&order.currency));
    amount_ok && currency_ok
}
