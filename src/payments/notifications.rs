//! Post-confirmation notifications
//!
//! Dispatch is fire-and-forget: the webhook path never waits on delivery and
//! never observes its failure.

use crate::payments::types::Provider;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// What a confirmed payment tells downstream senders (email/SMS)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentNotice {
    pub order_id: String,
    pub provider: Provider,
    pub transaction_id: String,
    pub amount: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub paid_at: DateTime<Utc>,
}

pub trait NotificationDispatcher: Send + Sync {
    /// Schedule a confirmation for a freshly paid order
    fn payment_confirmed(&self, notice: PaymentNotice);
}

/// Posts notices as JSON to a downstream notification service
#[derive(Clone)]
pub struct HttpNotificationDispatcher {
    client: reqwest::Client,
    url: String,
}

impl HttpNotificationDispatcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl NotificationDispatcher for HttpNotificationDispatcher {
    fn payment_confirmed(&self, notice: PaymentNotice) {
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            let result = client
                .post(&url)
                .header("Content-Type", "application/json")
                .header("X-Event-Type", "payment.confirmed")
                .json(&notice)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    info!(order_id = %notice.order_id, "Payment confirmation dispatched");
                }
                Ok(response) => warn!(
                    order_id = %notice.order_id,
                    status = %response.status(),
                    "Notification service rejected payment confirmation"
                ),
                Err(e) => warn!(
                    order_id = %notice.order_id,
                    error = %e,
                    "Failed to dispatch payment confirmation"
                ),
            }
        });
    }
}

/// Used when no notification service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationDispatcher;

impl NotificationDispatcher for LogNotificationDispatcher {
    fn payment_confirmed(&self, notice: PaymentNotice) {
        info!(
            order_id = %notice.order_id,
            provider = %notice.provider,
            amount = notice.amount,
            currency = %notice.currency,
            "Payment confirmed (no notification service configured)"
        );
    }
}
