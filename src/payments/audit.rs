//! Payment audit trail
//!
//! Every lifecycle event is appended through [`AuditLogWriter`], which never
//! lets a storage failure reach the payment flow.

use crate::database::repository::AuditSink;
use crate::payments::types::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Where an audited event originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSource {
    Api,
    Webhook,
    System,
}

impl AuditSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::Api => "api",
            AuditSource::Webhook => "webhook",
            AuditSource::System => "system",
        }
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    /// `<provider>.<area>.<outcome>`, e.g. `stripe.webhook.invalid_signature`
    pub event_type: String,
    pub provider: Provider,
    pub order_id: Option<String>,
    /// Provider session / payment identifier
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    pub payload: serde_json::Value,
    pub source: AuditSource,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(provider: Provider, suffix: &str, source: AuditSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: provider.event(suffix),
            provider,
            order_id: None,
            payment_id: None,
            transaction_id: None,
            payload: serde_json::Value::Null,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn payment(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn transaction(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Best-effort writer in front of an [`AuditSink`]
#[derive(Clone)]
pub struct AuditLogWriter {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogWriter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append an entry; failures are logged and swallowed
    pub async fn record(&self, entry: AuditEntry) {
        match self.sink.append(&entry).await {
            Ok(()) => debug!(event_type = %entry.event_type, "Audit entry written"),
            Err(e) => error!(
                event_type = %entry.event_type,
                order_id = ?entry.order_id,
                error = %e,
                "Failed to write payment audit entry"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
    use crate::database::memory::MemoryAuditLog;
    use async_trait::async_trait;
    use serde_json::json;

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _entry: &AuditEntry) -> DbResult<()> {
            Err(DatabaseError::new(DatabaseErrorKind::ConnectionError {
                message: "connection refused".to_string(),
            }))
        }
    }

    #[test]
    fn test_entry_builder() {
        let entry = AuditEntry::new(Provider::Wave, "payment.succeeded", AuditSource::Webhook)
            .order("ord_1")
            .payment("cos-1")
            .transaction("TCN_1")
            .payload(json!({ "amount": 5000 }));

        assert_eq!(entry.event_type, "wave.payment.succeeded");
        assert_eq!(entry.order_id.as_deref(), Some("ord_1"));
        assert_eq!(entry.payment_id.as_deref(), Some("cos-1"));
        assert_eq!(entry.transaction_id.as_deref(), Some("TCN_1"));
        assert_eq!(entry.source.as_str(), "webhook");
    }

    #[tokio::test]
    async fn test_record_appends() {
        let log = Arc::new(MemoryAuditLog::default());
        let writer = AuditLogWriter::new(log.clone());
        writer
            .record(AuditEntry::new(Provider::Stripe, "initiation.success", AuditSource::Api))
            .await;
        assert_eq!(log.count("stripe.initiation.success"), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let writer = AuditLogWriter::new(Arc::new(BrokenSink));
        // Must complete without panicking or propagating.
        writer
            .record(AuditEntry::new(Provider::Stripe, "webhook.error", AuditSource::Webhook))
            .await;
    }
}
