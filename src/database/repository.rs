use crate::database::error::DbResult;
use crate::payments::audit::AuditEntry;
use crate::payments::state::PaymentStatus;
use crate::payments::types::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Payment-related view of an order record
#[derive(Debug, Clone, PartialEq)]
pub struct OrderPayment {
    pub order_id: String,
    pub payment_status: PaymentStatus,
    pub payment_provider: Option<Provider>,
    pub provider_session_id: Option<String>,
    pub provider_transaction_id: Option<String>,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderPayment {
    /// Whether an event from `provider` for `session_id` belongs to the attempt
    /// currently recorded on the order
    ///
    /// A missing session on either side only narrows the match to the provider.
    pub fn is_current_attempt(&self, provider: Provider, session_id: Option<&str>) -> bool {
        if self.payment_provider != Some(provider) {
            return false;
        }
        match (self.provider_session_id.as_deref(), session_id) {
            (Some(current), Some(incoming)) => current == incoming,
            _ => true,
        }
    }
}

/// Fields written when a new payment attempt starts
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub order_id: String,
    pub provider: Provider,
    pub amount: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
}

/// Order store the orchestrator reads and conditionally writes
///
/// Implementations must apply `transition_status` as a single compare-and-set
/// against [`crate::payments::state::transition_sources`], scoped to the
/// attempt described by [`OrderPayment::is_current_attempt`].
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Find an order by its ID
    async fn find_order(&self, order_id: &str) -> DbResult<Option<OrderPayment>>;

    /// Reset (or create) the order as `pending` for a new attempt
    ///
    /// Returns `None` without writing when the order is already paid.
    async fn begin_attempt(&self, attempt: &NewAttempt) -> DbResult<Option<OrderPayment>>;

    /// Record the provider session created for the current attempt
    async fn attach_session(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: &str,
    ) -> DbResult<bool>;

    /// Move the order into `target` if its current status allows it and the
    /// event belongs to the current attempt
    ///
    /// Returns the updated order, or `None` when the precondition did not hold.
    async fn transition_status(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: Option<&str>,
        target: PaymentStatus,
        transaction_id: &str,
    ) -> DbResult<Option<OrderPayment>>;
}

/// Append-only storage for payment audit entries
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist a single entry; entries are never updated or deleted
    async fn append(&self, entry: &AuditEntry) -> DbResult<()>;
}
