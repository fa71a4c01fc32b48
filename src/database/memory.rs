//! In-process stores for local runs without Postgres and for tests
//!
//! Both honour the same contracts as the Postgres repositories: transitions
//! are compare-and-set and the audit log is append-only.

use crate::database::error::DbResult;
use crate::database::repository::{AuditSink, NewAttempt, OrderPayment, OrderStore};
use crate::payments::audit::AuditEntry;
use crate::payments::state::{can_transition, PaymentStatus};
use crate::payments::types::Provider;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Order store backed by a mutex-guarded map
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<String, OrderPayment>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OrderPayment>> {
        // A poisoned map is still structurally valid.
        self.orders.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an existing order
    pub fn insert(&self, order: OrderPayment) {
        self.lock().insert(order.order_id.clone(), order);
    }

    pub fn get(&self, order_id: &str) -> Option<OrderPayment> {
        self.lock().get(order_id).cloned()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_order(&self, order_id: &str) -> DbResult<Option<OrderPayment>> {
        Ok(self.get(order_id))
    }

    async fn begin_attempt(&self, attempt: &NewAttempt) -> DbResult<Option<OrderPayment>> {
        let mut orders = self.lock();
        if let Some(existing) = orders.get(&attempt.order_id) {
            if existing.payment_status == PaymentStatus::Paid {
                return Ok(None);
            }
        }

        let order = OrderPayment {
            order_id: attempt.order_id.clone(),
            payment_status: PaymentStatus::Pending,
            payment_provider: Some(attempt.provider),
            provider_session_id: None,
            provider_transaction_id: None,
            amount: attempt.amount,
            currency: attempt.currency.clone(),
            customer_email: Some(attempt.customer_email.clone()),
            customer_phone: attempt.customer_phone.clone(),
            paid_at: None,
            updated_at: Utc::now(),
        };
        orders.insert(order.order_id.clone(), order.clone());
        Ok(Some(order))
    }

    async fn attach_session(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: &str,
    ) -> DbResult<bool> {
        let mut orders = self.lock();
        match orders.get_mut(order_id) {
            Some(order)
                if order.payment_provider == Some(provider)
                    && order.payment_status != PaymentStatus::Paid =>
            {
                order.provider_session_id = Some(session_id.to_string());
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_status(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: Option<&str>,
        target: PaymentStatus,
        transaction_id: &str,
    ) -> DbResult<Option<OrderPayment>> {
        let mut orders = self.lock();
        let Some(order) = orders.get_mut(order_id) else {
            return Ok(None);
        };
        if !order.is_current_attempt(provider, session_id)
            || !can_transition(order.payment_status, target)
        {
            return Ok(None);
        }

        let now = Utc::now();
        order.payment_status = target;
        order.provider_transaction_id = Some(transaction_id.to_string());
        if target == PaymentStatus::Paid {
            order.paid_at = Some(now);
        }
        order.updated_at = now;
        Ok(Some(order.clone()))
    }
}

/// Audit sink that keeps entries in memory
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of entries with the given event type
    pub fn count(&self, event_type: &str) -> usize {
        self.entries()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> DbResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}
