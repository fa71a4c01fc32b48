use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{NewAttempt, OrderPayment, OrderStore};
use crate::payments::state::{transition_sources, PaymentStatus};
use crate::payments::types::Provider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::debug;

const ORDER_COLUMNS: &str = "id, payment_status, payment_provider, provider_session_id, \
     provider_transaction_id, amount, currency, customer_email, customer_phone, paid_at, updated_at";

/// Raw `orders` row as stored
#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: String,
    payment_status: String,
    payment_provider: Option<String>,
    provider_session_id: Option<String>,
    provider_transaction_id: Option<String>,
    amount: i64,
    currency: String,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for OrderPayment {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let payment_status = row
            .payment_status
            .parse::<PaymentStatus>()
            .map_err(|e| DatabaseError::decode(e).with_context(format!("order {}", row.id)))?;
        let payment_provider = row
            .payment_provider
            .as_deref()
            .map(str::parse::<Provider>)
            .transpose()
            .map_err(|e| {
                DatabaseError::decode(e.to_string()).with_context(format!("order {}", row.id))
            })?;

        Ok(OrderPayment {
            order_id: row.id,
            payment_status,
            payment_provider,
            provider_session_id: row.provider_session_id,
            provider_transaction_id: row.provider_transaction_id,
            amount: row.amount,
            currency: row.currency,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            paid_at: row.paid_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed order store
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_order(&self, order_id: &str) -> DbResult<Option<OrderPayment>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(OrderPayment::try_from).transpose()
    }

    async fn begin_attempt(&self, attempt: &NewAttempt) -> DbResult<Option<OrderPayment>> {
        debug!(order_id = %attempt.order_id, provider = %attempt.provider, "Starting payment attempt");

        // The conflict branch is skipped for paid orders, which yields no row.
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (id, payment_status, payment_provider, amount, currency, \
                                 customer_email, customer_phone, created_at, updated_at) \
             VALUES ($1, 'pending', $2, $3, $4, $5, $6, NOW(), NOW()) \
             ON CONFLICT (id) DO UPDATE \
             SET payment_status = 'pending', payment_provider = EXCLUDED.payment_provider, \
                 amount = EXCLUDED.amount, currency = EXCLUDED.currency, \
                 customer_email = EXCLUDED.customer_email, customer_phone = EXCLUDED.customer_phone, \
                 provider_session_id = NULL, provider_transaction_id = NULL, updated_at = NOW() \
             WHERE orders.payment_status <> 'paid' \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(&attempt.order_id)
        .bind(attempt.provider.as_str())
        .bind(attempt.amount)
        .bind(&attempt.currency)
        .bind(&attempt.customer_email)
        .bind(&attempt.customer_phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("begin payment attempt"))?;

        row.map(OrderPayment::try_from).transpose()
    }

    async fn attach_session(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET provider_session_id = $3, updated_at = NOW() \
             WHERE id = $1 AND payment_provider = $2 AND payment_status <> 'paid'",
        )
        .bind(order_id)
        .bind(provider.as_str())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("attach provider session"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn transition_status(
        &self,
        order_id: &str,
        provider: Provider,
        session_id: Option<&str>,
        target: PaymentStatus,
        transaction_id: &str,
    ) -> DbResult<Option<OrderPayment>> {
        let sources: Vec<String> = transition_sources(target)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let paid_at = (target == PaymentStatus::Paid).then(Utc::now);

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders \
             SET payment_status = $2, provider_transaction_id = $3, \
                 paid_at = COALESCE($4, paid_at), updated_at = NOW() \
             WHERE id = $1 AND payment_status = ANY($5) \
               AND payment_provider = $6 \
               AND ($7::text IS NULL OR provider_session_id IS NULL OR provider_session_id = $7) \
             RETURNING {}",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .bind(target.as_str())
        .bind(transaction_id)
        .bind(paid_at)
        .bind(&sources)
        .bind(provider.as_str())
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DatabaseError::from_sqlx(e).with_context(format!("transition order {}", order_id))
        })?;

        row.map(OrderPayment::try_from).transpose()
    }
}
