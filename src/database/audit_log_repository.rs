use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::AuditSink;
use crate::payments::audit::AuditEntry;
use async_trait::async_trait;
use sqlx::PgPool;

/// Audit log repository over `payment_audit_logs`
///
/// Insert only; the table has no update or delete path.
pub struct PgAuditLogRepository {
    pool: PgPool,
}

impl PgAuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditLogRepository {
    async fn append(&self, entry: &AuditEntry) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO payment_audit_logs
             (id, event_type, provider, order_id, payment_id, transaction_id, payload, source, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(entry.id)
        .bind(&entry.event_type)
        .bind(entry.provider.as_str())
        .bind(&entry.order_id)
        .bind(&entry.payment_id)
        .bind(&entry.transaction_id)
        .bind(&entry.payload)
        .bind(entry.source.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_sqlx(e).with_context("append audit entry"))?;

        Ok(())
    }
}
