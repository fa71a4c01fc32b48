//! Payment orchestration core for the storefront platform
//!
//! Starts checkouts with Stripe, Wave and a mobile money aggregator, verifies
//! their signed webhooks and reconciles order payment state idempotently.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod payments;

use payments::PaymentOrchestrator;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared state handed to every axum handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub environment: String,
    /// `None` when running on the in-memory stores
    pub db_pool: Option<PgPool>,
}
