use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront_payments::api;
use storefront_payments::config::{Config, PaymentsConfig};
use storefront_payments::database::audit_log_repository::PgAuditLogRepository;
use storefront_payments::database::memory::{MemoryAuditLog, MemoryOrderStore};
use storefront_payments::database::order_repository::PgOrderStore;
use storefront_payments::database::repository::{AuditSink, OrderStore};
use storefront_payments::database::{init_pool, PoolConfig};
use storefront_payments::payments::audit::AuditLogWriter;
use storefront_payments::payments::notifications::{
    HttpNotificationDispatcher, LogNotificationDispatcher, NotificationDispatcher,
};
use storefront_payments::payments::providers::{
    MobileMoneyProvider, StripeProvider, WaveProvider,
};
use storefront_payments::payments::PaymentOrchestrator;
use storefront_payments::AppState;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn register_providers(
    orchestrator: &mut PaymentOrchestrator,
    payments: &PaymentsConfig,
    client: &reqwest::Client,
) {
    if let Some(config) = &payments.stripe {
        orchestrator.register(Arc::new(StripeProvider::new(config.clone(), client.clone())));
    }
    if let Some(config) = &payments.wave {
        orchestrator.register(Arc::new(WaveProvider::new(config.clone(), client.clone())));
    }
    if let Some(config) = &payments.mobile_money {
        orchestrator.register(Arc::new(MobileMoneyProvider::new(
            config.clone(),
            client.clone(),
        )));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting storefront payments");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Public origin: {}", config.server.public_origin);

    let (store, audit_sink, db_pool) = match &config.database {
        Some(db) => {
            let pool_config = PoolConfig::with_max_connections(db.max_connections);
            let pool = init_pool(&db.url, Some(pool_config))
                .await
                .context("Failed to connect to database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;
            (
                Arc::new(PgOrderStore::new(pool.clone())) as Arc<dyn OrderStore>,
                Arc::new(PgAuditLogRepository::new(pool.clone())) as Arc<dyn AuditSink>,
                Some(pool),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory order store");
            (
                Arc::new(MemoryOrderStore::new()) as Arc<dyn OrderStore>,
                Arc::new(MemoryAuditLog::default()) as Arc<dyn AuditSink>,
                None,
            )
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.payments.provider_timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let notifier: Arc<dyn NotificationDispatcher> = match &config.payments.notification_url {
        Some(url) => Arc::new(HttpNotificationDispatcher::new(client.clone(), url.clone())),
        None => Arc::new(LogNotificationDispatcher),
    };

    let mut orchestrator = PaymentOrchestrator::new(
        store,
        AuditLogWriter::new(audit_sink),
        notifier,
        config.server.public_origin.clone(),
    );
    register_providers(&mut orchestrator, &config.payments, &client);

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        environment: config.server.environment.clone(),
        db_pool,
    };

    let app = api::router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
