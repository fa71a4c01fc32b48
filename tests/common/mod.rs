//! Shared harness for router-level tests
//!
//! Everything runs in-process: in-memory stores, a recording notifier and
//! adapters that never reach the network.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_payments::api;
use storefront_payments::database::memory::{MemoryAuditLog, MemoryOrderStore};
use storefront_payments::database::repository::OrderPayment;
use storefront_payments::error::PaymentResult;
use storefront_payments::payments::audit::AuditLogWriter;
use storefront_payments::payments::notifications::{NotificationDispatcher, PaymentNotice};
use storefront_payments::payments::providers::{MobileMoneyConfig, MobileMoneyProvider};
use storefront_payments::payments::signature::hmac_sha256;
use storefront_payments::payments::state::PaymentStatus;
use storefront_payments::payments::types::{
    CanonicalWebhookEvent, PaymentInitiationRequest, PaymentSession, Provider, SessionStatus,
};
use storefront_payments::payments::{PaymentOrchestrator, ProviderAdapter};
use storefront_payments::AppState;
use tower::ServiceExt;

pub const MOBILE_MONEY_SECRET: &str = "mm_whsec_test";

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<PaymentNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<PaymentNotice> {
        self.notices.lock().unwrap().clone()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn payment_confirmed(&self, notice: PaymentNotice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Wave stand-in that hands out a fixed checkout session
#[derive(Default)]
pub struct StaticCheckout {
    pub calls: AtomicUsize,
}

impl StaticCheckout {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StaticCheckout {
    fn provider(&self) -> Provider {
        Provider::Wave
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["wave-signature"]
    }

    async fn initiate(
        &self,
        _request: &PaymentInitiationRequest,
        order_id: &str,
        _callback_url: &str,
    ) -> PaymentResult<PaymentSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            provider: Provider::Wave,
            session_id: "cos-18qq25rgr100a".to_string(),
            order_id: order_id.to_string(),
            redirect_url: "https://pay.wave.com/c/cos-18qq25rgr100a".to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
            status: SessionStatus::Pending,
        })
    }

    fn verify_signature(&self, _payload: &[u8], _signature: Option<&str>) -> bool {
        false
    }

    fn parse_webhook(&self, _payload: &Value) -> PaymentResult<Option<CanonicalWebhookEvent>> {
        Ok(None)
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryOrderStore>,
    pub audit: Arc<MemoryAuditLog>,
    pub notifier: Arc<RecordingNotifier>,
    pub checkout: Arc<StaticCheckout>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryOrderStore::new());
        let audit = Arc::new(MemoryAuditLog::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let checkout = Arc::new(StaticCheckout::default());

        let mobile_money = MobileMoneyProvider::new(
            MobileMoneyConfig {
                api_key: "mm_test_key".to_string(),
                webhook_secret: MOBILE_MONEY_SECRET.to_string(),
                base_url: "http://127.0.0.1:9".to_string(),
            },
            reqwest::Client::new(),
        );

        let orchestrator = PaymentOrchestrator::new(
            store.clone(),
            AuditLogWriter::new(audit.clone()),
            notifier.clone(),
            "https://shop.example.com",
        )
        .with_adapter(checkout.clone())
        .with_adapter(Arc::new(mobile_money));

        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            environment: "development".to_string(),
            db_pool: None,
        };

        Self {
            router: api::router(state, std::time::Duration::from_secs(5)),
            store,
            audit,
            notifier,
            checkout,
        }
    }

    /// Seed a pending mobile money order
    pub fn seed_order(&self, order_id: &str, amount: i64, currency: &str) {
        self.store.insert(OrderPayment {
            order_id: order_id.to_string(),
            payment_status: PaymentStatus::Pending,
            payment_provider: Some(Provider::MobileMoney),
            provider_session_id: Some("pay_123".to_string()),
            provider_transaction_id: None,
            amount,
            currency: currency.to_string(),
            customer_email: Some("awa@example.com".to_string()),
            customer_phone: Some("+221770000000".to_string()),
            paid_at: None,
            updated_at: Utc::now(),
        });
    }

    pub fn status_of(&self, order_id: &str) -> Option<PaymentStatus> {
        self.store.get(order_id).map(|o| o.payment_status)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Deliver a mobile money webhook, signed unless `signature` is `None`
    pub async fn deliver_mobile_money(
        &self,
        body: &[u8],
        signature: Option<String>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhooks/mobile_money")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-mobile-money-signature", signature);
        }
        self.send(builder.body(Body::from(body.to_vec())).unwrap())
            .await
    }
}

pub fn sign_mobile_money(body: &[u8]) -> String {
    BASE64.encode(hmac_sha256(MOBILE_MONEY_SECRET, &[body]))
}
