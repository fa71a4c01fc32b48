//! Payment orchestration
//!
//! Provider adapters (Stripe, Wave, mobile money aggregator) behind a common
//! trait, signed webhook intake, the order payment state machine and the
//! audit trail.

pub mod audit;
pub mod notifications;
pub mod orchestrator;
pub mod providers;
pub mod signature;
pub mod state;
pub mod traits;
pub mod types;
pub mod webhook;

pub use orchestrator::{PaymentOrchestrator, WebhookOutcome};
pub use traits::ProviderAdapter;
pub use types::{PaymentInitiationRequest, PaymentSession, Provider, ProviderEvent};
