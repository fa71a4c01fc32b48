//! Canonical payment types shared by every provider adapter
//!
//! Requests, sessions and webhook events are expressed here in provider-neutral
//! terms. Amounts are always integers in the currency's minor unit.

use crate::error::{FieldError, PaymentError};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Payment providers the platform can route a checkout to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Card-network checkout
    Stripe,
    /// Mobile money (Wave)
    Wave,
    /// Mobile money aggregator
    MobileMoney,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Stripe, Provider::Wave, Provider::MobileMoney];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Stripe => "stripe",
            Provider::Wave => "wave",
            Provider::MobileMoney => "mobile_money",
        }
    }

    /// Audit event type namespaced by provider, e.g. `wave.webhook.unhandled`
    pub fn event(&self, suffix: &str) -> String {
        format!("{}.{}", self.as_str(), suffix)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "stripe" => Ok(Provider::Stripe),
            "wave" => Ok(Provider::Wave),
            "mobile_money" => Ok(Provider::MobileMoney),
            other => Err(PaymentError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Customer contact details forwarded to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// A single purchased line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Unit price in minor units
    pub unit_amount: i64,
    pub quantity: i64,
}

impl LineItem {
    pub fn subtotal(&self) -> Option<i64> {
        self.unit_amount.checked_mul(self.quantity)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.product_id)
    }
}

/// Payment request for starting a checkout with a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInitiationRequest {
    pub provider: Provider,
    /// Total in smallest currency unit (must equal the sum of item subtotals)
    pub amount: i64,
    pub currency: String,
    pub customer: Customer,
    pub items: Vec<LineItem>,
    pub delivery_method: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Existing order this attempt pays for
    #[serde(default)]
    pub order_id: Option<String>,
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"))
}

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9]{6,15}$").expect("valid phone regex"))
}

fn currency_pattern() -> &'static Regex {
    static CURRENCY: OnceLock<Regex> = OnceLock::new();
    CURRENCY.get_or_init(|| Regex::new(r"^[A-Za-z]{3}$").expect("valid currency regex"))
}

fn check_redirect_url(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    match reqwest::Url::parse(value) {
        Ok(url) if url.scheme() == "https" || url.scheme() == "http" => {}
        _ => errors.push(FieldError::new(field, "must be an absolute http(s) URL")),
    }
}

impl PaymentInitiationRequest {
    /// Currency code in the upper-case form providers expect
    pub fn currency_code(&self) -> String {
        self.currency.trim().to_ascii_uppercase()
    }

    /// Check the request shape, collecting every offending field
    pub fn validate(&self) -> Result<(), PaymentError> {
        let mut errors = Vec::new();

        if self.amount <= 0 {
            errors.push(FieldError::new("amount", "must be greater than zero"));
        }

        if self.currency.trim().is_empty() {
            errors.push(FieldError::new("currency", "is required"));
        } else if !currency_pattern().is_match(self.currency.trim()) {
            errors.push(FieldError::new("currency", "must be a 3-letter ISO 4217 code"));
        }

        if self.customer.name.trim().is_empty() {
            errors.push(FieldError::new("customer.name", "is required"));
        }
        if self.customer.email.trim().is_empty() {
            errors.push(FieldError::new("customer.email", "is required"));
        } else if !email_pattern().is_match(self.customer.email.trim()) {
            errors.push(FieldError::new("customer.email", "is not a valid email address"));
        }
        if let Some(phone) = &self.customer.phone {
            let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
            if !phone_pattern().is_match(&compact) {
                errors.push(FieldError::new("customer.phone", "is not a valid phone number"));
            }
        }

        if self.items.is_empty() {
            errors.push(FieldError::new("items", "must contain at least one item"));
        }

        let mut total: Option<i64> = Some(0);
        for (index, item) in self.items.iter().enumerate() {
            if item.product_id.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("items[{}].product_id", index),
                    "is required",
                ));
            }
            if item.unit_amount <= 0 {
                errors.push(FieldError::new(
                    format!("items[{}].unit_amount", index),
                    "must be greater than zero",
                ));
            }
            if item.quantity <= 0 {
                errors.push(FieldError::new(
                    format!("items[{}].quantity", index),
                    "must be greater than zero",
                ));
            }
            total = total.and_then(|t| item.subtotal().and_then(|s| t.checked_add(s)));
        }

        if self.amount > 0 && !self.items.is_empty() {
            match total {
                Some(sum) if sum == self.amount => {}
                Some(sum) => errors.push(FieldError::new(
                    "amount",
                    format!("must equal the sum of line items ({})", sum),
                )),
                None => errors.push(FieldError::new("items", "line item total overflows")),
            }
        }

        if self.delivery_method.trim().is_empty() {
            errors.push(FieldError::new("delivery_method", "is required"));
        }

        check_redirect_url("success_url", &self.success_url, &mut errors);
        check_redirect_url("cancel_url", &self.cancel_url, &mut errors);

        if let Some(metadata) = &self.metadata {
            if !metadata.is_object() {
                errors.push(FieldError::new("metadata", "must be a JSON object"));
            }
        }

        if let Some(order_id) = &self.order_id {
            if order_id.trim().is_empty() {
                errors.push(FieldError::new("order_id", "must not be blank"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PaymentError::Validation(errors))
        }
    }
}

/// Session status as seen by the caller right after initiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
}

/// Checkout session handed back to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub provider: Provider,
    /// Provider-assigned session or payment identifier
    pub session_id: String,
    pub order_id: String,
    pub redirect_url: String,
    pub expires_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Canonical outcome carried by a provider webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    Completed,
    Failed,
    Processing,
}

/// Provider-neutral view of a verified webhook
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalWebhookEvent {
    pub provider: Provider,
    pub kind: WebhookEventKind,
    /// Event type string exactly as the provider sent it
    pub provider_event_type: String,
    pub transaction_id: String,
    pub order_id: String,
    /// Provider session (checkout or payment) the event was raised for
    pub session_id: Option<String>,
    /// Minor units
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub raw: serde_json::Value,
}

/// Input to the orchestrator's webhook handling
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    Canonical(CanonicalWebhookEvent),
    /// A verified event type the system does not act on
    Unhandled {
        provider: Provider,
        event_type: String,
        payload: serde_json::Value,
    },
}

impl ProviderEvent {
    pub fn provider(&self) -> Provider {
        match self {
            ProviderEvent::Canonical(event) => event.provider,
            ProviderEvent::Unhandled { provider, .. } => *provider,
        }
    }
}

const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Number of decimal places in the currency's minor unit
pub fn currency_exponent(currency: &str) -> u32 {
    let code = currency.trim().to_ascii_uppercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&code.as_str()) {
        0
    } else {
        2
    }
}

/// Render a minor-unit amount as a decimal string in major units
pub fn format_major_amount(minor: i64, currency: &str) -> String {
    let exponent = currency_exponent(currency);
    if exponent == 0 {
        return minor.to_string();
    }
    let divisor = 10_i64.pow(exponent);
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / divisor as u64,
        abs % divisor as u64,
        width = exponent as usize
    )
}

/// Parse a decimal string in major units into minor units, without floating point
pub fn parse_major_amount(value: &str, currency: &str) -> Option<i64> {
    let exponent = currency_exponent(currency) as usize;
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let significant = fraction.trim_end_matches('0');
    if significant.len() > exponent {
        return None;
    }
    let mut padded = significant.to_string();
    while padded.len() < exponent {
        padded.push('0');
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = if padded.is_empty() { 0 } else { padded.parse().ok()? };
    whole
        .checked_mul(10_i64.pow(exponent as u32))?
        .checked_add(fraction)
}
