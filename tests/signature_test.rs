//! Every adapter must reject a body altered by a single byte

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use storefront_payments::payments::providers::{
    MobileMoneyConfig, MobileMoneyProvider, StripeConfig, StripeProvider, WaveConfig,
    WaveProvider,
};
use storefront_payments::payments::signature::hmac_sha256;
use storefront_payments::payments::ProviderAdapter;

const SECRET: &str = "whsec_shared_test_secret";

fn body() -> Vec<u8> {
    br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#.to_vec()
}

fn flip_one_byte(body: &[u8]) -> Vec<u8> {
    let mut tampered = body.to_vec();
    let last = tampered.len() - 2;
    tampered[last] ^= 0x01;
    tampered
}

fn assert_tamper_detected(adapter: &dyn ProviderAdapter, body: &[u8], header: &str) {
    assert!(
        adapter.verify_signature(body, Some(header)),
        "{} rejected its own signature",
        adapter.provider()
    );
    assert!(
        !adapter.verify_signature(&flip_one_byte(body), Some(header)),
        "{} accepted a tampered body",
        adapter.provider()
    );
    assert!(!adapter.verify_signature(body, None));
    assert!(!adapter.verify_signature(body, Some("")));
}

#[test]
fn test_stripe_detects_tampering() {
    let adapter = StripeProvider::new(
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: SECRET.to_string(),
            ..StripeConfig::default()
        },
        reqwest::Client::new(),
    );
    let body = body();
    let t = Utc::now().timestamp();
    let mac = hmac_sha256(SECRET, &[t.to_string().as_bytes(), b".", body.as_slice()]);
    let header = format!("t={},v1={}", t, hex::encode(mac));

    assert_tamper_detected(&adapter, &body, &header);
}

#[test]
fn test_wave_detects_tampering() {
    let adapter = WaveProvider::new(
        WaveConfig {
            api_key: "wave_sn_prod_test".to_string(),
            webhook_secret: SECRET.to_string(),
            ..WaveConfig::default()
        },
        reqwest::Client::new(),
    );
    let body = body();
    let t = Utc::now().timestamp();
    let mac = hmac_sha256(SECRET, &[t.to_string().as_bytes(), body.as_slice()]);
    let header = format!("t={},v1={}", t, hex::encode(mac));

    assert_tamper_detected(&adapter, &body, &header);
}

#[test]
fn test_mobile_money_detects_tampering() {
    let adapter = MobileMoneyProvider::new(
        MobileMoneyConfig {
            api_key: "mm_test_key".to_string(),
            webhook_secret: SECRET.to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
        },
        reqwest::Client::new(),
    );
    let body = body();
    let header = BASE64.encode(hmac_sha256(SECRET, &[body.as_slice()]));

    assert_tamper_detected(&adapter, &body, &header);
}
