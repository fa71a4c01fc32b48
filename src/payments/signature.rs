//! Shared webhook signature primitives
//!
//! All comparisons go through `hmac::Mac::verify_slice`, which is constant-time.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Generic alternate header accepted from every provider
pub const GENERIC_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Return the first non-empty signature header present, in preference order
pub fn extract_signature<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    })
}

/// Parsed `t=<unix>,v1=<hex>` style header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampedSignature {
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

impl TimestampedSignature {
    pub fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = t.trim().parse::<i64>().ok(),
                Some(("v1", v)) => {
                    if let Ok(bytes) = hex::decode(v.trim()) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        match timestamp {
            Some(timestamp) if !signatures.is_empty() => Some(Self {
                timestamp,
                signatures,
            }),
            _ => None,
        }
    }

    pub fn within_tolerance(&self, now: i64, tolerance_secs: i64) -> bool {
        (now - self.timestamp).abs() <= tolerance_secs
    }
}

fn keyed(secret: &str) -> Option<HmacSha256> {
    if secret.is_empty() {
        return None;
    }
    HmacSha256::new_from_slice(secret.as_bytes()).ok()
}

/// Constant-time check that `expected_mac` is HMAC-SHA256(secret, parts...)
pub fn verify_hmac_sha256(secret: &str, parts: &[&[u8]], expected_mac: &[u8]) -> bool {
    let Some(mut mac) = keyed(secret) else {
        return false;
    };
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(expected_mac).is_ok()
}

/// Raw HMAC-SHA256 bytes, used when producing signatures (tests, local tooling)
pub fn hmac_sha256(secret: &str, parts: &[&[u8]]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    for part in parts {
        mac.update(part);
    }
    mac.finalize().into_bytes().to_vec()
}
