//! `Payment-Signature` header verification.
//!
//! The header looks like `t=1760000000,v1=<hex>`: a unix timestamp and one or
//! more HMAC-SHA256 signatures of `"<t>.<raw body>"` keyed with the webhook
//! secret.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::WebhookError;

/// Name of the signature header.
pub const SIGNATURE_HEADER: &str = "Payment-Signature";

/// Maximum age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Hex HMAC-SHA256 of `"<timestamp>.<body>"`.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the key is rejected by HMAC.
pub fn compute_signature(
    secret: &SecretString,
    timestamp: i64,
    body: &[u8],
) -> Result<String, WebhookError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature header against the raw request body.
///
/// `now` is the current unix time in seconds.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` if the header is malformed, the
/// timestamp is outside the tolerance window, or no signature matches.
pub fn verify_signature(
    secret: &SecretString,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    WebhookError::InvalidSignature("Invalid timestamp".to_string())
                })?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::InvalidSignature("Missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "Missing v1 signature".to_string(),
        ));
    }

    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::InvalidSignature(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(secret, timestamp, body)?;
    if !signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(WebhookError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    tracing::debug!("Payment webhook signature verified");
    Ok(())
}

/// Compare two strings without short-circuiting on the first difference.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
