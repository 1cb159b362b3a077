//! Webhook signature verification (HMAC-SHA256)
//!
//! Header format: `t=<unix seconds>,v1=<hex digest>[,v1=...]`. The digest
//! covers `"{t}.{raw body}"`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Invalid signature header")]
    MalformedHeader,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("HMAC key error")]
    Key,
    #[error("Webhook signature mismatch")]
    Mismatch,
    #[error("Webhook timestamp outside tolerance")]
    Expired,
}

/// Verify `payload` against the signature header.
///
/// Any `v1` entry may match (the provider sends several during secret
/// rotation). Events whose timestamp differs from `now` by more than
/// `tolerance_secs` are rejected.
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Key)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // verify_slice is constant-time
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(SignatureError::Mismatch);
    }

    if (now - ts).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    Ok(())
}

/// Build a header for `payload` (used by tests and local tooling)
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::Key)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}
