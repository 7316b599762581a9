use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use seawarn_common::types::{CanonicalEvent, Channel};
use sha2::Sha256;
use tracing;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced while verifying or translating a provider webhook.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The webhook signature did not match the shared secret.
    #[error("Normalize: invalid webhook signature")]
    InvalidSignature,

    /// The payload could not be parsed into the provider's documented
    /// shape.
    #[error("Normalize: malformed payload: {0}")]
    Malformed(String),
}

/// Translates one provider's webhook payloads into canonical delivery
/// events.
///
/// A single callback body may carry several status updates (batched
/// provider webhooks), so `normalize` returns a list. Verification and
/// translation are separate steps: the HTTP layer rejects a bad
/// signature before any parsing happens.
pub trait WebhookNormalizer: Send + Sync {
    /// Provider name used in logs and route registration.
    fn provider(&self) -> &'static str;

    /// Checks the HMAC-SHA256 signature over the raw body.
    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), NormalizeError>;

    /// Parses the raw body into canonical events, each tagged with the
    /// channel its provider message ID belongs to.
    fn normalize(&self, body: &[u8]) -> Result<Vec<(Channel, CanonicalEvent)>, NormalizeError>;
}

/// Computes the base64 HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Shared signature check used by all provider normalizers.
///
/// With no secret configured the check is skipped in degraded mode: the
/// event is still accepted, but every such request is logged so the gap
/// is visible in operations.
pub fn verify_signature(
    provider: &str,
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), NormalizeError> {
    let Some(secret) = secret else {
        tracing::warn!(provider, "Webhook accepted without signature verification; no secret configured");
        return Ok(());
    };
    let Some(signature) = signature else {
        return Err(NormalizeError::InvalidSignature);
    };
    if sign_body(secret, body) == signature {
        Ok(())
    } else {
        Err(NormalizeError::InvalidSignature)
    }
}
