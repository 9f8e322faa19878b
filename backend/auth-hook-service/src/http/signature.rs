/// Standard-Webhooks signature verification for the send-email hook
///
/// The provider signs `{webhook-id}.{webhook-timestamp}.{body}` with
/// HMAC-SHA256 and sends one or more space-separated `v1,<base64>` entries in
/// `webhook-signature`.
use crate::error::{HookError, Result};
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted distance between the signed timestamp and now
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";
const VERSION_PREFIX: &str = "v1,";

/// Decoded hook signing key
#[derive(Clone)]
pub struct WebhookSecret {
    key: Vec<u8>,
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret(..)")
    }
}

impl WebhookSecret {
    /// Accepts `v1,whsec_<base64>`, `whsec_<base64>` or a raw key.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let unversioned = trimmed.strip_prefix(VERSION_PREFIX).unwrap_or(trimmed);

        let key = match unversioned.strip_prefix(SECRET_PREFIX) {
            Some(encoded) => BASE64.decode(encoded).map_err(|e| {
                HookError::Configuration(format!("Invalid hook secret encoding: {}", e))
            })?,
            None => unversioned.as_bytes().to_vec(),
        };

        if key.is_empty() {
            return Err(HookError::Configuration("Hook secret is empty".to_string()));
        }

        Ok(Self { key })
    }

    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<String> {
        let mac = self.mac(msg_id, timestamp, body)?;
        Ok(format!(
            "{}{}",
            VERSION_PREFIX,
            BASE64.encode(mac.finalize().into_bytes())
        ))
    }

    /// Verify the signature headers against `body` at time `now` (unix seconds).
    pub fn verify(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<()> {
        let msg_id = header_str(headers, "webhook-id")?;
        let timestamp: i64 = header_str(headers, "webhook-timestamp")?
            .parse()
            .map_err(|_| HookError::InvalidSignature)?;
        let signatures = header_str(headers, "webhook-signature")?;

        if now.abs_diff(timestamp) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
            warn!(timestamp, now, "Webhook timestamp outside tolerance");
            return Err(HookError::InvalidSignature);
        }

        for candidate in signatures.split_whitespace() {
            let Some(encoded) = candidate.strip_prefix(VERSION_PREFIX) else {
                continue;
            };
            let Ok(expected) = BASE64.decode(encoded) else {
                continue;
            };
            if self
                .mac(msg_id, timestamp, body)?
                .verify_slice(&expected)
                .is_ok()
            {
                return Ok(());
            }
        }

        Err(HookError::InvalidSignature)
    }

    fn mac(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| HookError::Internal(format!("HMAC init failed: {}", e)))?;
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(HookError::InvalidSignature)
}
