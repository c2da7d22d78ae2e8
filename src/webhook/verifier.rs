//! GitHub webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery with the app's webhook secret and sends the
//! result in `X-Hub-Signature-256` as `sha256=<hex>`. Verification never
//! errors: anything that is not a matching signature is simply `false`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Verify a webhook signature header against the raw request body.
pub fn verify_signature(raw_body: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    if raw_body.is_empty() || signature_header.is_empty() || secret.is_empty() {
        warn!("Missing body, signature or secret for webhook verification");
        return false;
    }

    let provided = match signature_header.strip_prefix(SIGNATURE_PREFIX) {
        Some(sig) => sig,
        None => {
            warn!("Invalid signature format, expected sha256=<hex>");
            return false;
        }
    };

    let expected = match compute_hex_digest(raw_body, secret) {
        Some(hex) => hex,
        None => return false,
    };

    // Length mismatch yields false without short-circuiting on content
    let valid: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
    if valid {
        debug!("Webhook signature verified");
    }
    valid
}

fn compute_hex_digest(payload: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Compute the `X-Hub-Signature-256` value GitHub would send for a payload.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> String {
    let digest = compute_hex_digest(payload, secret).unwrap_or_default();
    format!("{}{}", SIGNATURE_PREFIX, digest)
}
