//! Webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the GitHub-style `sha256=<hex>` signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the `sha256=<hex>` signature of `body` under `secret`.
pub fn sign(body: &[u8], secret: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(body);
    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check `header` against the HMAC-SHA256 of `body`.
///
/// Never fails loudly: a missing header, a malformed header or a mismatch
/// all return `false`.
pub fn verify_signature(body: &[u8], header: Option<&str>, secret: &[u8]) -> bool {
    let Some(header) = header else {
        return false;
    };
    if !header.starts_with(SIGNATURE_PREFIX) {
        return false;
    }

    let Some(expected) = sign(body, secret) else {
        return false;
    };
    // Length is not secret.
    if expected.len() != header.len() {
        return false;
    }

    expected.as_bytes().ct_eq(header.as_bytes()).into()
}
