//! Shopify webhook signature verification.
//!
//! Shopify signs each webhook delivery with HMAC-SHA256 over the raw request
//! body, keyed by the app's API secret, and sends the base64 digest in the
//! `X-Shopify-Hmac-Sha256` header. The digest must be computed over the exact
//! bytes received; parsing and re-serializing the JSON breaks it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the base64 HMAC digest.
pub const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
/// Header carrying the webhook topic, e.g. `app/uninstalled`.
pub const TOPIC_HEADER: &str = "x-shopify-topic";
/// Header carrying the sending shop's domain.
pub const SHOP_DOMAIN_HEADER: &str = "x-shopify-shop-domain";

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64 HMAC-SHA256 of `body` keyed by `secret`.
#[must_use]
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(body);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// Verify a webhook signature in constant time.
///
/// Returns `false` for a signature that is not valid base64.
#[must_use]
pub fn verify_webhook_signature(secret: &[u8], body: &[u8], provided: &str) -> bool {
    let Ok(provided) = STANDARD.decode(provided.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shpss_test_secret";
    // base64(HMAC-SHA256("shpss_test_secret", "test"))
    const REFERENCE: &str = "pLWUa9Lvojepov2szyb1IpngZ82QBGzr1d6OPWE1jkY=";

    #[test]
    fn test_sign_matches_reference_digest() {
        assert_eq!(sign(SECRET, b"test"), REFERENCE);
    }

    #[test]
    fn test_verify_accepts_reference_digest() {
        assert!(verify_webhook_signature(SECRET, b"test", REFERENCE));
    }

    #[test]
    fn test_verify_rejects_any_single_byte_mutation() {
        let body = b"test".to_vec();
        for i in 0..body.len() {
            for bit in 0..8 {
                let mut mutated = body.clone();
                if let Some(byte) = mutated.get_mut(i) {
                    *byte ^= 1 << bit;
                }
                assert!(
                    !verify_webhook_signature(SECRET, &mutated, REFERENCE),
                    "mutation at byte {i} bit {bit} verified"
                );
            }
        }
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        assert!(!verify_webhook_signature(b"other_secret", b"test", REFERENCE));
    }

    #[test]
    fn test_verify_rejects_garbage_signature() {
        assert!(!verify_webhook_signature(SECRET, b"test", "not base64!!"));
        assert!(!verify_webhook_signature(SECRET, b"test", ""));
    }

    #[test]
    fn test_verify_is_sensitive_to_reserialization() {
        let raw = br#"{"id": 1,"topic":"app/uninstalled"}"#;
        let signature = sign(SECRET, raw);
        let reserialized = br#"{"id":1,"topic":"app/uninstalled"}"#;

        assert!(verify_webhook_signature(SECRET, raw, &signature));
        assert!(!verify_webhook_signature(SECRET, reserialized, &signature));
    }
}
