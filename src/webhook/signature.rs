//! HMAC-SHA256 webhook signatures.
//!
//! The signature is hex(HMAC-SHA256(secret, raw body)), carried in the
//! `X-Signature` header. It is checked over the exact bytes received, before
//! any JSON parsing.

use crate::webhook::types::WebhookError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

/// Constant-time check of `provided` against the body's signature.
pub fn verify(secret: &str, body: &[u8], provided: Option<&str>) -> Result<(), WebhookError> {
    let provided = provided.ok_or(WebhookError::Authentication)?;
    let provided = provided.trim();
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    let expected = hex::decode(provided).map_err(|_| WebhookError::Authentication)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::Authentication)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::Authentication)
}

/// Hex signature for `body`, as the sender computes it.
#[cfg(test)]
pub(crate) fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign("Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify() {
        let body = br#"{"op":"UPDATE"}"#;
        let sig = sign("abc", body);
        assert!(verify("abc", body, Some(&sig)).is_ok());
        assert!(verify("abc", body, Some(&format!("sha256={}", sig))).is_ok());
        assert!(verify("abc", body, Some(&sig.to_uppercase())).is_ok());
        assert!(verify("abc", body, Some("deadbeef")).is_err());
        assert!(verify("abc", body, Some("not-hex")).is_err());
        assert!(verify("abc", body, None).is_err());
        assert!(verify("other", body, Some(&sig)).is_err());
        assert!(verify("abc", br#"{"op":"INSERT"}"#, Some(&sig)).is_err());
    }
}
