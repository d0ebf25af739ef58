use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the exact payload bytes using the shared secret.
/// Returns the base64-encoded MAC as carried in the signature header.
pub fn sign_payload(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify the signature header against the raw webhook body.
///
/// Fails closed: returns `false` on an empty payload, missing or malformed
/// header, or any mismatch — it never errors. Callers must reject the webhook
/// before touching any order state when this returns `false`.
///
/// Uses constant-time comparison; a malformed base64 header is compared
/// against zeros so the timing profile does not change.
pub fn verify_signature(secret: &[u8], payload: &[u8], header_value: &str) -> bool {
    if payload.is_empty() || header_value.is_empty() {
        return false;
    }

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);

    let expected = BASE64
        .decode(header_value)
        .unwrap_or_else(|_| vec![0u8; 32]);

    // hmac crate's verify_slice uses constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_roundtrip() {
        let secret = b"shared-webhook-secret";
        let body = br#"{"charge":{"correlationID":"932211291312100109","value":"1"}}"#;
        let sig = sign_payload(secret, body);
        assert!(verify_signature(secret, body, &sig));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let sig = sign_payload(b"secret-1", body);
        assert!(!verify_signature(b"secret-2", body, &sig));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let secret = b"shared-webhook-secret";
        let sig = sign_payload(secret, b"original");
        assert!(!verify_signature(secret, b"tampered", &sig));
    }

    #[test]
    fn test_reserialized_body_rejected() {
        // Verification covers the raw bytes — whitespace-equivalent JSON must
        // not pass.
        let secret = b"shared-webhook-secret";
        let sig = sign_payload(secret, br#"{"value":"1"}"#);
        assert!(!verify_signature(secret, br#"{"value": "1"}"#, &sig));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let sig = sign_payload(b"secret", b"");
        assert!(!verify_signature(b"secret", b"", &sig));
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(!verify_signature(b"secret", b"payload", "%%not-base64%%"));
        assert!(!verify_signature(b"secret", b"payload", ""));
    }
}
