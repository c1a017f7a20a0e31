use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors produced by the common-signature helpers.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid HMAC key")]
    InvalidKey,
}

/// Hex HMAC-SHA256 digest of `payload` under `secret`.
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of an expected hex digest against a provided one.
/// Accepts an optional `sha256=` prefix on the provided value.
pub fn digests_match(expected_hex: &str, provided: &str) -> bool {
    let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
    ConstantTimeEq::ct_eq(expected_hex.as_bytes(), provided.as_bytes()).unwrap_u8() == 1
}

/// Client-path payment signature: HMAC over `"{order_ref}|{payment_ref}"`.
pub fn payment_signature(
    key_secret: &str,
    gateway_order_ref: &str,
    gateway_payment_ref: &str,
) -> Result<String, SignatureError> {
    let canonical = format!("{}|{}", gateway_order_ref, gateway_payment_ref);
    hmac_sha256_hex(key_secret.as_bytes(), canonical.as_bytes())
}

/// Verify a client-submitted payment signature in constant time.
pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_ref: &str,
    gateway_payment_ref: &str,
    provided: &str,
) -> bool {
    match payment_signature(key_secret, gateway_order_ref, gateway_payment_ref) {
        Ok(expected) => digests_match(&expected, provided),
        Err(_) => false,
    }
}

/// Verify a webhook signature computed over the raw, unparsed request body.
/// Re-serializing parsed JSON before hashing yields a different digest, so
/// callers must pass the exact bytes received on the wire.
pub fn verify_webhook_signature(webhook_secret: &str, raw_body: &[u8], provided: &str) -> bool {
    match hmac_sha256_hex(webhook_secret.as_bytes(), raw_body) {
        Ok(expected) => digests_match(&expected, provided),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_signature_round_trip() {
        let sig = payment_signature("secret", "order_abc", "pay_xyz").expect("sign");
        assert!(verify_payment_signature("secret", "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn payment_signature_rejects_wrong_secret() {
        let sig = payment_signature("secret", "order_abc", "pay_xyz").expect("sign");
        assert!(!verify_payment_signature("other", "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn payment_signature_rejects_swapped_refs() {
        let sig = payment_signature("secret", "order_abc", "pay_xyz").expect("sign");
        assert!(!verify_payment_signature("secret", "pay_xyz", "order_abc", &sig));
    }

    #[test]
    fn webhook_signature_round_trip() {
        let body = br#"{"id":"evt_1","event":"payment.captured"}"#;
        let sig = hmac_sha256_hex(b"whsec", body).expect("sign");
        assert!(verify_webhook_signature("whsec", body, &sig));
        assert!(verify_webhook_signature("whsec", body, &format!("sha256={}", sig)));
    }

    #[test]
    fn webhook_signature_rejects_mutated_body() {
        let body = br#"{"id":"evt_1","event":"payment.captured"}"#;
        let sig = hmac_sha256_hex(b"whsec", body).expect("sign");
        let mut mutated = body.to_vec();
        mutated[0] ^= 0x01;
        assert!(!verify_webhook_signature("whsec", &mutated, &sig));
    }

    #[test]
    fn webhook_signature_rejects_mutated_signature() {
        let body = br#"{"id":"evt_1","event":"payment.captured"}"#;
        let mut sig = hmac_sha256_hex(b"whsec", body).expect("sign");
        let flipped = if sig.ends_with('0') { '1' } else { '0' };
        sig.pop();
        sig.push(flipped);
        assert!(!verify_webhook_signature("whsec", body, &sig));
    }

    #[test]
    fn reserialized_json_does_not_verify() {
        // Same JSON value, different byte layout: must not verify.
        let raw = br#"{"id":"evt_1","event":"payment.captured"}"#;
        let pretty = br#"{ "id": "evt_1", "event": "payment.captured" }"#;
        let sig = hmac_sha256_hex(b"whsec", raw).expect("sign");
        assert!(!verify_webhook_signature("whsec", pretty, &sig));
    }
}
