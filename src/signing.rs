use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::types::WebhookPayload;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";
const SECRET_BYTES: usize = 32;

/// Generate a fresh endpoint signing secret: 32 cryptographically
/// random bytes, hex-encoded with a recognizable prefix.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{}{}", SECRET_PREFIX, hex::encode(bytes))
}

/// Truncated secret for listings. The full value is shown once, at
/// endpoint creation.
pub fn secret_preview(secret: &str) -> String {
    let shown: String = secret.chars().take(12).collect();
    format!("{}…", shown)
}

/// Compute the hex HMAC-SHA256 of `body` keyed by `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"-").expect("hmac accepts any key length"));
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a received signature against the exact raw request body.
///
/// Comparison happens in constant time to prevent timing
/// side-channels. Returns `false` for malformed hex.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"-").expect("hmac accepts any key length"));
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Sign a wire payload in place.
///
/// The signature covers the canonical JSON serialization of the
/// payload with the signature field absent, keyed by the endpoint
/// secret. Receivers verify by recomputing the HMAC over the same
/// serialization.
pub fn sign_payload(payload: &mut WebhookPayload, secret: &str) {
    payload.signature = None;
    let canonical = serde_json::to_vec(payload).unwrap_or_default();
    payload.signature = Some(compute_signature(secret, &canonical));
}

/// Receiver-side verification of a delivered request body.
///
/// Parses the body as a [`WebhookPayload`], strips the embedded
/// signature, and verifies it against the canonical serialization of
/// the remainder. Returns `false` for bodies that do not parse, carry
/// no signature, or fail the constant-time comparison.
pub fn verify_payload(raw_body: &[u8], secret: &str) -> bool {
    let Ok(mut payload) = serde_json::from_slice::<WebhookPayload>(raw_body) else {
        return false;
    };
    let Some(signature) = payload.signature.take() else {
        return false;
    };
    let canonical = serde_json::to_vec(&payload).unwrap_or_default();
    verify_signature(secret, &canonical, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventId, EventMetadata, EventType, TenantId};
    use chrono::Utc;

    fn sample_payload() -> WebhookPayload {
        WebhookPayload {
            id: EventId("evt_abc".into()),
            event_type: EventType::RowCreated,
            data: serde_json::json!({"table": "orders", "row_id": 42}),
            metadata: EventMetadata {
                timestamp: Utc::now(),
                tenant_id: TenantId("tenant_a".into()),
                user_id: Some("user_1".into()),
                request_id: None,
            },
            signature: None,
        }
    }

    #[test]
    fn generated_secrets_are_unique_and_long_enough() {
        let a = generate_secret();
        let b = generate_secret();
        assert_ne!(a, b);
        assert!(a.starts_with(SECRET_PREFIX));
        // prefix + 32 bytes hex
        assert_eq!(a.len(), SECRET_PREFIX.len() + SECRET_BYTES * 2);
    }

    #[test]
    fn preview_truncates() {
        let secret = generate_secret();
        let preview = secret_preview(&secret);
        assert!(preview.len() < secret.len());
        assert!(secret.starts_with(preview.trim_end_matches('…')));
    }

    #[test]
    fn signature_round_trip() {
        let secret = generate_secret();
        let body = br#"{"id":"evt_1","type":"row.created"}"#;
        let sig = compute_signature(&secret, body);
        assert!(verify_signature(&secret, body, &sig));
    }

    #[test]
    fn single_byte_mutation_fails_verification() {
        let secret = generate_secret();
        let body = b"{\"id\":\"evt_1\",\"type\":\"row.created\"}".to_vec();
        let sig = compute_signature(&secret, &body);

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(
                !verify_signature(&secret, &tampered, &sig),
                "mutation at byte {} verified",
                i
            );
        }
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = b"payload";
        let sig = compute_signature(&generate_secret(), body);
        assert!(!verify_signature(&generate_secret(), body, &sig));
    }

    #[test]
    fn malformed_hex_fails_verification() {
        assert!(!verify_signature("whsec_x", b"payload", "not-hex!"));
    }

    #[test]
    fn signed_payload_verifies_against_unsigned_serialization() {
        let secret = generate_secret();
        let mut payload = sample_payload();
        sign_payload(&mut payload, &secret);

        let signature = payload.signature.take().expect("signed");
        let canonical = serde_json::to_vec(&payload).unwrap();
        assert!(verify_signature(&secret, &canonical, &signature));
    }

    #[test]
    fn signed_body_passes_receiver_verification() {
        let secret = generate_secret();
        let mut payload = sample_payload();
        sign_payload(&mut payload, &secret);
        let body = serde_json::to_vec(&payload).unwrap();

        assert!(verify_payload(&body, &secret));
        assert!(!verify_payload(&body, &generate_secret()));
    }

    #[test]
    fn tampered_body_fails_receiver_verification() {
        let secret = generate_secret();
        let mut payload = sample_payload();
        sign_payload(&mut payload, &secret);
        let body = String::from_utf8(serde_json::to_vec(&payload).unwrap()).unwrap();

        let tampered = body.replacen("orders", "Orders", 1);
        assert_ne!(body, tampered);
        assert!(!verify_payload(tampered.as_bytes(), &secret));
    }
}
