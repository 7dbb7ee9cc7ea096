use webhook_engine::{verify_payload, verify_signature};

fn main() {
    // What a receiving endpoint does with an incoming delivery:
    // recompute the HMAC with the shared secret and compare.
    let secret = "whsec_...shared with the endpoint owner...";
    let raw_body = br#"{"id":"evt_1","type":"row.created","data":{},"metadata":{"timestamp":"2026-01-01T00:00:00Z","tenantId":"t1"},"signature":"abcd"}"#;

    if verify_payload(raw_body, secret) {
        println!("payload authentic");
    } else {
        println!("payload rejected");
    }

    // Lower-level form, for receivers that keep the signature out of
    // band and verify the exact raw bytes.
    let signature_header = "abcd";
    let _ = verify_signature(secret, raw_body, signature_header);
}
