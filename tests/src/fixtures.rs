//! Test fixtures and payload generators.

use bytes::Bytes;
use chrono::Utc;
use integrations::sign_payload;
use router_core::RegionCode;

/// Secret the mock billing provider verifies webhooks with.
pub const WEBHOOK_SECRET: &str = "whsec_integration";

/// Admin address alerts go to in the test context.
pub const ADMIN_EMAIL: &str = "ops@example.com";

pub fn region(code: &str) -> RegionCode {
    RegionCode::new(code).unwrap()
}

/// Uncompressed PDF-ish bytes with the postal code in the text.
pub fn lead_document(postal_code: &str) -> Bytes {
    Bytes::from(format!(
        "%PDF-1.4\nBT /F1 12 Tf (Interessent: Erika Mustermann) Tj \
         (Musterweg 12, {postal_code} Berlin) Tj ET\n%%EOF"
    ))
}

/// A document with no postal code anywhere.
pub fn document_without_code() -> Bytes {
    Bytes::from_static(b"%PDF-1.4\nBT (Rueckruf erbeten) Tj ET\n%%EOF")
}

/// Billing event body in the provider's format.
pub fn billing_event(event_type: &str, customer: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": { "customer": customer } }
    })
    .to_string()
    .into_bytes()
}

/// Signature header for `body` signed now with [`WEBHOOK_SECRET`].
pub fn signature_for(body: &[u8]) -> String {
    sign_payload(body, WEBHOOK_SECRET, Utc::now().timestamp()).unwrap()
}
