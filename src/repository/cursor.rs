//! Opaque listing cursor.
//!
//! Encoded as URL-safe base64 (no padding) over the JSON object
//! `{"created_at": <ISO-8601 UTC>, "id": <UUID>}`. Clients treat the value
//! as opaque; any decoding failure is an invariant violation.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{LedgerError, LedgerResult};

/// Keyset position within a `(created_at ASC, id ASC)` ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl PageCursor {
    pub fn new(created_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn encode(&self) -> LedgerResult<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| LedgerError::invariant("invalid cursor"))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn decode(input: &str) -> LedgerResult<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| LedgerError::invariant("invalid cursor"))?;
        serde_json::from_slice(&bytes).map_err(|_| LedgerError::invariant("invalid cursor"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_round_trip() {
        let cursor = PageCursor::new(Utc::now(), Uuid::new_v4());
        let encoded = cursor.encode().unwrap();
        let decoded = PageCursor::decode(&encoded).unwrap();
        assert_eq!(decoded, cursor);
    }

    #[test]
    fn test_cursor_wire_field_names() {
        let cursor = PageCursor::new(
            "2026-01-02T03:04:05Z".parse().unwrap(),
            "550e8400-e29b-41d4-a716-446655440000".parse().unwrap(),
        );
        let encoded = cursor.encode().unwrap();
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(json.get("created_at").is_some());
        assert_eq!(
            json["id"].as_str().unwrap(),
            "550e8400-e29b-41d4-a716-446655440000"
        );
    }

    #[test]
    fn test_bad_base64_rejected() {
        let err = PageCursor::decode("not base64!!").unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");
    }

    #[test]
    fn test_bad_json_rejected() {
        let garbage = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"not json");
        assert!(PageCursor::decode(&garbage).is_err());
    }

    #[test]
    fn test_missing_fields_rejected() {
        let partial =
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(br#"{"id":"550e8400-e29b-41d4-a716-446655440000"}"#);
        assert!(PageCursor::decode(&partial).is_err());
    }

    #[test]
    fn test_unparseable_date_rejected() {
        let bad = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(
            br#"{"created_at":"yesterday","id":"550e8400-e29b-41d4-a716-446655440000"}"#,
        );
        assert!(PageCursor::decode(&bad).is_err());
    }
}
