//! Inbound user events and their payload shapes.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Event Kind Constants
// ============================================================================

/// Routing tags carried in the `type` field of an inbound event.
pub struct EventKind;

impl EventKind {
    pub const USER_REGISTERED: &str = "USER_REGISTERED";
    pub const PASSWORD_CHANGED: &str = "PASSWORD_CHANGED";
    pub const OTP_REQUESTED: &str = "OTP_REQUESTED";
    pub const USER_LOGIN: &str = "USER_LOGIN";
    pub const USER_VERIFIED: &str = "USER_VERIFIED";
}

// ============================================================================
// Envelope
// ============================================================================

/// Envelope read from the inbound topic.
///
/// The payload stays an opaque JSON document until a handler that understands
/// `kind` decodes it with [`InboundEvent::decode_payload`]. Missing fields take
/// their zero value (empty strings, the Unix epoch) instead of failing the
/// decode; only a body that is not a JSON object of this shape is malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    #[serde(default)]
    pub id: String,
    /// Routing key.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Producing service, informational only.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl InboundEvent {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            source: String::new(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Decode the payload into a kind-specific structure.
    ///
    /// An absent or `null` payload decodes like an empty object.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Value::Null => T::deserialize(&Value::Object(Map::new())),
            payload => T::deserialize(payload),
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Contact details shared by every user event.
///
/// Used as-is by `PASSWORD_CHANGED`, `USER_LOGIN` and `USER_VERIFIED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
}

/// Payload of `USER_REGISTERED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegisteredData {
    #[serde(flatten)]
    pub user: UserData,
    /// Activation link included in the welcome message.
    #[serde(default)]
    pub url: String,
}

/// Payload of `OTP_REQUESTED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRequestedData {
    #[serde(flatten)]
    pub user: UserData,
    #[serde(rename = "url-recovery", default)]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_inbound_event() {
        let message = r#"
        {
            "id": "evt-1",
            "type": "USER_REGISTERED",
            "source": "user-service",
            "timestamp": "2024-05-01T10:00:00Z",
            "payload": {
                "id": 42,
                "email": "ana@example.com",
                "name": "Ana",
                "phone": "+5491100000000",
                "url": "https://example.com/activate"
            }
        }
        "#;
        let event: InboundEvent = serde_json::from_str(message).unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.kind, EventKind::USER_REGISTERED);
        assert_eq!(event.source, "user-service");

        let data: UserRegisteredData = event.decode_payload().unwrap();
        assert_eq!(data.user.id, 42);
        assert_eq!(data.user.email, "ana@example.com");
        assert_eq!(data.url, "https://example.com/activate");
    }

    #[test]
    fn test_source_and_payload_are_optional() {
        let message = r#"{"id": "evt-2", "type": "USER_LOGIN", "timestamp": "2024-05-01T10:00:00+02:00"}"#;
        let event: InboundEvent = serde_json::from_str(message).unwrap();
        assert!(event.source.is_empty());
        assert_eq!(event.payload, Value::Null);
    }

    #[test]
    fn test_missing_id_and_timestamp_take_zero_values() {
        let message = r#"{"type": "USER_LOGIN", "payload": {}}"#;
        let event: InboundEvent = serde_json::from_str(message).unwrap();
        assert!(event.id.is_empty());
        assert_eq!(event.timestamp, DateTime::<Utc>::default());
        assert_eq!(event.timestamp.timestamp(), 0);
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        assert!(serde_json::from_str::<InboundEvent>("[1, 2]").is_err());
        assert!(serde_json::from_str::<InboundEvent>(r#"{"id": 7}"#).is_err());
    }

    #[test]
    fn test_otp_payload_uses_hyphenated_url() {
        let event = InboundEvent::new(
            "evt-4",
            EventKind::OTP_REQUESTED,
            serde_json::json!({"id": 7, "email": "a@b.c", "url-recovery": "https://r"}),
        );
        let data: OtpRequestedData = event.decode_payload().unwrap();
        assert_eq!(data.url, "https://r");
        assert!(data.user.phone.is_empty());
    }

    #[test]
    fn test_payload_without_user_id_decodes_as_zero() {
        let event = InboundEvent::new(
            "evt-5",
            EventKind::USER_VERIFIED,
            serde_json::json!({"email": "a@b.c"}),
        );
        let user: UserData = event.decode_payload().unwrap();
        assert_eq!(user.id, 0);
        assert_eq!(user.email, "a@b.c");
    }

    #[test]
    fn test_null_payload_decodes_as_empty() {
        let event = InboundEvent::new("evt-6", EventKind::USER_VERIFIED, Value::Null);
        let user: UserData = event.decode_payload().unwrap();
        assert_eq!(user.id, 0);
        assert!(user.email.is_empty());
    }

    #[test]
    fn test_mistyped_payload_fails_to_decode() {
        let event = InboundEvent::new(
            "evt-7",
            EventKind::USER_VERIFIED,
            serde_json::json!({"id": "not-a-number"}),
        );
        assert!(event.decode_payload::<UserData>().is_err());
    }
}
