// hub-protocol: wire types for the pub/sub RPC hub.
//
// Every message that crosses the transport is an `Envelope`. The tagged-enum
// discrimination this protocol's ancestor used for its message set doesn't
// fit here -- `topic`/`method` together select behavior, and the envelope
// shape itself never varies, so it's one struct, not a tagged enum.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Push / Request / Response, encoded on the wire as a small integer.
///
/// Values are historical bit-flags, not sequential -- carried over from the
/// system this protocol replaces rather than renumbered, since clients
/// already expect these exact integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum EnvelopeType {
    Push = 1,
    Request = 2,
    Response = 4,
}

/// Which of the four RPC topics an envelope belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Topic {
    System = 1,
    Chat = 2,
    Analytics = 4,
    Voice = 8,
}

/// The single message shape carried over the transport.
///
/// `args` and `payload` are omitted from the wire entirely when absent,
/// rather than serialized as explicit `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub topic: Topic,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn push(topic: Topic, method: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: EnvelopeType::Push,
            topic,
            method: method.into(),
            args: None,
            payload: Some(payload),
        }
    }

    pub fn request(topic: Topic, method: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: EnvelopeType::Request,
            topic,
            method: method.into(),
            args: Some(args),
            payload: None,
        }
    }

    pub fn response_to(
        id: Uuid,
        topic: Topic,
        method: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            kind: EnvelopeType::Response,
            topic,
            method: method.into(),
            args: None,
            payload: Some(payload),
        }
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Offline,
    Available,
    Away,
    Playing,
}

/// Invariant enforced by every mutation path: `status == Offline` iff both
/// `space_id` and `server_id` are absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<Uuid>,
}

impl Presence {
    pub fn offline() -> Self {
        Self {
            status: PresenceStatus::Offline,
            space_id: None,
            server_id: None,
        }
    }

    pub fn is_consistent(&self) -> bool {
        (self.status == PresenceStatus::Offline)
            == (self.space_id.is_none() && self.server_id.is_none())
    }
}

// ---------------------------------------------------------------------------
// Entity records (wire-facing shape; the store owns the authoritative copy)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "map")]
    pub map_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub host: String,
    pub port: u16,
    pub space_id: Uuid,
    pub public: bool,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Frozen v1 error codes.
pub mod error_codes {
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const IDENTITY_MISMATCH: &str = "IDENTITY_MISMATCH";
    pub const INTEGRITY_CONFLICT: &str = "INTEGRITY_CONFLICT";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Protocol error message (server -> client), pushed on the System topic.
///
/// | Code                | Retryable |
/// |---------------------|-----------|
/// | PROTOCOL_ERROR      | false     |
/// | IDENTITY_MISMATCH   | false     |
/// | INTEGRITY_CONFLICT  | false     |
/// | INTERNAL_ERROR      | true      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorMessage {
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::PROTOCOL_ERROR.to_owned(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn identity_mismatch(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::IDENTITY_MISMATCH.to_owned(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn integrity_conflict(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INTEGRITY_CONFLICT.to_owned(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            code: error_codes::INTERNAL_ERROR.to_owned(),
            message: message.into(),
            retryable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_offline_is_consistent_only_without_location() {
        assert!(Presence::offline().is_consistent());
        let inconsistent = Presence {
            status: PresenceStatus::Offline,
            space_id: Some(Uuid::new_v4()),
            server_id: None,
        };
        assert!(!inconsistent.is_consistent());
    }

    #[test]
    fn envelope_omits_absent_args_and_payload() {
        let env = Envelope::push(Topic::Chat, "userJoinedChannel", serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("args").is_none());
        assert!(json.get("payload").is_some());
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = Envelope::request(Topic::System, "connect", serde_json::json!({"key": "abc"}));
        let json = serde_json::to_string(&env).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.method, "connect");
        assert_eq!(back.topic, Topic::System);
        assert_eq!(back.kind, EnvelopeType::Request);
    }

    #[test]
    fn envelope_type_and_topic_use_historical_bit_flag_values() {
        assert_eq!(serde_json::to_value(EnvelopeType::Push).unwrap(), 1);
        assert_eq!(serde_json::to_value(EnvelopeType::Request).unwrap(), 2);
        assert_eq!(serde_json::to_value(EnvelopeType::Response).unwrap(), 4);
        assert_eq!(serde_json::to_value(Topic::System).unwrap(), 1);
        assert_eq!(serde_json::to_value(Topic::Chat).unwrap(), 2);
        assert_eq!(serde_json::to_value(Topic::Analytics).unwrap(), 4);
        assert_eq!(serde_json::to_value(Topic::Voice).unwrap(), 8);
    }
}
