pub mod action;
pub mod channel;
pub mod connect;
pub mod presence;
pub mod voice;

use uuid::Uuid;

use crate::error::{HubError, HubResult};

/// Pulls a required string field out of an envelope's `args` object.
pub(crate) fn require_str<'a>(args: &'a serde_json::Value, key: &str) -> HubResult<&'a str> {
    args.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| HubError::Protocol(format!("args.{key} missing or not a string")))
}

pub(crate) fn require_uuid(args: &serde_json::Value, key: &str) -> HubResult<Uuid> {
    let raw = require_str(args, key)?;
    Uuid::parse_str(raw).map_err(|_| HubError::Protocol(format!("args.{key} is not a uuid")))
}

pub(crate) fn optional_uuid(args: &serde_json::Value, key: &str) -> Option<Uuid> {
    args.get(key).and_then(serde_json::Value::as_str).and_then(|raw| Uuid::parse_str(raw).ok())
}

pub(crate) fn require_args(envelope: &hub_protocol::Envelope) -> HubResult<&serde_json::Value> {
    envelope
        .args
        .as_ref()
        .ok_or_else(|| HubError::Protocol("envelope is missing args".to_owned()))
}
