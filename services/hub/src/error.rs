use hub_protocol::ErrorMessage;

/// Crate-level error type. Constructed at the seams (entity store I/O, voice
/// HTTP calls, token construction) and converted to a wire-level
/// `ErrorMessage` at the dispatch boundary -- internal code still propagates
/// with `?`, it never panics outside of process-bootstrap `.expect()` calls
/// on required configuration.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("malformed envelope: {0}")]
    Protocol(String),

    #[error("identity mismatch: {0}")]
    IdentityMismatch(String),

    #[error("channel resolution failed: {0}")]
    ChannelResolution(String),

    #[error("entity store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("voice service request failed: {0}")]
    VoiceHttp(#[from] reqwest::Error),

    #[error("voice service returned unparsable response: {0}")]
    VoiceXml(#[from] serde_xml_rs::Error),

    #[error("voice service returned a non-OK status: {0}")]
    VoiceStatus(String),
}

impl HubError {
    pub fn to_wire(&self) -> ErrorMessage {
        match self {
            HubError::Protocol(msg) => ErrorMessage::protocol_error(msg),
            HubError::IdentityMismatch(msg) => ErrorMessage::identity_mismatch(msg),
            HubError::ChannelResolution(msg) => ErrorMessage::integrity_conflict(msg),
            HubError::Store(err) => ErrorMessage::internal_error(err.to_string()),
            HubError::VoiceHttp(err) => ErrorMessage::internal_error(err.to_string()),
            HubError::VoiceXml(err) => ErrorMessage::internal_error(err.to_string()),
            HubError::VoiceStatus(msg) => ErrorMessage::internal_error(msg),
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_maps_to_non_retryable_protocol_code() {
        let err = HubError::Protocol("bad json".to_owned());
        let wire = err.to_wire();
        assert_eq!(wire.code, hub_protocol::error_codes::PROTOCOL_ERROR);
        assert!(!wire.retryable);
    }

    #[test]
    fn voice_status_error_maps_to_retryable_internal_code() {
        let err = HubError::VoiceStatus("FAIL".to_owned());
        let wire = err.to_wire();
        assert_eq!(wire.code, hub_protocol::error_codes::INTERNAL_ERROR);
        assert!(wire.retryable);
    }
}
