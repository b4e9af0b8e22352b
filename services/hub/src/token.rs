use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::config::VoiceConfig;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_AUDIBLE_DISTANCE: f64 = 2700.0;
pub const MIN_CONVERSATIONAL_DISTANCE: f64 = 90.0;
pub const MIN_AUDIO_FADE_INTENSITY: f64 = 0.1;
pub const DEFAULT_AUDIBLE_DISTANCE: f64 = 8100.0;
pub const DEFAULT_CONVERSATIONAL_DISTANCE: f64 = 270.0;
pub const DEFAULT_AUDIO_FADE_INTENSITY: f64 = 0.5;
pub const DEFAULT_AUDIO_FADE_MODEL: u8 = 1;
pub const DEFAULT_TOKEN_EXPIRATION_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAction {
    Login,
    Join,
    Mute,
    Unmute,
    Kick,
}

impl VoiceAction {
    fn claim(self) -> &'static str {
        match self {
            VoiceAction::Login => "login",
            VoiceAction::Join => "join",
            VoiceAction::Mute => "mute",
            VoiceAction::Unmute => "unmute",
            VoiceAction::Kick => "kick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    Echo,
    LocalPositional,
    Group,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelProperties {
    pub channel_type: ChannelType,
    pub audible_distance: f64,
    pub conversational_distance: f64,
    pub audio_fade_intensity: f64,
    pub audio_fade_model: u8,
}

impl ChannelProperties {
    pub fn positional(
        audible_distance: f64,
        conversational_distance: f64,
        audio_fade_intensity: f64,
        audio_fade_model: u8,
    ) -> Self {
        let audible_distance = if audible_distance <= MIN_AUDIBLE_DISTANCE {
            DEFAULT_AUDIBLE_DISTANCE
        } else {
            audible_distance
        };
        let conversational_distance = if conversational_distance <= MIN_CONVERSATIONAL_DISTANCE {
            DEFAULT_CONVERSATIONAL_DISTANCE
        } else {
            conversational_distance
        };
        let audio_fade_intensity = if audio_fade_intensity <= MIN_AUDIO_FADE_INTENSITY {
            DEFAULT_AUDIO_FADE_INTENSITY
        } else {
            audio_fade_intensity
        };
        Self {
            channel_type: ChannelType::LocalPositional,
            audible_distance,
            conversational_distance,
            audio_fade_intensity,
            audio_fade_model,
        }
    }

    pub fn echo() -> Self {
        Self {
            channel_type: ChannelType::Echo,
            audible_distance: DEFAULT_AUDIBLE_DISTANCE,
            conversational_distance: DEFAULT_CONVERSATIONAL_DISTANCE,
            audio_fade_intensity: DEFAULT_AUDIO_FADE_INTENSITY,
            audio_fade_model: DEFAULT_AUDIO_FADE_MODEL,
        }
    }

    pub fn group() -> Self {
        Self {
            channel_type: ChannelType::Group,
            audible_distance: DEFAULT_AUDIBLE_DISTANCE,
            conversational_distance: DEFAULT_CONVERSATIONAL_DISTANCE,
            audio_fade_intensity: DEFAULT_AUDIO_FADE_INTENSITY,
            audio_fade_model: DEFAULT_AUDIO_FADE_MODEL,
        }
    }
}

/// Independent monotonic serial per action kind. The donor's equivalent has
/// `RequestUnmute` reuse the mute counter -- this implementation keeps the
/// independent counters the distilled spec actually calls for (see
/// DESIGN.md, Open Question 2).
#[derive(Default)]
pub struct SerialCounters {
    login: AtomicU64,
    join: AtomicU64,
    mute: AtomicU64,
    unmute: AtomicU64,
    kick: AtomicU64,
}

impl SerialCounters {
    pub fn new() -> Self {
        Self {
            login: AtomicU64::new(1),
            join: AtomicU64::new(1),
            mute: AtomicU64::new(1),
            unmute: AtomicU64::new(1),
            kick: AtomicU64::new(1),
        }
    }

    fn next(&self, action: VoiceAction) -> u64 {
        let counter = match action {
            VoiceAction::Login => &self.login,
            VoiceAction::Join => &self.join,
            VoiceAction::Mute => &self.mute,
            VoiceAction::Unmute => &self.unmute,
            VoiceAction::Kick => &self.kick,
        };
        counter.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct TokenMinter {
    config: VoiceConfig,
    serials: SerialCounters,
}

impl TokenMinter {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            config,
            serials: SerialCounters::new(),
        }
    }

    pub fn user_uri(&self, user_id: Uuid) -> String {
        format!("sip:.{}.{}.@{}", self.config.issuer, user_id, self.config.domain)
    }

    pub fn channel_uri(&self, channel_id: Uuid, properties: &ChannelProperties) -> String {
        let prefix = match properties.channel_type {
            ChannelType::Echo => "confctl-e-",
            ChannelType::LocalPositional => "confctl-d-",
            ChannelType::Group => "confctl-g-",
        };
        let suffix = match properties.channel_type {
            ChannelType::LocalPositional => format!(
                "!p-{}-{}-{:.3}-{}",
                properties.audible_distance as i64,
                properties.conversational_distance as i64,
                properties.audio_fade_intensity,
                properties.audio_fade_model,
            )
            .replace(',', "."),
            _ => String::new(),
        };
        format!(
            "{prefix}{}.{channel_id}{suffix}@{}",
            self.config.issuer, self.config.domain
        )
    }

    /// Mint a token for `action`. `subject`/`to_uri`/`from_uri` are included
    /// only when non-empty, in that fixed key order, matching the reference
    /// payload layout except that the subject is written under `sub` rather
    /// than a second `vxi` (see DESIGN.md, Open Question 1).
    pub fn mint(
        &self,
        action: VoiceAction,
        subject: Option<&str>,
        to_uri: Option<&str>,
        from_uri: Option<&str>,
    ) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(b"{}");
        let serial = self.serials.next(action);
        let exp = DEFAULT_TOKEN_EXPIRATION_SECS;

        let mut payload = serde_json::Map::new();
        payload.insert("iss".to_owned(), json!(self.config.issuer));
        payload.insert("exp".to_owned(), json!(exp));
        payload.insert("vxa".to_owned(), json!(action.claim()));
        payload.insert("vxi".to_owned(), json!(serial.to_string()));
        if let Some(subject) = subject.filter(|s| !s.is_empty()) {
            payload.insert("sub".to_owned(), json!(subject));
        }
        if let Some(to_uri) = to_uri.filter(|s| !s.is_empty()) {
            payload.insert("t".to_owned(), json!(to_uri));
        }
        if let Some(from_uri) = from_uri.filter(|s| !s.is_empty()) {
            payload.insert("f".to_owned(), json!(from_uri));
        }

        let payload_json = serde_json::to_string(&payload).unwrap_or_default();
        let payload_stripped: String = payload_json.chars().filter(|c| !c.is_whitespace()).collect();
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_stripped.as_bytes());

        let to_sign = format!("{header_b64}.{payload_b64}");
        let mut mac = HmacSha256::new_from_slice(self.config.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(to_sign.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{to_sign}.{signature_b64}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> VoiceConfig {
        VoiceConfig {
            issuer: "issuer1".to_owned(),
            domain: "voice.example.org".to_owned(),
            server: "server1".to_owned(),
            secret: "topsecret".to_owned(),
            base_url: "https://voice.example.org".to_owned(),
            admin_user: "admin".to_owned(),
            admin_pass: "pw".to_owned(),
        }
    }

    #[test]
    fn minted_token_has_three_base64url_segments() {
        let minter = TokenMinter::new(test_config());
        let token = minter.mint(VoiceAction::Login, None, None, None);
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        for part in parts {
            assert!(URL_SAFE_NO_PAD.decode(part).is_ok());
        }
    }

    #[test]
    fn payload_segment_contains_expected_claims_and_sub_not_double_vxi() {
        let minter = TokenMinter::new(test_config());
        let token = minter.mint(VoiceAction::Join, Some("user-123"), None, None);
        let payload_b64 = token.split('.').nth(1).unwrap();
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&payload_bytes).unwrap();
        assert_eq!(payload["iss"], "issuer1");
        assert_eq!(payload["vxa"], "join");
        assert!(payload.get("vxi").is_some());
        assert_eq!(payload["sub"], "user-123");
    }

    #[test]
    fn serial_counters_are_independent_per_action() {
        let minter = TokenMinter::new(test_config());
        let mute_1 = minter.mint(VoiceAction::Mute, None, None, None);
        let unmute_1 = minter.mint(VoiceAction::Unmute, None, None, None);
        let decode_serial = |token: &str| -> String {
            let payload_b64 = token.split('.').nth(1).unwrap();
            let bytes = URL_SAFE_NO_PAD.decode(payload_b64).unwrap();
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            value["vxi"].as_str().unwrap().to_owned()
        };
        // Both start at serial "1" -- they don't share a counter.
        assert_eq!(decode_serial(&mute_1), "1");
        assert_eq!(decode_serial(&unmute_1), "1");
    }

    #[test]
    fn local_positional_channel_uri_substitutes_defaults_below_minimum() {
        let minter = TokenMinter::new(test_config());
        let properties = ChannelProperties::positional(100.0, 10.0, 0.01, 1);
        assert_eq!(properties.audible_distance, DEFAULT_AUDIBLE_DISTANCE);
        assert_eq!(properties.conversational_distance, DEFAULT_CONVERSATIONAL_DISTANCE);
        assert_eq!(properties.audio_fade_intensity, DEFAULT_AUDIO_FADE_INTENSITY);
        let channel_id = Uuid::new_v4();
        let uri = minter.channel_uri(channel_id, &properties);
        assert!(uri.starts_with("confctl-d-issuer1."));
        assert!(uri.contains(&channel_id.to_string()));
    }

    #[test]
    fn echo_channel_uri_has_no_properties_suffix() {
        let minter = TokenMinter::new(test_config());
        let properties = ChannelProperties::echo();
        let channel_id = Uuid::new_v4();
        let uri = minter.channel_uri(channel_id, &properties);
        assert!(uri.starts_with("confctl-e-"));
        assert!(!uri.contains("!p-"));
    }

    #[test]
    fn user_uri_matches_sip_layout() {
        let minter = TokenMinter::new(test_config());
        let user_id = Uuid::new_v4();
        let uri = minter.user_uri(user_id);
        assert_eq!(uri, format!("sip:.issuer1.{user_id}.@voice.example.org"));
    }
}
