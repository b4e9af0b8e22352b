use serde::Deserialize;

use crate::config::VoiceConfig;
use crate::error::{HubError, HubResult};

/// Speaks the voice service's server-to-server back-channel: form-encoded
/// POSTs, XML responses. Only the request/response shape is specified (the
/// voice service itself is an external collaborator, §6) so the field names
/// below are this hub's side of that contract, not a reverse-engineering of
/// any particular vendor.
pub struct VoiceClient {
    http: reqwest::Client,
    config: VoiceConfig,
}

#[derive(Debug, Deserialize)]
struct XmlResponse {
    #[serde(rename = "Level0")]
    level0: Level0,
}

#[derive(Debug, Deserialize)]
struct Level0 {
    #[serde(rename = "Status")]
    status: Status,
    #[serde(rename = "Body", default)]
    body: Option<Body>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(rename = "$value")]
    value: String,
}

#[derive(Debug, Deserialize, Default)]
struct Body {
    #[serde(rename = "AuthToken", default)]
    auth_token: Option<String>,
}

impl VoiceClient {
    pub fn new(config: VoiceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Admin login. Performed lazily before every moderation action -- there
    /// is no cached admin session, matching the reference implementation's
    /// choice to re-authenticate on every mute/unmute/kick rather than
    /// caching a login that could silently expire mid-session.
    pub async fn login(&self) -> HubResult<String> {
        let url = format!("{}/api2/viv_signin.php", self.config.base_url);
        let body = [
            ("user", self.config.admin_user.as_str()),
            ("pwd", self.config.admin_pass.as_str()),
            ("domain", self.config.domain.as_str()),
        ];
        let response = self.http.post(&url).form(&body).send().await?;
        let xml = response.text().await?;
        let parsed: XmlResponse = serde_xml_rs::from_str(&xml)?;
        if parsed.level0.status.value != "OK" {
            return Err(HubError::VoiceStatus(parsed.level0.status.value));
        }
        parsed
            .level0
            .body
            .and_then(|b| b.auth_token)
            .ok_or_else(|| HubError::VoiceStatus("login response missing auth token".to_owned()))
    }

    async fn channel_command(
        &self,
        access_token: &str,
        auth_token: &str,
        chan_uri: &str,
        user_uri: &str,
        mode: &str,
    ) -> HubResult<()> {
        let url = format!("{}/api2/viv_chan_cmd.php", self.config.base_url);
        let body = [
            ("access_token", access_token),
            ("auth_token", auth_token),
            ("chan_uri", chan_uri),
            ("user_uri", user_uri),
            ("mode", mode),
        ];
        let response = self.http.post(&url).form(&body).send().await?;
        let xml = response.text().await?;
        let parsed: XmlResponse = serde_xml_rs::from_str(&xml)?;
        if parsed.level0.status.value != "OK" {
            return Err(HubError::VoiceStatus(parsed.level0.status.value));
        }
        Ok(())
    }

    pub async fn mute(&self, access_token: &str, chan_uri: &str, user_uri: &str) -> HubResult<()> {
        let auth_token = self.login().await?;
        self.channel_command(access_token, &auth_token, chan_uri, user_uri, "mute")
            .await
    }

    pub async fn unmute(&self, access_token: &str, chan_uri: &str, user_uri: &str) -> HubResult<()> {
        let auth_token = self.login().await?;
        self.channel_command(access_token, &auth_token, chan_uri, user_uri, "unmute")
            .await
    }

    pub async fn kick(&self, access_token: &str, chan_uri: &str, user_uri: &str) -> HubResult<()> {
        let auth_token = self.login().await?;
        self.channel_command(access_token, &auth_token, chan_uri, user_uri, "kick")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_response_parses_ok_login_with_auth_token() {
        let xml = r#"<Response><Level0><Status>OK</Status><Body><AuthToken>abc123</AuthToken></Body></Level0></Response>"#;
        let parsed: XmlResponse = serde_xml_rs::from_str(xml).unwrap();
        assert_eq!(parsed.level0.status.value, "OK");
        assert_eq!(parsed.level0.body.unwrap().auth_token.unwrap(), "abc123");
    }

    #[test]
    fn xml_response_parses_failure_status_without_body() {
        let xml = r#"<Response><Level0><Status>FAIL</Status></Level0></Response>"#;
        let parsed: XmlResponse = serde_xml_rs::from_str(xml).unwrap();
        assert_eq!(parsed.level0.status.value, "FAIL");
        assert!(parsed.level0.body.is_none());
    }
}
