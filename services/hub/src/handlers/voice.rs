use std::sync::Arc;

use hub_protocol::{Envelope, Topic};
use serde_json::json;
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::handlers::{presence, require_args};
use crate::session::SessionState;
use crate::state::HubState;
use crate::token::{
    ChannelProperties, VoiceAction, DEFAULT_AUDIBLE_DISTANCE, DEFAULT_AUDIO_FADE_INTENSITY,
    DEFAULT_AUDIO_FADE_MODEL, DEFAULT_CONVERSATIONAL_DISTANCE,
};

/// Every Voice request nests its fields under `args.vivoxPayload` rather
/// than flattening them onto `args` directly.
fn vivox_payload(envelope: &Envelope) -> HubResult<&serde_json::Value> {
    require_args(envelope)?
        .get("vivoxPayload")
        .ok_or_else(|| HubError::Protocol("args.vivoxPayload missing".to_owned()))
}

fn require_payload_uuid(payload: &serde_json::Value, key: &str) -> HubResult<Uuid> {
    let raw = payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| HubError::Protocol(format!("vivoxPayload.{key} missing or not a string")))?;
    Uuid::parse_str(raw).map_err(|_| HubError::Protocol(format!("vivoxPayload.{key} is not a uuid")))
}

fn require_channel_properties(payload: &serde_json::Value) -> HubResult<&serde_json::Value> {
    payload
        .get("channelProperties")
        .ok_or_else(|| HubError::Protocol("vivoxPayload.channelProperties missing".to_owned()))
}

fn channel_properties(properties: &serde_json::Value) -> ChannelProperties {
    let channel_type = properties
        .get("channelType")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("group");
    match channel_type {
        "echo" => ChannelProperties::echo(),
        "localPositional" | "positional" => {
            let audible = properties
                .get("audibleDistance")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_AUDIBLE_DISTANCE);
            let conversational = properties
                .get("conversationalDistance")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_CONVERSATIONAL_DISTANCE);
            let intensity = properties
                .get("audioFadeIntensity")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_AUDIO_FADE_INTENSITY);
            let model = properties
                .get("audioFadeModel")
                .and_then(serde_json::Value::as_u64)
                .map(|v| v as u8)
                .unwrap_or(DEFAULT_AUDIO_FADE_MODEL);
            ChannelProperties::positional(audible, conversational, intensity, model)
        }
        _ => ChannelProperties::group(),
    }
}

pub async fn login(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let user_id = presence::current_user_id(session).await?;
    let token = hub_state
        .minter
        .mint(VoiceAction::Login, Some(&user_id.to_string()), None, None);
    let user_uri = hub_state.minter.user_uri(user_id);
    respond(envelope, session, json!({ "token": token, "userUri": user_uri })).await;
    Ok(())
}

pub async fn join(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let payload = vivox_payload(envelope)?;
    let user_id = presence::current_user_id(session).await?;
    let properties_obj = require_channel_properties(payload)?;
    let channel_id = require_payload_uuid(properties_obj, "id")?;
    let properties = channel_properties(properties_obj);

    let user_uri = hub_state.minter.user_uri(user_id);
    let channel_uri = hub_state.minter.channel_uri(channel_id, &properties);
    let token = hub_state.minter.mint(
        VoiceAction::Join,
        Some(&user_id.to_string()),
        Some(&channel_uri),
        Some(&user_uri),
    );

    respond(
        envelope,
        session,
        json!({ "token": token, "channelUri": channel_uri, "userUri": user_uri }),
    )
    .await;
    Ok(())
}

/// Shared tail of mute/unmute/kick: mint a fresh access token for the
/// action, then place the server-to-server call against the voice service.
async fn moderate(
    envelope: &Envelope,
    hub_state: &HubState,
    session: &Arc<SessionState>,
    action: VoiceAction,
) -> HubResult<()> {
    let payload = vivox_payload(envelope)?;
    let user_id = presence::current_user_id(session).await?;
    let target_id = require_payload_uuid(payload, "sub")?;
    let properties_obj = require_channel_properties(payload)?;
    let channel_id = require_payload_uuid(properties_obj, "id")?;
    let properties = channel_properties(properties_obj);

    let channel_uri = hub_state.minter.channel_uri(channel_id, &properties);
    let target_uri = hub_state.minter.user_uri(target_id);
    let access_token = hub_state.minter.mint(
        action,
        Some(&user_id.to_string()),
        Some(&channel_uri),
        Some(&target_uri),
    );

    match action {
        VoiceAction::Mute => hub_state.voice.mute(&access_token, &channel_uri, &target_uri).await?,
        VoiceAction::Unmute => {
            hub_state
                .voice
                .unmute(&access_token, &channel_uri, &target_uri)
                .await?
        }
        VoiceAction::Kick => hub_state.voice.kick(&access_token, &channel_uri, &target_uri).await?,
        VoiceAction::Login | VoiceAction::Join => unreachable!("moderate is only called with mute/unmute/kick"),
    }

    respond(envelope, session, json!({ "status": "ok" })).await;
    Ok(())
}

pub async fn mute(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    moderate(envelope, hub_state, session, VoiceAction::Mute).await
}

pub async fn unmute(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    moderate(envelope, hub_state, session, VoiceAction::Unmute).await
}

pub async fn kick(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    moderate(envelope, hub_state, session, VoiceAction::Kick).await
}

async fn respond(envelope: &Envelope, session: &Arc<SessionState>, payload: serde_json::Value) {
    let response = Envelope::response_to(envelope.id, Topic::Voice, envelope.method.clone(), payload);
    session.send(response).await;
}
