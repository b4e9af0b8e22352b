use std::sync::Arc;

use hub_protocol::{Envelope, Presence, Topic};
use serde_json::json;
use uuid::Uuid;

use crate::channel::ChannelCategory;
use crate::error::{HubError, HubResult};
use crate::handlers::{presence, require_args, require_str, require_uuid};
use crate::session::SessionState;
use crate::state::HubState;

fn category_str(category: ChannelCategory) -> &'static str {
    match category {
        ChannelCategory::System => "system",
        ChannelCategory::General => "general",
        ChannelCategory::Space => "space",
        ChannelCategory::Server => "server",
        ChannelCategory::Private => "private",
    }
}

/// Resolves a subscribe target through the cascade: well-known channels,
/// already-materialized space/server channels, an existing-or-new private
/// pairing, then a fresh entity-store lookup that materializes on success.
/// `args.channelId` is the single overloaded field throughout -- a
/// well-known or space/server id, or another currently-online user's id
/// for private pairing. There is no separate field for any of these cases.
async fn resolve(
    hub_state: &HubState,
    self_user_id: Uuid,
    args: &serde_json::Value,
) -> HubResult<(Uuid, ChannelCategory)> {
    let channel_id = require_uuid(args, "channelId")?;

    let (system, general) = hub_state.hub.well_known_channels().await;
    if channel_id == system {
        return Ok((channel_id, ChannelCategory::System));
    }
    if channel_id == general {
        return Ok((channel_id, ChannelCategory::General));
    }
    if hub_state.hub.is_space_materialized(channel_id).await {
        return Ok((channel_id, ChannelCategory::Space));
    }
    if hub_state.hub.is_server_materialized(channel_id).await {
        return Ok((channel_id, ChannelCategory::Server));
    }
    if channel_id == self_user_id {
        return Err(HubError::ChannelResolution(
            "can not subscribe user to self".to_owned(),
        ));
    }
    if hub_state.hub.is_user_online(channel_id).await {
        let paired = hub_state.hub.materialize_private(self_user_id, channel_id).await;
        return Ok((paired, ChannelCategory::Private));
    }
    if hub_state.store.get_space(channel_id).await?.is_some() {
        hub_state.hub.materialize_space(channel_id).await;
        return Ok((channel_id, ChannelCategory::Space));
    }
    if hub_state.store.get_server(channel_id).await?.is_some() {
        hub_state.hub.materialize_server(channel_id).await;
        return Ok((channel_id, ChannelCategory::Server));
    }

    Err(HubError::ChannelResolution(
        "no channel matched the subscribe cascade".to_owned(),
    ))
}

pub async fn subscribe(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let user_id = presence::current_user_id(session).await?;
    let (channel_id, category) = resolve(hub_state, user_id, args).await?;

    session.subscriptions.lock().await.insert(channel_id);
    hub_state.hub.join(channel_id, session.session_id).await;

    if matches!(category, ChannelCategory::Space | ChannelCategory::Server) {
        let current = session
            .user
            .read()
            .await
            .as_ref()
            .map(|u| u.presence)
            .unwrap_or_else(Presence::offline);
        let mut next = current;
        match category {
            ChannelCategory::Space => next.space_id = Some(channel_id),
            ChannelCategory::Server => next.server_id = Some(channel_id),
            _ => unreachable!("guarded above"),
        }
        presence::apply(hub_state, session, next).await?;
    }

    let push = Envelope::push(
        Topic::Chat,
        "userJoined",
        json!({
            "userId": user_id,
            "channelId": channel_id,
            "channelCategory": category_str(category),
        }),
    );
    hub_state.hub.broadcast(channel_id, push, Some(session.session_id)).await;

    let response = Envelope::response_to(
        envelope.id,
        Topic::Chat,
        envelope.method.clone(),
        json!({ "channelId": channel_id, "channelCategory": category_str(category) }),
    );
    session.send(response).await;
    Ok(())
}

pub async fn unsubscribe(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let channel_id = require_uuid(args, "channelId")?;
    leave_channel(hub_state, session, channel_id).await;

    let response = Envelope::response_to(
        envelope.id,
        Topic::Chat,
        envelope.method.clone(),
        json!({ "status": "ok" }),
    );
    session.send(response).await;
    Ok(())
}

/// Shared by the explicit `channelUnsubscribe` handler and the session
/// close sequence: broadcasts `userLeft` before removing the subscription,
/// then restores presence. Best-effort -- a session that never connected
/// simply has its membership removed with no presence side effect.
pub async fn leave_channel(hub_state: &HubState, session: &Arc<SessionState>, channel_id: Uuid) {
    let category = hub_state.hub.category_of(channel_id).await;

    let Ok(user_id) = presence::current_user_id(session).await else {
        session.subscriptions.lock().await.remove(&channel_id);
        hub_state.hub.leave(channel_id, session.session_id).await;
        return;
    };

    let push = Envelope::push(
        Topic::Chat,
        "userLeft",
        json!({
            "userId": user_id,
            "channelId": channel_id,
            "channelCategory": category.map(category_str),
        }),
    );
    hub_state.hub.broadcast(channel_id, push, Some(session.session_id)).await;

    session.subscriptions.lock().await.remove(&channel_id);
    hub_state.hub.leave(channel_id, session.session_id).await;

    let remaining = session.subscriptions.lock().await.len();
    let (system_id, _) = hub_state.hub.well_known_channels().await;
    let left_system = channel_id == system_id;

    let current = session
        .user
        .read()
        .await
        .as_ref()
        .map(|u| u.presence)
        .unwrap_or_else(Presence::offline);
    let mut next = current;
    if remaining == 0 || left_system {
        next = Presence::offline();
    } else {
        match category {
            Some(ChannelCategory::Space) => next.space_id = None,
            Some(ChannelCategory::Server) => next.server_id = None,
            _ => {}
        }
    }
    let _ = presence::apply(hub_state, session, next).await;
}

pub async fn send(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let claimed = require_uuid(args, "userId")?;
    let channel_id = require_uuid(args, "channelId")?;
    let message = require_str(args, "message")?;

    let user_id = presence::current_user_id(session).await?;
    if claimed != user_id {
        return Err(HubError::IdentityMismatch(
            "args.userId does not match the connected user".to_owned(),
        ));
    }
    if !session.subscriptions.lock().await.contains(&channel_id) {
        return Err(HubError::ChannelResolution(
            "not subscribed to channel".to_owned(),
        ));
    }

    let category = hub_state.hub.category_of(channel_id).await;
    let channel_name = match category {
        Some(ChannelCategory::Server) => match hub_state.store.get_server(channel_id).await? {
            Some(server) => format!("{}:{}", server.host, server.port),
            None => String::new(),
        },
        Some(ChannelCategory::Space) => match hub_state.store.get_space(channel_id).await? {
            Some(space) => space.name,
            None => String::new(),
        },
        _ => String::new(),
    };
    let category_label = category.map(category_str).unwrap_or("private");

    hub_state
        .store
        .insert_chat_message(user_id, message, channel_id, &channel_name, category_label)
        .await?;

    let response = Envelope::response_to(
        envelope.id,
        Topic::Chat,
        envelope.method.clone(),
        json!({ "status": "ok" }),
    );
    session.send(response).await;

    let push = Envelope::push(
        Topic::Chat,
        "chatMessage",
        json!({
            "senderId": user_id,
            "message": message,
            "channelId": channel_id,
            "channelCategory": category_label,
        }),
    );
    hub_state.hub.broadcast(channel_id, push, Some(session.session_id)).await;
    Ok(())
}
