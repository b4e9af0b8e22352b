use std::sync::Arc;

use hub_protocol::{Envelope, Presence, PresenceStatus, Topic};
use serde_json::json;
use uuid::Uuid;

use crate::error::{HubError, HubResult};
use crate::handlers::{optional_uuid, require_args};
use crate::session::SessionState;
use crate::state::HubState;

/// `presenceUpdate` only requires that a user is attached to the session --
/// unlike `channelSend` it does not also check `args.key`/`args.userId`
/// against the attached user. The presence fields themselves are nested
/// under `args.presence`, not flat on `args`, and an unparseable/unknown
/// status is rejected rather than silently substituted.
pub async fn handle(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let presence_arg = args
        .get("presence")
        .ok_or_else(|| HubError::Protocol("args.presence missing".to_owned()))?;
    let status = presence_arg
        .get("status")
        .cloned()
        .and_then(|v| serde_json::from_value::<PresenceStatus>(v).ok())
        .ok_or_else(|| HubError::Protocol("args.presence.status missing or unknown".to_owned()))?;
    let requested = Presence {
        status,
        space_id: optional_uuid(presence_arg, "spaceId"),
        server_id: optional_uuid(presence_arg, "serverId"),
    };

    let updated = apply(hub_state, session, requested).await?;

    let response = Envelope::response_to(
        envelope.id,
        Topic::System,
        envelope.method.clone(),
        serde_json::to_value(updated).unwrap_or_default(),
    );
    session.send(response).await;
    Ok(())
}

/// Enforces `status == offline ⇔ both location ids are absent`, persists
/// the result, and multicasts the new presence to the user's leaders only --
/// never to the channel. Shared by `presenceUpdate`, `channelSubscribe` and
/// `channelUnsubscribe`.
pub(crate) async fn apply(
    hub_state: &HubState,
    session: &Arc<SessionState>,
    mut requested: Presence,
) -> HubResult<Presence> {
    let user_id = current_user_id(session).await?;

    if requested.space_id.is_none() && requested.server_id.is_none() {
        requested.status = PresenceStatus::Offline;
    } else if requested.status == PresenceStatus::Offline {
        requested.status = PresenceStatus::Playing;
    }

    let updated = hub_state.store.update_presence(user_id, requested).await?;
    if let Some(user) = session.user.write().await.as_mut() {
        user.presence = updated;
    }

    let leaders = hub_state.store.get_leaders(user_id).await?;
    let push = Envelope::push(
        Topic::System,
        "presenceChanged",
        json!({ "userId": user_id, "presence": updated }),
    );
    for leader in leaders {
        hub_state.hub.notify_user(leader.id, push.clone()).await;
    }

    Ok(updated)
}

pub(crate) async fn current_user_id(session: &Arc<SessionState>) -> HubResult<Uuid> {
    session
        .user
        .read()
        .await
        .as_ref()
        .map(|user| user.id)
        .ok_or_else(|| HubError::IdentityMismatch("session has not connected".to_owned()))
}
