use std::sync::Arc;

use hub_protocol::{Envelope, Topic};
use serde_json::json;

use crate::error::{HubError, HubResult};
use crate::handlers::{optional_uuid, presence, require_args, require_str};
use crate::session::SessionState;
use crate::state::HubState;

/// `userAction` (Analytics) persists a row and replies `{status: "ok"}`. The
/// action fields are read from a nested `args.message` object, not flat
/// top-level fields.
pub async fn handle(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let user_id = presence::current_user_id(session).await?;
    let message = args
        .get("message")
        .ok_or_else(|| HubError::Protocol("args.message missing".to_owned()))?;
    let action = require_str(message, "action")?;
    let sender_id = optional_uuid(message, "senderId");
    let details = message.get("details").and_then(serde_json::Value::as_str).map(str::to_owned);

    hub_state
        .store
        .insert_action(user_id, sender_id, action, details.as_deref())
        .await?;

    let response = Envelope::response_to(
        envelope.id,
        Topic::Analytics,
        envelope.method.clone(),
        json!({ "status": "ok" }),
    );
    session.send(response).await;
    Ok(())
}
