use std::sync::Arc;

use hub_protocol::{Envelope, Topic};

use crate::error::HubResult;
use crate::handlers::{require_args, require_uuid};
use crate::session::SessionState;
use crate::state::HubState;

/// `connect` and `userChangeName` share this body verbatim: both simply
/// re-resolve `args.key` through the entity store and (re-)attach the
/// result to the session. `userChangeName` doesn't separately apply the
/// new name -- this mirrors the reference implementation's handler, which
/// never reads the name argument either.
pub async fn handle(envelope: &Envelope, hub_state: &HubState, session: &Arc<SessionState>) -> HubResult<()> {
    let args = require_args(envelope)?;
    let user_id = require_uuid(args, "key")?;

    let user = hub_state.store.get_or_create_user(user_id).await?;
    *session.user.write().await = Some(user.clone());
    hub_state.hub.attach_user(session.session_id, user_id).await;

    let response = Envelope::response_to(
        envelope.id,
        Topic::System,
        envelope.method.clone(),
        serde_json::to_value(&user).unwrap_or_default(),
    );
    session.send(response).await;
    Ok(())
}
