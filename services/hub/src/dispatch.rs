use std::sync::Arc;

use hub_protocol::{Envelope, EnvelopeType, Topic};
use tracing::warn;

use crate::error::HubError;
use crate::handlers;
use crate::session::SessionState;
use crate::state::HubState;

/// Routes one decoded envelope to its handler by `(topic, method)`, then
/// reports any error back to the caller: as a `Response` if the envelope was
/// a `Request`, or as a `System`-topic error push otherwise. A `Push` with
/// no registered handler is logged and dropped, not an error.
pub async fn dispatch(envelope: Envelope, hub_state: &HubState, session: &Arc<SessionState>) {
    if envelope.kind == EnvelopeType::Response {
        session.resolve_pending(envelope.id).await;
        return;
    }

    let result = match (envelope.topic, envelope.method.as_str()) {
        (Topic::System, "connect") => handlers::connect::handle(&envelope, hub_state, session).await,
        (Topic::System, "userChangeName") => handlers::connect::handle(&envelope, hub_state, session).await,
        (Topic::System, "presenceUpdate") => handlers::presence::handle(&envelope, hub_state, session).await,
        (Topic::Chat, "channelSubscribe") => handlers::channel::subscribe(&envelope, hub_state, session).await,
        (Topic::Chat, "channelUnsubscribe") => handlers::channel::unsubscribe(&envelope, hub_state, session).await,
        (Topic::Chat, "channelSend") => handlers::channel::send(&envelope, hub_state, session).await,
        (Topic::Analytics, "userAction") => handlers::action::handle(&envelope, hub_state, session).await,
        (Topic::Voice, "vivoxGetLoginToken") => handlers::voice::login(&envelope, hub_state, session).await,
        (Topic::Voice, "vivoxGetJoinToken") => handlers::voice::join(&envelope, hub_state, session).await,
        (Topic::Voice, "vivoxMute") => handlers::voice::mute(&envelope, hub_state, session).await,
        (Topic::Voice, "vivoxUnmute") => handlers::voice::unmute(&envelope, hub_state, session).await,
        (Topic::Voice, "vivoxKick") => handlers::voice::kick(&envelope, hub_state, session).await,
        (topic, method) => {
            if envelope.kind == EnvelopeType::Push {
                warn!(?topic, method, "push with no registered handler, dropping");
                return;
            }
            Err(HubError::Protocol(format!("no handler for {method} on {topic:?}")))
        }
    };

    if let Err(err) = result {
        warn!(method = %envelope.method, %err, "handler error");
        let wire = serde_json::to_value(err.to_wire()).unwrap_or_default();
        let notice = if envelope.kind == EnvelopeType::Request {
            Envelope::response_to(envelope.id, envelope.topic, envelope.method.clone(), wire)
        } else {
            Envelope::push(Topic::System, "error", wire)
        };
        session.send(notice).await;
    }
}
