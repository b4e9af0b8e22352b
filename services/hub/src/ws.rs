use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;

use crate::session;
use crate::state::HubState;

/// The single WebSocket endpoint. Unlike the donor's forwarder/receiver
/// handlers, there is no token query-param extraction here -- this
/// protocol trusts the user id the client claims in its `connect` envelope
/// rather than a connection-level credential (§9).
pub async fn upgrade(ws: WebSocketUpgrade, State(hub_state): State<HubState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub_state))
}

async fn handle_socket(socket: WebSocket, hub_state: HubState) {
    session::run(socket, hub_state).await;
}
