use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use hub_protocol::Envelope;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::dispatch;
use crate::handlers;
use crate::state::HubState;

const WRITE_WAIT: Duration = Duration::from_secs(10);
const PONG_WAIT: Duration = Duration::from_secs(60);
const PING_PERIOD: Duration = Duration::from_secs(54);
/// A server-initiated `Request` gets the same deadline as the read-side
/// pong wait -- there is no separate, shorter timeout for this path.
const REQUEST_TIMEOUT: Duration = PONG_WAIT;
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Per-connection state shared by the three cooperating tasks (reader,
/// writer, deadline sweeper). The reader is the only task that mutates
/// `subscriptions`; it's still behind a lock because the close sequence
/// (run from the reader's own task, after its loop exits) and, in
/// principle, future callers need a consistent read of it.
pub struct SessionState {
    pub session_id: Uuid,
    pub user: RwLock<Option<hub_protocol::User>>,
    pub subscriptions: Mutex<HashSet<Uuid>>,
    pub pending_requests: Mutex<HashMap<Uuid, Instant>>,
    pub outbound_tx: mpsc::Sender<Envelope>,
}

impl SessionState {
    fn new(session_id: Uuid, outbound_tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            session_id,
            user: RwLock::new(None),
            subscriptions: Mutex::new(HashSet::new()),
            pending_requests: Mutex::new(HashMap::new()),
            outbound_tx,
        }
    }

    pub async fn send(&self, envelope: Envelope) {
        if self.outbound_tx.send(envelope).await.is_err() {
            warn!(session_id = %self.session_id, "outbound queue closed");
        }
    }

    pub async fn track_pending(&self, request_id: Uuid) {
        self.pending_requests
            .lock()
            .await
            .insert(request_id, Instant::now());
    }

    pub async fn resolve_pending(&self, request_id: Uuid) {
        self.pending_requests.lock().await.remove(&request_id);
    }
}

/// Drives one client connection end to end: registers with the hub, spawns
/// the writer and deadline-sweeper tasks, runs the reader loop on the
/// calling task, and on exit runs the close sequence -- every remaining
/// subscription gets a `userLeft` notification before the session is
/// unregistered (see `handlers::channel::leave_channel`).
pub async fn run(socket: WebSocket, hub_state: HubState) {
    let session_id = Uuid::new_v4();
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel(hub_state.config.outbound_queue_capacity);

    let session = Arc::new(SessionState::new(session_id, outbound_tx.clone()));
    hub_state.hub.register(session_id, outbound_tx).await;
    info!(%session_id, "connection established");

    let writer = tokio::spawn(run_writer(sink, outbound_rx));
    let sweeper = tokio::spawn(run_sweeper(session.clone()));

    loop {
        let next = tokio::time::timeout(PONG_WAIT, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(err))) => {
                debug!(%session_id, %err, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                debug!(%session_id, "pong deadline exceeded, closing");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                for frame in text.split('\n').filter(|f| !f.is_empty()) {
                    handle_frame(frame, &hub_state, &session).await;
                }
            }
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    close_session(&hub_state, &session).await;
    writer.abort();
    sweeper.abort();
}

/// Drains the outbound queue and forwards it to the socket, coalescing any
/// envelopes that are already ready into one `\n`-joined text frame, and
/// sends an idle keepalive ping every `PING_PERIOD`.
async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Envelope>) {
    let mut ping_timer = tokio::time::interval(PING_PERIOD);
    ping_timer.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(first) = received else { break };
                let mut frame = serde_json::to_string(&first).unwrap_or_default();
                while let Ok(next) = rx.try_recv() {
                    frame.push('\n');
                    frame.push_str(&serde_json::to_string(&next).unwrap_or_default());
                }
                if tokio::time::timeout(WRITE_WAIT, sink.send(Message::Text(frame))).await.is_err() {
                    break;
                }
            }
            _ = ping_timer.tick() => {
                if tokio::time::timeout(WRITE_WAIT, sink.send(Message::Ping(Vec::new()))).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

async fn run_sweeper(session: Arc<SessionState>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let mut pending = session.pending_requests.lock().await;
        sweep_expired(&mut pending, session.session_id, Instant::now(), REQUEST_TIMEOUT);
    }
}

/// Evicts every entry older than `timeout` as of `now`. Split out from
/// `run_sweeper` so a test can exercise eviction without waiting out the
/// real `REQUEST_TIMEOUT`.
fn sweep_expired(pending: &mut HashMap<Uuid, Instant>, session_id: Uuid, now: Instant, timeout: Duration) {
    pending.retain(|request_id, submitted_at| {
        let expired = now.duration_since(*submitted_at) > timeout;
        if expired {
            debug!(%session_id, %request_id, "pending request timed out");
        }
        !expired
    });
}

async fn handle_frame(frame: &str, hub_state: &HubState, session: &Arc<SessionState>) {
    let envelope: Envelope = match serde_json::from_str(frame) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(session_id = %session.session_id, %err, "dropping malformed envelope");
            return;
        }
    };
    dispatch::dispatch(envelope, hub_state, session).await;
}

async fn close_session(hub_state: &HubState, session: &Arc<SessionState>) {
    let subscriptions: Vec<Uuid> = session.subscriptions.lock().await.iter().copied().collect();
    for channel_id in subscriptions {
        handlers::channel::leave_channel(hub_state, session, channel_id).await;
    }
    hub_state.hub.unregister(session.session_id).await;
    info!(session_id = %session.session_id, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_session() -> SessionState {
        let (tx, _rx) = mpsc::channel(1);
        SessionState::new(Uuid::new_v4(), tx)
    }

    #[tokio::test]
    async fn resolve_pending_removes_a_tracked_request() {
        let session = make_session();
        let request_id = Uuid::new_v4();

        session.track_pending(request_id).await;
        assert_eq!(session.pending_requests.lock().await.len(), 1);

        session.resolve_pending(request_id).await;
        assert!(session.pending_requests.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_expired_evicts_only_entries_past_the_deadline() {
        let session = make_session();
        let expired_id = Uuid::new_v4();
        let fresh_id = Uuid::new_v4();

        session.track_pending(expired_id).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.track_pending(fresh_id).await;

        let now = Instant::now();
        let mut pending = session.pending_requests.lock().await;
        sweep_expired(&mut pending, session.session_id, now, Duration::from_millis(2));

        assert!(!pending.contains_key(&expired_id));
        assert!(pending.contains_key(&fresh_id));
    }
}
