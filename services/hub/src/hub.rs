use std::collections::HashMap;

use hub_protocol::Envelope;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::channel::{ChannelCategory, ChannelRegistry};

/// Intents accepted by the hub supervisor task. Modeled on the donor's
/// oneshot-reply command pattern (`ForwarderCommand` in `state.rs`): every
/// mutation of the session set or the channel registry is a message sent
/// into this queue and applied by the single task that owns both, never
/// touched directly by a handler. This is the fix for the concurrency hole
/// named in the design notes -- the reference implementation mutated its
/// channel lists from arbitrary handler goroutines with no synchronization
/// at all.
pub enum HubIntent {
    Register {
        session_id: Uuid,
        outbound: mpsc::Sender<Envelope>,
    },
    Unregister {
        session_id: Uuid,
    },
    /// Associates a session with the user id it authenticated as, so a
    /// later `NotifyUser` (presence pushes to leaders) can find it.
    AttachUser {
        session_id: Uuid,
        user_id: Uuid,
    },
    /// Delivers an envelope to every currently-connected session registered
    /// under `user_id`, if any. Used for leader-scoped presence pushes,
    /// which target a user rather than a channel.
    NotifyUser {
        user_id: Uuid,
        envelope: Envelope,
    },
    CategoryOf {
        channel_id: Uuid,
        reply: oneshot::Sender<Option<ChannelCategory>>,
    },
    IsSpaceMaterialized {
        space_id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    IsServerMaterialized {
        server_id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    FindPrivate {
        a: Uuid,
        b: Uuid,
        reply: oneshot::Sender<Option<Uuid>>,
    },
    MaterializeSpace {
        space_id: Uuid,
        reply: oneshot::Sender<Uuid>,
    },
    MaterializeServer {
        server_id: Uuid,
        reply: oneshot::Sender<Uuid>,
    },
    MaterializePrivate {
        host: Uuid,
        guest: Uuid,
        reply: oneshot::Sender<Uuid>,
    },
    Join {
        channel_id: Uuid,
        session_id: Uuid,
    },
    Leave {
        channel_id: Uuid,
        session_id: Uuid,
    },
    /// Fan an envelope out to every member of `channel_id` except `exclude`
    /// (typically the sender, which already got a direct response).
    Broadcast {
        channel_id: Uuid,
        envelope: Envelope,
        exclude: Option<Uuid>,
    },
    WellKnownChannels {
        reply: oneshot::Sender<(Uuid, Uuid)>,
    },
    /// True if `user_id` has an attached session right now. Backs the
    /// private-channel cascade: a subscribe whose `channelId` names another
    /// online user's id pairs the two into a private channel.
    IsUserOnline {
        user_id: Uuid,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle used by everything outside the supervisor task to send intents.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubIntent>,
}

impl HubHandle {
    pub fn new(tx: mpsc::Sender<HubIntent>) -> Self {
        Self { tx }
    }

    pub async fn register(&self, session_id: Uuid, outbound: mpsc::Sender<Envelope>) {
        let _ = self
            .tx
            .send(HubIntent::Register {
                session_id,
                outbound,
            })
            .await;
    }

    pub async fn unregister(&self, session_id: Uuid) {
        let _ = self.tx.send(HubIntent::Unregister { session_id }).await;
    }

    pub async fn attach_user(&self, session_id: Uuid, user_id: Uuid) {
        let _ = self
            .tx
            .send(HubIntent::AttachUser { session_id, user_id })
            .await;
    }

    pub async fn notify_user(&self, user_id: Uuid, envelope: Envelope) {
        let _ = self
            .tx
            .send(HubIntent::NotifyUser { user_id, envelope })
            .await;
    }

    pub async fn well_known_channels(&self) -> (Uuid, Uuid) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(HubIntent::WellKnownChannels { reply: reply_tx }).await;
        reply_rx.await.unwrap_or((Uuid::nil(), Uuid::nil()))
    }

    pub async fn category_of(&self, channel_id: Uuid) -> Option<ChannelCategory> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::CategoryOf {
                channel_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.ok().flatten()
    }

    pub async fn is_space_materialized(&self, space_id: Uuid) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::IsSpaceMaterialized {
                space_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap_or(false)
    }

    pub async fn is_server_materialized(&self, server_id: Uuid) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::IsServerMaterialized {
                server_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap_or(false)
    }

    pub async fn find_private(&self, a: Uuid, b: Uuid) -> Option<Uuid> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.tx.send(HubIntent::FindPrivate { a, b, reply: reply_tx }).await;
        reply_rx.await.ok().flatten()
    }

    pub async fn materialize_space(&self, space_id: Uuid) -> Uuid {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::MaterializeSpace {
                space_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap_or(space_id)
    }

    pub async fn materialize_server(&self, server_id: Uuid) -> Uuid {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::MaterializeServer {
                server_id,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap_or(server_id)
    }

    pub async fn materialize_private(&self, host: Uuid, guest: Uuid) -> Uuid {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::MaterializePrivate {
                host,
                guest,
                reply: reply_tx,
            })
            .await;
        reply_rx.await.unwrap_or_else(|_| Uuid::new_v4())
    }

    pub async fn is_user_online(&self, user_id: Uuid) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(HubIntent::IsUserOnline { user_id, reply: reply_tx })
            .await;
        reply_rx.await.unwrap_or(false)
    }

    pub async fn join(&self, channel_id: Uuid, session_id: Uuid) {
        let _ = self.tx.send(HubIntent::Join { channel_id, session_id }).await;
    }

    pub async fn leave(&self, channel_id: Uuid, session_id: Uuid) {
        let _ = self.tx.send(HubIntent::Leave { channel_id, session_id }).await;
    }

    pub async fn broadcast(&self, channel_id: Uuid, envelope: Envelope, exclude: Option<Uuid>) {
        let _ = self
            .tx
            .send(HubIntent::Broadcast {
                channel_id,
                envelope,
                exclude,
            })
            .await;
    }
}

/// Spawns the hub supervisor task and returns a handle to it. Exactly one
/// instance runs per process -- the single owner of the channel registry and
/// the live-session-to-outbound-queue map.
pub fn spawn() -> HubHandle {
    let (tx, mut rx) = mpsc::channel::<HubIntent>(1024);
    let handle = HubHandle::new(tx);

    tokio::spawn(async move {
        let mut registry = ChannelRegistry::new();
        let mut sessions: HashMap<Uuid, mpsc::Sender<Envelope>> = HashMap::new();
        let mut users: HashMap<Uuid, Uuid> = HashMap::new(); // user_id -> session_id

        while let Some(intent) = rx.recv().await {
            match intent {
                HubIntent::Register { session_id, outbound } => {
                    info!(%session_id, "session registered");
                    sessions.insert(session_id, outbound);
                }
                HubIntent::Unregister { session_id } => {
                    info!(%session_id, "session unregistered");
                    sessions.remove(&session_id);
                    users.retain(|_, sid| *sid != session_id);
                }
                HubIntent::AttachUser { session_id, user_id } => {
                    users.insert(user_id, session_id);
                }
                HubIntent::NotifyUser { user_id, envelope } => {
                    if let Some(session_id) = users.get(&user_id) {
                        if let Some(outbound) = sessions.get(session_id) {
                            let _ = outbound.send(envelope).await;
                        }
                    }
                }
                HubIntent::WellKnownChannels { reply } => {
                    let _ = reply.send((registry.system_channel_id, registry.general_channel_id));
                }
                HubIntent::IsUserOnline { user_id, reply } => {
                    let _ = reply.send(users.contains_key(&user_id));
                }
                HubIntent::CategoryOf { channel_id, reply } => {
                    let _ = reply.send(registry.category_of(channel_id));
                }
                HubIntent::IsSpaceMaterialized { space_id, reply } => {
                    let _ = reply.send(registry.is_space_materialized(space_id));
                }
                HubIntent::IsServerMaterialized { server_id, reply } => {
                    let _ = reply.send(registry.is_server_materialized(server_id));
                }
                HubIntent::FindPrivate { a, b, reply } => {
                    let _ = reply.send(registry.find_private(a, b));
                }
                HubIntent::MaterializeSpace { space_id, reply } => {
                    registry.materialize_space(space_id);
                    let _ = reply.send(space_id);
                }
                HubIntent::MaterializeServer { server_id, reply } => {
                    registry.materialize_server(server_id);
                    let _ = reply.send(server_id);
                }
                HubIntent::MaterializePrivate { host, guest, reply } => {
                    let channel_id = registry.materialize_private(host, guest);
                    let _ = reply.send(channel_id);
                }
                HubIntent::Join { channel_id, session_id } => {
                    registry.add_member(channel_id, session_id);
                }
                HubIntent::Leave { channel_id, session_id } => {
                    registry.remove_member(channel_id, session_id);
                }
                HubIntent::Broadcast {
                    channel_id,
                    envelope,
                    exclude,
                } => {
                    for member in registry.members(channel_id).collect::<Vec<_>>() {
                        if Some(member) == exclude {
                            continue;
                        }
                        if let Some(outbound) = sessions.get(&member) {
                            if outbound.send(envelope.clone()).await.is_err() {
                                warn!(session_id = %member, "dropped unreachable session during broadcast");
                            }
                        }
                    }
                }
            }
        }
    });

    handle
}
