use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// The five channel categories named in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCategory {
    System,
    General,
    Space,
    Server,
    Private,
}

/// Host/guest roles for a private channel. Recorded for completeness but
/// never consulted for authorization -- either paired user may publish or
/// subscribe once the channel exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivateChannelRoles {
    pub host: Uuid,
    pub guest: Uuid,
}

/// Owned exclusively by the hub supervisor task (§4.2) -- every mutation
/// arrives as an intent processed one at a time, so nothing here needs its
/// own synchronization. This is what closes the unsynchronized-mutation gap
/// the donor's channel registry left open.
pub struct ChannelRegistry {
    pub system_channel_id: Uuid,
    pub general_channel_id: Uuid,
    space_channels: HashSet<Uuid>,
    server_channels: HashSet<Uuid>,
    private_channels: HashMap<(Uuid, Uuid), (Uuid, PrivateChannelRoles)>,
    members: HashMap<Uuid, HashSet<Uuid>>,
}

fn unordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Fixed for the lifetime of the binary, mirroring the reference
/// implementation's compiled-in `SystemChannelId`/`GlobalChannelId`
/// constants -- clients hard-code these rather than discovering them, so
/// they cannot be regenerated per process.
pub const SYSTEM_CHANNEL_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0001);
pub const GENERAL_CHANNEL_ID: Uuid = Uuid::from_u128(0x0000_0000_0000_0000_0000_0000_0000_0002);

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            system_channel_id: SYSTEM_CHANNEL_ID,
            general_channel_id: GENERAL_CHANNEL_ID,
            space_channels: HashSet::new(),
            server_channels: HashSet::new(),
            private_channels: HashMap::new(),
            members: HashMap::new(),
        }
    }

    pub fn category_of(&self, channel_id: Uuid) -> Option<ChannelCategory> {
        if channel_id == self.system_channel_id {
            Some(ChannelCategory::System)
        } else if channel_id == self.general_channel_id {
            Some(ChannelCategory::General)
        } else if self.space_channels.contains(&channel_id) {
            Some(ChannelCategory::Space)
        } else if self.server_channels.contains(&channel_id) {
            Some(ChannelCategory::Server)
        } else if self
            .private_channels
            .values()
            .any(|(id, _)| *id == channel_id)
        {
            Some(ChannelCategory::Private)
        } else {
            None
        }
    }

    pub fn is_space_materialized(&self, space_id: Uuid) -> bool {
        self.space_channels.contains(&space_id)
    }

    pub fn is_server_materialized(&self, server_id: Uuid) -> bool {
        self.server_channels.contains(&server_id)
    }

    /// Materialize a space channel. Idempotent: re-materializing an
    /// already-known space is a no-op, checked against the *space* list --
    /// the donor's equivalent check looked at the server list by mistake.
    pub fn materialize_space(&mut self, space_id: Uuid) {
        self.space_channels.insert(space_id);
    }

    pub fn materialize_server(&mut self, server_id: Uuid) {
        self.server_channels.insert(server_id);
    }

    /// Find an already-materialized private channel for this unordered pair.
    pub fn find_private(&self, a: Uuid, b: Uuid) -> Option<Uuid> {
        self.private_channels
            .get(&unordered_pair(a, b))
            .map(|(id, _)| *id)
    }

    /// Materialize a private channel for (host, guest), reusing any existing
    /// one for the same unordered pair regardless of host/guest order.
    pub fn materialize_private(&mut self, host: Uuid, guest: Uuid) -> Uuid {
        let key = unordered_pair(host, guest);
        self.private_channels
            .entry(key)
            .or_insert_with(|| (Uuid::new_v4(), PrivateChannelRoles { host, guest }))
            .0
    }

    pub fn members(&self, channel_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.members
            .get(&channel_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn is_member(&self, channel_id: Uuid, session_id: Uuid) -> bool {
        self.members
            .get(&channel_id)
            .is_some_and(|set| set.contains(&session_id))
    }

    pub fn add_member(&mut self, channel_id: Uuid, session_id: Uuid) {
        self.members.entry(channel_id).or_default().insert(session_id);
    }

    pub fn remove_member(&mut self, channel_id: Uuid, session_id: Uuid) {
        if let Some(set) = self.members.get_mut(&channel_id) {
            set.remove(&session_id);
        }
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_channel_dedups_regardless_of_pair_order() {
        let mut registry = ChannelRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let id1 = registry.materialize_private(a, b);
        let id2 = registry.materialize_private(b, a);
        assert_eq!(id1, id2);
        assert_eq!(registry.find_private(a, b), Some(id1));
        assert_eq!(registry.find_private(b, a), Some(id1));
    }

    #[test]
    fn materializing_space_is_idempotent_and_checked_against_space_list() {
        let mut registry = ChannelRegistry::new();
        let space_id = Uuid::new_v4();
        assert!(!registry.is_space_materialized(space_id));
        registry.materialize_space(space_id);
        assert!(registry.is_space_materialized(space_id));
        // re-materializing doesn't create a server-list entry or otherwise
        // confuse the two lists (the donor's bug checked the wrong one).
        registry.materialize_space(space_id);
        assert!(!registry.is_server_materialized(space_id));
    }

    #[test]
    fn category_of_resolves_well_known_and_materialized_channels() {
        let mut registry = ChannelRegistry::new();
        assert_eq!(
            registry.category_of(registry.system_channel_id),
            Some(ChannelCategory::System)
        );
        let space_id = Uuid::new_v4();
        registry.materialize_space(space_id);
        assert_eq!(registry.category_of(space_id), Some(ChannelCategory::Space));
        assert_eq!(registry.category_of(Uuid::new_v4()), None);
    }

    #[test]
    fn member_set_tracks_add_and_remove() {
        let mut registry = ChannelRegistry::new();
        let session = Uuid::new_v4();
        registry.add_member(registry.system_channel_id, session);
        assert!(registry.is_member(registry.system_channel_id, session));
        registry.remove_member(registry.system_channel_id, session);
        assert!(!registry.is_member(registry.system_channel_id, session));
    }
}
