//! Broadcast hub: live session registry, chunk interest and the shared entity table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mdbeta_core::{ChunkKey, EntityId};
use mdbeta_net::ServerPacket;
use mdbeta_world::{Entity, EntityKind};
use tracing::{debug, trace};

use crate::outbox::Outbox;

/// Identity of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct HubState {
    next_session: u64,
    next_entity: EntityId,
    /// BTreeMap/BTreeSet keep broadcast order deterministic.
    sessions: BTreeMap<SessionId, Outbox>,
    interest: HashMap<ChunkKey, BTreeSet<SessionId>>,
    entities: BTreeMap<EntityId, Entity>,
}

/// Shared by every session on the server.
///
/// Each call takes the lock once and never awaits, so every operation is
/// atomic with respect to other sessions.
#[derive(Default)]
pub struct BroadcastHub {
    state: Mutex<HubState>,
}

impl BroadcastHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an identity for a new connection.
    pub fn allocate_session(&self) -> SessionId {
        let mut state = self.state();
        state.next_session += 1;
        SessionId(state.next_session)
    }

    /// Start delivering broadcasts to a session.
    pub fn register_session(&self, id: SessionId, outbox: Outbox) {
        debug!(session = %id, "registering session");
        self.state().sessions.insert(id, outbox);
    }

    /// Stop delivering to a session and drop all of its chunk interest.
    pub fn unregister_session(&self, id: SessionId) {
        let mut state = self.state();
        if state.sessions.remove(&id).is_some() {
            debug!(session = %id, "unregistering session");
        }
        state.interest.retain(|_, sessions| {
            sessions.remove(&id);
            !sessions.is_empty()
        });
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Deliver a packet to every registered session, the sender included.
    pub fn broadcast(&self, packet: ServerPacket) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for (id, outbox) in &state.sessions {
            match outbox.send(packet.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => trace!(session = %id, "dropping broadcast to closed session"),
            }
        }
        delivered
    }

    /// Deliver a packet to sessions whose window holds `key`.
    pub fn broadcast_scoped_to_chunk(&self, packet: ServerPacket, key: ChunkKey) -> usize {
        let state = self.state();
        let Some(interested) = state.interest.get(&key) else {
            return 0;
        };
        let mut delivered = 0;
        for id in interested {
            let Some(outbox) = state.sessions.get(id) else {
                continue;
            };
            if outbox.send(packet.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Record that a session's window holds `key`.
    pub fn add_interest(&self, key: ChunkKey, session: SessionId) {
        self.state().interest.entry(key).or_default().insert(session);
    }

    /// Record that a session's window no longer holds `key`.
    pub fn remove_interest(&self, key: ChunkKey, session: SessionId) {
        let mut state = self.state();
        if let Some(sessions) = state.interest.get_mut(&key) {
            sessions.remove(&session);
            if sessions.is_empty() {
                state.interest.remove(&key);
            }
        }
    }

    /// Sessions whose window holds `key`.
    pub fn interested_in(&self, key: ChunkKey) -> Vec<SessionId> {
        self.state()
            .interest
            .get(&key)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Reserve an entity id without creating an entity.
    pub fn reserve_entity_id(&self) -> EntityId {
        let mut state = self.state();
        state.next_entity += 1;
        state.next_entity
    }

    /// Create an entity with a fresh id. Positions are in 1/32 blocks.
    pub fn create_entity(&self, x: i32, y: i32, z: i32, kind: EntityKind) -> Entity {
        let id = self.reserve_entity_id();
        let entity = Entity { id, x, y, z, kind };
        self.insert_entity(entity.clone());
        entity
    }

    /// Insert an entity under an id obtained from [`BroadcastHub::reserve_entity_id`].
    pub fn insert_entity(&self, entity: Entity) {
        self.state().entities.insert(entity.id, entity);
    }

    /// Move an entity. Returns false if it no longer exists.
    pub fn move_entity(&self, id: EntityId, x: i32, y: i32, z: i32) -> bool {
        match self.state().entities.get_mut(&id) {
            Some(entity) => {
                entity.x = x;
                entity.y = y;
                entity.z = z;
                true
            }
            None => false,
        }
    }

    /// Remove an entity, returning it if this call removed it.
    ///
    /// Concurrent collectors race on this compare-and-remove; exactly one wins.
    pub fn destroy_entity(&self, id: EntityId) -> Option<Entity> {
        self.state().entities.remove(&id)
    }

    /// Look up an entity.
    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.state().entities.get(&id).cloned()
    }

    /// Entities within `radius` (taxicab, 1/32 blocks) of a point, in id order.
    pub fn entities_near(&self, x: i32, y: i32, z: i32, radius: i64) -> Vec<Entity> {
        self.state()
            .entities
            .values()
            .filter(|entity| entity.taxicab(x, y, z) <= radius)
            .cloned()
            .collect()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.state().entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbeta_core::ItemStack;

    fn pickup() -> EntityKind {
        EntityKind::Pickup {
            item: ItemStack::new(4, 1),
        }
    }

    #[test]
    fn test_scoped_broadcast_reaches_interested_sessions_once() {
        let hub = BroadcastHub::new();
        let (a, mut rx_a) = Outbox::channel();
        let (b, mut rx_b) = Outbox::channel();
        let (id_a, id_b) = (hub.allocate_session(), hub.allocate_session());
        hub.register_session(id_a, a);
        hub.register_session(id_b, b);
        hub.add_interest(ChunkKey::new(0, 0), id_a);
        hub.add_interest(ChunkKey::new(0, 0), id_a);
        hub.add_interest(ChunkKey::new(1, 0), id_b);

        let delivered = hub.broadcast_scoped_to_chunk(ServerPacket::Ping, ChunkKey::new(0, 0));

        assert_eq!(delivered, 1);
        assert_eq!(rx_a.try_recv().ok(), Some(ServerPacket::Ping));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_unregister_drops_interest() {
        let hub = BroadcastHub::new();
        let (outbox, _rx) = Outbox::channel();
        let id = hub.allocate_session();
        hub.register_session(id, outbox);
        hub.add_interest(ChunkKey::new(2, 2), id);

        hub.unregister_session(id);

        assert_eq!(hub.session_count(), 0);
        assert!(hub.interested_in(ChunkKey::new(2, 2)).is_empty());
    }

    #[test]
    fn test_broadcast_skips_closed_sessions() {
        let hub = BroadcastHub::new();
        let (open, _rx) = Outbox::channel();
        let (closed, rx_closed) = Outbox::channel();
        drop(rx_closed);
        hub.register_session(hub.allocate_session(), open);
        hub.register_session(hub.allocate_session(), closed);

        assert_eq!(hub.broadcast(ServerPacket::Ping), 1);
    }

    #[test]
    fn test_destroy_is_at_most_once() {
        let hub = BroadcastHub::new();
        let entity = hub.create_entity(16, 2048, 16, pickup());

        assert!(hub.destroy_entity(entity.id).is_some());
        assert!(hub.destroy_entity(entity.id).is_none());
        assert_eq!(hub.entity_count(), 0);
    }

    #[test]
    fn test_entities_near_uses_taxicab_radius() {
        let hub = BroadcastHub::new();
        let near = hub.create_entity(16, 2048, 16, pickup());
        hub.create_entity(16 + 64, 2048, 16, pickup());

        let found = hub.entities_near(0, 2048, 0, 64);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, near.id);
    }

    #[test]
    fn test_entity_ids_are_unique() {
        let hub = BroadcastHub::new();
        let reserved = hub.reserve_entity_id();
        let created = hub.create_entity(0, 0, 0, pickup());
        assert_ne!(reserved, created.id);
        assert!(hub.entity(reserved).is_none());
        assert!(hub.move_entity(created.id, 1, 2, 3));
        assert_eq!(hub.entity(created.id).map(|e| (e.x, e.y, e.z)), Some((1, 2, 3)));
    }
}
