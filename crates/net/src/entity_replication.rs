//! Outbound packets describing entities.

use mdbeta_world::{Entity, EntityKind};

use crate::protocol::ServerPacket;

/// Conversion from an entity to the packets that announce it to a client.
pub trait Replicate {
    /// Packets that make the entity appear, in send order.
    fn spawn_packets(&self) -> Vec<ServerPacket>;

    /// Packet that removes the entity.
    fn destroy_packet(&self) -> ServerPacket;
}

impl Replicate for Entity {
    fn spawn_packets(&self) -> Vec<ServerPacket> {
        match &self.kind {
            EntityKind::Pickup { item } => vec![
                ServerPacket::SpawnPickup {
                    entity_id: self.id,
                    item: *item,
                    x: self.x,
                    y: self.y,
                    z: self.z,
                },
                ServerPacket::CreateEntity { entity_id: self.id },
            ],
            EntityKind::Player { username } => vec![ServerPacket::PlayerSpawn {
                entity_id: self.id,
                username: username.clone(),
                x: self.x,
                y: self.y,
                z: self.z,
            }],
        }
    }

    fn destroy_packet(&self) -> ServerPacket {
        ServerPacket::DestroyEntity { entity_id: self.id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbeta_core::ItemStack;

    #[test]
    fn test_pickup_spawns_then_creates() {
        let entity = Entity {
            id: 9,
            x: 16,
            y: 2240,
            z: 16,
            kind: EntityKind::Pickup {
                item: ItemStack::new(4, 1),
            },
        };
        let packets = entity.spawn_packets();
        assert_eq!(packets.len(), 2);
        assert!(matches!(
            packets[0],
            ServerPacket::SpawnPickup {
                entity_id: 9,
                x: 16,
                ..
            }
        ));
        assert_eq!(packets[1], ServerPacket::CreateEntity { entity_id: 9 });
    }

    #[test]
    fn test_player_spawns_with_name() {
        let entity = Entity {
            id: 3,
            x: 0,
            y: 2048,
            z: 0,
            kind: EntityKind::Player {
                username: "alice".into(),
            },
        };
        assert_eq!(
            entity.spawn_packets(),
            vec![ServerPacket::PlayerSpawn {
                entity_id: 3,
                username: "alice".into(),
                x: 0,
                y: 2048,
                z: 0,
            }]
        );
        assert_eq!(
            entity.destroy_packet(),
            ServerPacket::DestroyEntity { entity_id: 3 }
        );
    }
}
