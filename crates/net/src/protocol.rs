//! Packet definitions for the beta wire protocol.
//!
//! Each packet travels with a one-byte id in front of its postcard payload; the
//! ids follow the beta numbering so captured traffic stays recognisable.

use mdbeta_core::{BlockId, EntityId, ItemId, ItemStack};
use serde::{Deserialize, Serialize};

use crate::chunk_encoding::ChunkPayload;

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 8;

/// Protocol magic bytes mixed into the schema hash.
pub const PROTOCOL_MAGIC: &[u8; 8] = b"MDBETA\x00\x01";

/// Maximum length of a chat message (bytes).
pub const MAX_CHAT_LEN: usize = 119;

/// Maximum username length.
pub const MAX_USERNAME_LEN: usize = 16;

/// Maximum quit/error message length.
pub const MAX_REASON_LEN: usize = 256;

/// Maximum slots carried by one inventory packet.
pub const MAX_INVENTORY_SLOTS: usize = 64;

/// Progress of a digging action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigState {
    /// First hit on a block.
    Started,
    /// Repeated hits while the block breaks.
    Digging,
    /// Player stopped hitting before the block broke.
    Stopped,
    /// The block broke.
    Broken,
}

/// Packets sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientPacket {
    /// Keepalive.
    Ping,
    /// Login after the handshake challenge.
    Login {
        /// Client protocol version.
        protocol: u32,
        /// Login name; must match the handshake.
        username: String,
        /// Schema hash for compatibility.
        schema_hash: u64,
    },
    /// First packet of a connection.
    Handshake {
        /// Login name.
        username: String,
    },
    /// Chat line typed by the player.
    Chat {
        /// Message text.
        message: String,
    },
    /// Full contents of one player container.
    Inventory {
        /// Container discriminant (-1 holdables, -2 crafting, -3 armor).
        container: i32,
        /// Slot contents.
        slots: Vec<Option<ItemStack>>,
    },
    /// Movement tick without position or look.
    Flying {
        /// On-ground flag.
        on_ground: bool,
    },
    /// Position update.
    Position {
        /// World X.
        x: f64,
        /// World Y (feet).
        y: f64,
        /// Eye height.
        stance: f64,
        /// World Z.
        z: f64,
        /// On-ground flag.
        on_ground: bool,
    },
    /// Orientation update.
    Look {
        /// Yaw in degrees.
        yaw: f32,
        /// Pitch in degrees.
        pitch: f32,
        /// On-ground flag.
        on_ground: bool,
    },
    /// Combined position and orientation update.
    PositionLook {
        /// World X.
        x: f64,
        /// World Y (feet).
        y: f64,
        /// Eye height.
        stance: f64,
        /// World Z.
        z: f64,
        /// Yaw in degrees.
        yaw: f32,
        /// Pitch in degrees.
        pitch: f32,
        /// On-ground flag.
        on_ground: bool,
    },
    /// Dig progress against a block.
    Digging {
        /// Progress stage.
        state: DigState,
        /// Block X.
        x: i32,
        /// Block Y.
        y: i32,
        /// Block Z.
        z: i32,
        /// Face being hit.
        face: u8,
    },
    /// Place the held item against a face, or use the target with an empty hand.
    Build {
        /// Target X.
        x: i32,
        /// Target Y.
        y: i32,
        /// Target Z.
        z: i32,
        /// Face clicked; values above 5 mean "no face".
        face: u8,
        /// Held item, `None` for an empty hand.
        item: Option<ItemId>,
    },
    /// Hotbar selection.
    Equip {
        /// Selected slot.
        slot: u16,
    },
    /// Arm swing and similar cosmetic animations.
    Animation {
        /// Animated entity.
        entity_id: EntityId,
        /// Animation kind.
        animation: u8,
    },
    /// Respawn request after death.
    Respawn,
    /// Disconnect.
    Quit {
        /// Farewell message.
        message: String,
    },
}

impl ClientPacket {
    /// Wire id.
    pub fn id(&self) -> u8 {
        match self {
            ClientPacket::Ping => 0,
            ClientPacket::Login { .. } => 1,
            ClientPacket::Handshake { .. } => 2,
            ClientPacket::Chat { .. } => 3,
            ClientPacket::Inventory { .. } => 5,
            ClientPacket::Respawn => 9,
            ClientPacket::Flying { .. } => 10,
            ClientPacket::Position { .. } => 11,
            ClientPacket::Look { .. } => 12,
            ClientPacket::PositionLook { .. } => 13,
            ClientPacket::Digging { .. } => 14,
            ClientPacket::Build { .. } => 15,
            ClientPacket::Equip { .. } => 16,
            ClientPacket::Animation { .. } => 18,
            ClientPacket::Quit { .. } => 255,
        }
    }

    /// Whether `id` names a client packet this codec can decode.
    pub fn is_known_id(id: u8) -> bool {
        matches!(id, 0..=3 | 5 | 9..=16 | 18 | 255)
    }

    /// Verify message limits and validity.
    ///
    /// Called on every decoded packet before it reaches a handler.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ClientPacket::Handshake { username } | ClientPacket::Login { username, .. } => {
                if username.is_empty() || username.len() > MAX_USERNAME_LEN {
                    return Err("Username length out of range");
                }
            }
            ClientPacket::Chat { message } => {
                if message.len() > MAX_CHAT_LEN {
                    return Err("Chat message too long");
                }
            }
            ClientPacket::Inventory { slots, .. } => {
                if slots.len() > MAX_INVENTORY_SLOTS {
                    return Err("Too many inventory slots");
                }
            }
            ClientPacket::Position { x, y, stance, z, .. } => {
                if ![x, y, stance, z].iter().all(|v| v.is_finite()) {
                    return Err("Non-finite position");
                }
            }
            ClientPacket::Look { yaw, pitch, .. } => {
                if !yaw.is_finite() || !pitch.is_finite() {
                    return Err("Non-finite orientation");
                }
            }
            ClientPacket::PositionLook {
                x,
                y,
                stance,
                z,
                yaw,
                pitch,
                ..
            } => {
                if ![x, y, stance, z].iter().all(|v| v.is_finite())
                    || !yaw.is_finite()
                    || !pitch.is_finite()
                {
                    return Err("Non-finite position");
                }
            }
            ClientPacket::Quit { message } => {
                if message.len() > MAX_REASON_LEN {
                    return Err("Quit message too long");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Packets sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerPacket {
    /// Keepalive.
    Ping,
    /// Login succeeded.
    LoginAccepted {
        /// Entity id of the player.
        entity_id: EntityId,
    },
    /// Handshake challenge; "-" means no credential check.
    HandshakeAck {
        /// Challenge string.
        challenge: String,
    },
    /// Chat line.
    Chat {
        /// Message text.
        message: String,
    },
    /// Current world time.
    Time {
        /// World tick.
        tick: u64,
    },
    /// World spawn point, used by the compass.
    SpawnPosition {
        /// Spawn X.
        x: i32,
        /// Spawn Y.
        y: i32,
        /// Spawn Z.
        z: i32,
    },
    /// Authoritative player position and orientation.
    PositionLook {
        /// World X.
        x: f64,
        /// World Y (feet).
        y: f64,
        /// Eye height.
        stance: f64,
        /// World Z.
        z: f64,
        /// Yaw in degrees.
        yaw: f32,
        /// Pitch in degrees.
        pitch: f32,
        /// On-ground flag.
        on_ground: bool,
    },
    /// Another player came into view.
    PlayerSpawn {
        /// Player entity.
        entity_id: EntityId,
        /// Login name.
        username: String,
        /// X in 1/32 blocks.
        x: i32,
        /// Y in 1/32 blocks.
        y: i32,
        /// Z in 1/32 blocks.
        z: i32,
    },
    /// Dropped item appeared.
    SpawnPickup {
        /// Pickup entity.
        entity_id: EntityId,
        /// Dropped stack.
        item: ItemStack,
        /// X in 1/32 blocks.
        x: i32,
        /// Y in 1/32 blocks.
        y: i32,
        /// Z in 1/32 blocks.
        z: i32,
    },
    /// Items were added to the receiving player's inventory.
    AddToInventory {
        /// Added stack.
        item: ItemStack,
    },
    /// A player collected a pickup.
    CollectItem {
        /// Collected pickup.
        collected: EntityId,
        /// Collecting player.
        collector: EntityId,
    },
    /// Entity is live and may receive updates.
    CreateEntity {
        /// Created entity.
        entity_id: EntityId,
    },
    /// Entity is gone.
    DestroyEntity {
        /// Destroyed entity.
        entity_id: EntityId,
    },
    /// Allocate client-side storage for a chunk.
    ChunkEnable {
        /// Chunk X.
        x: i32,
        /// Chunk Z.
        z: i32,
    },
    /// Release client-side storage for a chunk.
    ChunkDisable {
        /// Chunk X.
        x: i32,
        /// Chunk Z.
        z: i32,
    },
    /// Full chunk contents.
    ChunkData(ChunkPayload),
    /// Single block changed.
    BlockChange {
        /// Block X.
        x: i32,
        /// Block Y.
        y: i32,
        /// Block Z.
        z: i32,
        /// New block id.
        block: BlockId,
        /// New metadata.
        metadata: u8,
    },
    /// Open a container window.
    OpenWindow {
        /// Session-local window id.
        window_id: u8,
        /// Window type (1 = workbench).
        kind: u8,
        /// Window title.
        title: String,
        /// Slot count.
        slots: u8,
    },
    /// Full contents of one player container.
    InventorySnapshot {
        /// Container discriminant (-1 holdables, -2 crafting, -3 armor).
        container: i32,
        /// Slot contents.
        slots: Vec<Option<ItemStack>>,
    },
    /// Error notification; the connection closes after it.
    Error {
        /// Reason shown to the player.
        message: String,
    },
}

impl ServerPacket {
    /// Wire id.
    pub fn id(&self) -> u8 {
        match self {
            ServerPacket::Ping => 0,
            ServerPacket::LoginAccepted { .. } => 1,
            ServerPacket::HandshakeAck { .. } => 2,
            ServerPacket::Chat { .. } => 3,
            ServerPacket::Time { .. } => 4,
            ServerPacket::SpawnPosition { .. } => 6,
            ServerPacket::PositionLook { .. } => 13,
            ServerPacket::AddToInventory { .. } => 17,
            ServerPacket::PlayerSpawn { .. } => 20,
            ServerPacket::SpawnPickup { .. } => 21,
            ServerPacket::CollectItem { .. } => 22,
            ServerPacket::DestroyEntity { .. } => 29,
            ServerPacket::CreateEntity { .. } => 30,
            ServerPacket::ChunkEnable { .. } | ServerPacket::ChunkDisable { .. } => 50,
            ServerPacket::ChunkData(_) => 51,
            ServerPacket::BlockChange { .. } => 53,
            ServerPacket::OpenWindow { .. } => 100,
            ServerPacket::InventorySnapshot { .. } => 104,
            ServerPacket::Error { .. } => 255,
        }
    }

    /// Whether `id` names a server packet this codec can decode.
    pub fn is_known_id(id: u8) -> bool {
        matches!(
            id,
            0..=4 | 6 | 13 | 17 | 20..=22 | 29 | 30 | 50 | 51 | 53 | 100 | 104 | 255
        )
    }

    /// Verify message limits and validity.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ServerPacket::Chat { message } => {
                // Join notices are built from a username plus a fixed suffix.
                if message.len() > MAX_CHAT_LEN + MAX_USERNAME_LEN {
                    return Err("Chat message too long");
                }
            }
            ServerPacket::ChunkData(payload) => {
                payload.verify()?;
            }
            ServerPacket::Error { message } => {
                if message.len() > MAX_REASON_LEN {
                    return Err("Error message too long");
                }
            }
            ServerPacket::InventorySnapshot { slots, .. } => {
                if slots.len() > MAX_INVENTORY_SLOTS {
                    return Err("Too many inventory slots");
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ids_are_known() {
        let packets = [
            ClientPacket::Ping,
            ClientPacket::Respawn,
            ClientPacket::Flying { on_ground: true },
            ClientPacket::Equip { slot: 3 },
            ClientPacket::Quit {
                message: "bye".into(),
            },
        ];
        for packet in packets {
            assert!(ClientPacket::is_known_id(packet.id()));
        }
        assert!(!ClientPacket::is_known_id(4));
        assert!(!ClientPacket::is_known_id(17));
    }

    #[test]
    fn test_server_ids_are_known() {
        assert!(ServerPacket::is_known_id(ServerPacket::Ping.id()));
        assert!(ServerPacket::is_known_id(
            ServerPacket::ChunkDisable { x: 0, z: 0 }.id()
        ));
        assert!(!ServerPacket::is_known_id(7));
    }

    #[test]
    fn test_verify_rejects_long_chat() {
        let packet = ClientPacket::Chat {
            message: "a".repeat(MAX_CHAT_LEN + 1),
        };
        assert!(packet.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_empty_username() {
        let packet = ClientPacket::Handshake {
            username: String::new(),
        };
        assert!(packet.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_non_finite_position() {
        let packet = ClientPacket::Position {
            x: f64::NAN,
            y: 64.0,
            stance: 65.6,
            z: 0.0,
            on_ground: true,
        };
        assert!(packet.verify().is_err());
    }

    #[test]
    fn test_verify_accepts_regular_movement() {
        let packet = ClientPacket::PositionLook {
            x: 0.5,
            y: 64.0,
            stance: 65.62,
            z: 0.5,
            yaw: 90.0,
            pitch: 0.0,
            on_ground: true,
        };
        assert!(packet.verify().is_ok());
    }
}
