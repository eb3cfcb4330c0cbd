//! Entities tracked by the broadcast hub.

use mdbeta_core::{EntityId, ItemStack};
use serde::{Deserialize, Serialize};

/// Closed set of entity variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityKind {
    /// Dropped item waiting to be collected.
    Pickup {
        /// Dropped stack.
        item: ItemStack,
    },
    /// A connected player.
    Player {
        /// Login name.
        username: String,
    },
}

/// Entity with a position in 1/32-block units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Hub-allocated identity.
    pub id: EntityId,
    /// X in 1/32 blocks.
    pub x: i32,
    /// Y in 1/32 blocks.
    pub y: i32,
    /// Z in 1/32 blocks.
    pub z: i32,
    /// Variant data.
    pub kind: EntityKind,
}

impl Entity {
    /// True for dropped items.
    pub fn is_pickup(&self) -> bool {
        matches!(self.kind, EntityKind::Pickup { .. })
    }

    /// Taxicab distance to a point, in 1/32 blocks.
    pub fn taxicab(&self, x: i32, y: i32, z: i32) -> i64 {
        (i64::from(self.x) - i64::from(x)).abs()
            + (i64::from(self.y) - i64::from(y)).abs()
            + (i64::from(self.z) - i64::from(z)).abs()
    }
}
