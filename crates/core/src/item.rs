//! Inventory item stacks.

use serde::{Deserialize, Serialize};

use crate::ItemId;

/// A stack of items occupying one inventory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemStack {
    /// Block or item id.
    pub id: ItemId,
    /// Number of items in the stack.
    pub count: u8,
    /// Damage/wear value (tools) or variant (blocks).
    pub damage: u16,
}

impl ItemStack {
    /// Create an undamaged stack.
    pub fn new(id: ItemId, count: u8) -> Self {
        Self {
            id,
            count,
            damage: 0,
        }
    }
}
