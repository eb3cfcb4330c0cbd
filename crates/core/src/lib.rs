#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod coords;
pub mod item;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use coords::{BlockPos, ChunkKey, Face, LocalPos, CHUNK_HEIGHT, CHUNK_SIZE};
pub use item::ItemStack;

/// Block identifier referencing the catalog.
pub type BlockId = u8;

/// Item identifier. Values below 256 name blocks, values above name items.
pub type ItemId = u16;

/// Entity identifier allocated by the broadcast hub.
pub type EntityId = u32;

/// Reserved ID for air.
pub const BLOCK_AIR: BlockId = 0;

/// Fixed tick type (20 TPS => 50 ms per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_tick_advances() {
        assert_eq!(SimTick::ZERO.advance(3), SimTick(3));
        assert!(SimTick(1) < SimTick(2));
    }
}
