//! World store seam and the in-memory flat world used by the default server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use mdbeta_core::{BlockId, BlockPos, ChunkKey, LocalPos, CHUNK_HEIGHT, CHUNK_SIZE};
use tracing::debug;

use crate::blocks::{BLOCK_BEDROCK, BLOCK_DIRT, BLOCK_GRASS, BLOCK_STONE};
use crate::chunk::{Chunk, ChunkHandle};
use crate::player::PlayerData;

/// Durable chunk and player data.
///
/// Every async method is a suspension point for the calling session.
#[async_trait]
pub trait WorldStore: Send + Sync {
    /// Load (or generate) the chunk at `key`. Repeated loads return handles to the same chunk.
    async fn load_chunk(&self, key: ChunkKey) -> Result<ChunkHandle>;

    /// Read the metadata nibble at a block.
    async fn get_metadata(&self, pos: BlockPos) -> Result<u8>;

    /// Write the metadata nibble at a block.
    async fn set_metadata(&self, pos: BlockPos, value: u8) -> Result<()>;

    /// Persisted data for a player, if any.
    async fn load_player(&self, username: &str) -> Result<Option<PlayerData>>;

    /// Persist a player's data.
    async fn save_player(&self, username: &str, data: &PlayerData) -> Result<()>;

    /// World spawn point.
    fn spawn(&self) -> BlockPos;
}

/// One layer of a flat world, from `min_y` to `max_y` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    /// Block filling the layer.
    pub block: BlockId,
    /// Lowest height.
    pub min_y: i32,
    /// Highest height.
    pub max_y: i32,
}

/// Default layering: bedrock floor, stone, dirt and a grass surface at y=63.
pub const FLAT_LAYERS: [Layer; 4] = [
    Layer {
        block: BLOCK_BEDROCK,
        min_y: 0,
        max_y: 0,
    },
    Layer {
        block: BLOCK_STONE,
        min_y: 1,
        max_y: 59,
    },
    Layer {
        block: BLOCK_DIRT,
        min_y: 60,
        max_y: 62,
    },
    Layer {
        block: BLOCK_GRASS,
        min_y: 63,
        max_y: 63,
    },
];

/// Generate a flat chunk from layers.
pub fn generate_flat(key: ChunkKey, layers: &[Layer]) -> Chunk {
    let mut chunk = Chunk::new(key);
    for layer in layers {
        let low = layer.min_y.max(0);
        let high = layer.max_y.min(CHUNK_HEIGHT - 1);
        for x in 0..CHUNK_SIZE as usize {
            for z in 0..CHUNK_SIZE as usize {
                for y in low..=high {
                    chunk.set_block(
                        LocalPos {
                            x,
                            y: y as usize,
                            z,
                        },
                        layer.block,
                    );
                }
            }
        }
    }
    chunk
}

/// In-memory world that generates flat chunks on first access.
///
/// Chunks are kept in a BTreeMap so iteration order is deterministic.
pub struct MemoryWorld {
    spawn: BlockPos,
    layers: Vec<Layer>,
    chunks: Mutex<BTreeMap<ChunkKey, ChunkHandle>>,
    players: Mutex<HashMap<String, PlayerData>>,
}

impl MemoryWorld {
    /// Flat world with the default layers.
    pub fn new(spawn: BlockPos) -> Self {
        Self::with_layers(spawn, FLAT_LAYERS.to_vec())
    }

    /// Flat world with custom layers. An empty layer list generates empty chunks.
    pub fn with_layers(spawn: BlockPos, layers: Vec<Layer>) -> Self {
        Self {
            spawn,
            layers,
            chunks: Mutex::new(BTreeMap::new()),
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Get or generate a chunk without suspending.
    pub fn chunk(&self, key: ChunkKey) -> ChunkHandle {
        let mut chunks = self.chunks.lock().unwrap_or_else(PoisonError::into_inner);
        chunks
            .entry(key)
            .or_insert_with(|| {
                debug!(%key, "generating flat chunk");
                ChunkHandle::new(generate_flat(key, &self.layers))
            })
            .clone()
    }

    /// Number of chunks generated so far.
    pub fn len(&self) -> usize {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no chunk has been generated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident chunk keys in sorted order.
    pub fn keys(&self) -> Vec<ChunkKey> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Block at a world position; `None` above or below the world.
    pub fn block(&self, pos: BlockPos) -> Option<BlockId> {
        let (key, local) = pos.split()?;
        let handle = self.chunk(key);
        let block = handle.read().block(local);
        Some(block)
    }
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new(BlockPos::new(0, 64, 0))
    }
}

#[async_trait]
impl WorldStore for MemoryWorld {
    async fn load_chunk(&self, key: ChunkKey) -> Result<ChunkHandle> {
        Ok(self.chunk(key))
    }

    async fn get_metadata(&self, pos: BlockPos) -> Result<u8> {
        let Some((key, local)) = pos.split() else {
            bail!("metadata read outside the world at {pos}");
        };
        let handle = self.chunk(key);
        let value = handle.read().metadata(local);
        Ok(value)
    }

    async fn set_metadata(&self, pos: BlockPos, value: u8) -> Result<()> {
        let Some((key, local)) = pos.split() else {
            bail!("metadata write outside the world at {pos}");
        };
        self.chunk(key).write().set_metadata(local, value);
        Ok(())
    }

    async fn load_player(&self, username: &str) -> Result<Option<PlayerData>> {
        Ok(self
            .players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .cloned())
    }

    async fn save_player(&self, username: &str, data: &PlayerData) -> Result<()> {
        debug!(username, "saving player");
        self.players
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(username.to_string(), data.clone());
        Ok(())
    }

    fn spawn(&self) -> BlockPos {
        self.spawn
    }
}
