use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use mdbeta_core::{BlockId, ChunkKey, LocalPos, BLOCK_AIR, CHUNK_HEIGHT, CHUNK_SIZE};

/// Total block count per chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT) as usize;

/// Chunk storing block ids and per-block metadata nibbles.
#[derive(Debug, Clone)]
pub struct Chunk {
    key: ChunkKey,
    blocks: Vec<BlockId>,
    metadata: Vec<u8>,
}

impl Chunk {
    /// Allocate a fresh chunk filled with air.
    pub fn new(key: ChunkKey) -> Self {
        Self {
            key,
            blocks: vec![BLOCK_AIR; CHUNK_VOLUME],
            metadata: vec![0; CHUNK_VOLUME],
        }
    }

    #[inline]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    /// Block id at a local position.
    pub fn block(&self, pos: LocalPos) -> BlockId {
        self.blocks[pos.index()]
    }

    /// Overwrite a block, returning the previous id. Metadata is reset.
    pub fn set_block(&mut self, pos: LocalPos, id: BlockId) -> BlockId {
        let idx = pos.index();
        self.metadata[idx] = 0;
        std::mem::replace(&mut self.blocks[idx], id)
    }

    /// Metadata nibble at a local position.
    pub fn metadata(&self, pos: LocalPos) -> u8 {
        self.metadata[pos.index()]
    }

    /// Overwrite a metadata nibble (upper bits are discarded).
    pub fn set_metadata(&mut self, pos: LocalPos, value: u8) {
        self.metadata[pos.index()] = value & 0x0F;
    }

    /// Height of the first air block above the topmost solid block in a column.
    ///
    /// Returns 0 for an empty column.
    pub fn height_at(&self, x: usize, z: usize) -> i32 {
        for y in (0..CHUNK_HEIGHT as usize).rev() {
            if self.block(LocalPos { x, y, z }) != BLOCK_AIR {
                return y as i32 + 1;
            }
        }
        0
    }

    /// Write a block and its metadata by storage slot, for decoding.
    pub fn restore(&mut self, slot: usize, block: BlockId, metadata: u8) {
        self.blocks[slot] = block;
        self.metadata[slot] = metadata & 0x0F;
    }

    /// Raw block storage in [`LocalPos::index`] order, for encoding.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Raw metadata storage in [`LocalPos::index`] order, for encoding.
    pub fn metadata_raw(&self) -> &[u8] {
        &self.metadata
    }
}

/// Shared reference to a chunk owned by the world store.
///
/// Sessions hold clones of the handle; every clone observes the same blocks.
#[derive(Debug, Clone)]
pub struct ChunkHandle {
    key: ChunkKey,
    inner: Arc<RwLock<Chunk>>,
}

impl ChunkHandle {
    /// Wrap a chunk for sharing.
    pub fn new(chunk: Chunk) -> Self {
        Self {
            key: chunk.key(),
            inner: Arc::new(RwLock::new(chunk)),
        }
    }

    #[inline]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    /// Shared access. A poisoned lock still yields the data: chunk writes are single assignments.
    pub fn read(&self) -> RwLockReadGuard<'_, Chunk> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Exclusive access; see [`ChunkHandle::read`] for poisoning.
    pub fn write(&self) -> RwLockWriteGuard<'_, Chunk> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when both handles refer to the same stored chunk.
    pub fn same_chunk(&self, other: &ChunkHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
