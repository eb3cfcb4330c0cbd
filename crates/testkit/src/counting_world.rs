//! World store wrapper that records chunk fetches and injects failures.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use mdbeta_core::{BlockPos, ChunkKey};
use mdbeta_world::{ChunkHandle, MemoryWorld, PlayerData, WorldStore};
use tracing::trace;

/// A [`MemoryWorld`] that counts every `load_chunk` call.
pub struct CountingWorld {
    inner: MemoryWorld,
    fetches: Mutex<Vec<ChunkKey>>,
    failing: Mutex<HashSet<ChunkKey>>,
    delay: Option<Duration>,
}

impl CountingWorld {
    /// Wrap a memory world.
    pub fn new(inner: MemoryWorld) -> Self {
        Self {
            inner,
            fetches: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            delay: None,
        }
    }

    /// Sleep for `delay` inside every chunk fetch, so fetches become real suspension points.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every later fetch of `key` fail.
    pub fn fail_on(&self, key: ChunkKey) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    /// Every fetched key, in request order.
    pub fn fetches(&self) -> Vec<ChunkKey> {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of fetches of `key`.
    pub fn fetch_count(&self, key: ChunkKey) -> usize {
        self.fetches().iter().filter(|fetched| **fetched == key).count()
    }

    /// Forget recorded fetches.
    pub fn reset(&self) {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The wrapped world.
    pub fn inner(&self) -> &MemoryWorld {
        &self.inner
    }
}

impl Default for CountingWorld {
    fn default() -> Self {
        Self::new(MemoryWorld::default())
    }
}

#[async_trait]
impl WorldStore for CountingWorld {
    async fn load_chunk(&self, key: ChunkKey) -> Result<ChunkHandle> {
        trace!(%key, "counted chunk fetch");
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key);
        if failing {
            bail!("injected failure loading chunk {key}");
        }
        self.inner.load_chunk(key).await
    }

    async fn get_metadata(&self, pos: BlockPos) -> Result<u8> {
        self.inner.get_metadata(pos).await
    }

    async fn set_metadata(&self, pos: BlockPos, value: u8) -> Result<()> {
        self.inner.set_metadata(pos, value).await
    }

    async fn load_player(&self, username: &str) -> Result<Option<PlayerData>> {
        self.inner.load_player(username).await
    }

    async fn save_player(&self, username: &str, data: &PlayerData) -> Result<()> {
        self.inner.save_player(username, data).await
    }

    fn spawn(&self) -> BlockPos {
        self.inner.spawn()
    }
}
