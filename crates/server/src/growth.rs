//! Sapling growth.
//!
//! Every planted sapling gets a task that sleeps a random delay, ages the
//! sapling by one stage and goes back to sleep until the sapling is old enough
//! to become a tree. Digging a tracked coordinate cancels its task.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use mdbeta_core::{BlockId, BlockPos, BLOCK_AIR};
use mdbeta_net::ServerPacket;
use mdbeta_world::{WorldStore, BLOCK_LEAVES, BLOCK_LOG, BLOCK_SAPLING};
use rand::Rng;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::hub::BroadcastHub;

/// Metadata increment per growth stage.
pub const GROWTH_STAGE: u8 = 4;

/// Sapling metadata at which the next stage grows a tree.
pub const MATURE_METADATA: u8 = 12;

/// Outcome of one growth step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthStep {
    /// The sapling aged and stays tracked.
    Aged(u8),
    /// A tree replaced the sapling.
    Grown,
    /// The block is no longer a sapling.
    Gone,
}

struct Track {
    generation: u64,
    task: AbortHandle,
}

#[derive(Default)]
struct Tracks {
    next_generation: u64,
    by_pos: HashMap<BlockPos, Track>,
}

struct GrowthInner {
    world: Arc<dyn WorldStore>,
    hub: Arc<BroadcastHub>,
    delay_secs: RangeInclusive<u64>,
    tracks: Mutex<Tracks>,
}

/// Tracks growing saplings by coordinate. Cheap to clone.
#[derive(Clone)]
pub struct GrowthScheduler {
    inner: Arc<GrowthInner>,
}

impl GrowthScheduler {
    /// Create a scheduler whose steps fire after a random delay in `delay_secs`.
    pub fn new(
        world: Arc<dyn WorldStore>,
        hub: Arc<BroadcastHub>,
        delay_secs: RangeInclusive<u64>,
    ) -> Self {
        Self {
            inner: Arc::new(GrowthInner {
                world,
                hub,
                delay_secs,
                tracks: Mutex::new(Tracks::default()),
            }),
        }
    }

    fn tracks(&self) -> MutexGuard<'_, Tracks> {
        self.inner.tracks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking a sapling, replacing any existing track at `pos`.
    pub fn schedule(&self, pos: BlockPos) {
        let mut tracks = self.tracks();
        tracks.next_generation += 1;
        let generation = tracks.next_generation;

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.next_delay()).await;
                match inner.step(pos).await {
                    Ok(GrowthStep::Aged(metadata)) => {
                        debug!(%pos, metadata, "sapling aged");
                    }
                    Ok(GrowthStep::Grown) => {
                        debug!(%pos, "sapling grew into a tree");
                        break;
                    }
                    Ok(GrowthStep::Gone) => break,
                    Err(err) => {
                        warn!(%pos, "sapling growth failed: {err:#}");
                        break;
                    }
                }
            }
            inner.untrack(pos, generation);
        });

        if let Some(previous) = tracks.by_pos.insert(
            pos,
            Track {
                generation,
                task: task.abort_handle(),
            },
        ) {
            previous.task.abort();
        }
    }

    /// Stop tracking `pos`. Returns true if a track was cancelled.
    pub fn cancel(&self, pos: BlockPos) -> bool {
        match self.tracks().by_pos.remove(&pos) {
            Some(track) => {
                track.task.abort();
                debug!(%pos, "sapling growth cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether `pos` has a live track.
    pub fn is_tracked(&self, pos: BlockPos) -> bool {
        self.tracks().by_pos.contains_key(&pos)
    }

    /// Number of live tracks.
    pub fn pending(&self) -> usize {
        self.tracks().by_pos.len()
    }

    /// Run one growth step at `pos` immediately.
    pub async fn step(&self, pos: BlockPos) -> Result<GrowthStep> {
        self.inner.step(pos).await
    }
}

impl GrowthInner {
    fn next_delay(&self) -> Duration {
        let secs = rand::thread_rng().gen_range(self.delay_secs.clone());
        Duration::from_secs(secs)
    }

    fn untrack(&self, pos: BlockPos, generation: u64) {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        if tracks
            .by_pos
            .get(&pos)
            .is_some_and(|track| track.generation == generation)
        {
            tracks.by_pos.remove(&pos);
        }
    }

    async fn step(&self, pos: BlockPos) -> Result<GrowthStep> {
        if self.block_at(pos).await? != Some(BLOCK_SAPLING) {
            return Ok(GrowthStep::Gone);
        }

        let metadata = self.world.get_metadata(pos).await?;
        if metadata >= MATURE_METADATA {
            self.grow_tree(pos, metadata % 4).await?;
            return Ok(GrowthStep::Grown);
        }

        let aged = metadata + GROWTH_STAGE;
        self.world.set_metadata(pos, aged).await?;
        self.hub.broadcast_scoped_to_chunk(
            ServerPacket::BlockChange {
                x: pos.x,
                y: pos.y,
                z: pos.z,
                block: BLOCK_SAPLING,
                metadata: aged,
            },
            pos.chunk(),
        );
        Ok(GrowthStep::Aged(aged))
    }

    async fn block_at(&self, pos: BlockPos) -> Result<Option<BlockId>> {
        let Some((key, local)) = pos.split() else {
            return Ok(None);
        };
        let chunk = self.world.load_chunk(key).await?;
        let block = chunk.read().block(local);
        Ok(Some(block))
    }

    async fn grow_tree(&self, base: BlockPos, variant: u8) -> Result<()> {
        for (pos, block, overwrite) in tree_blocks(base, variant) {
            let Some((key, local)) = pos.split() else {
                continue;
            };
            let chunk = self.world.load_chunk(key).await?;
            {
                let mut chunk = chunk.write();
                let current = chunk.block(local);
                if !overwrite && current != BLOCK_AIR {
                    continue;
                }
                chunk.set_block(local, block);
                chunk.set_metadata(local, variant);
            }
            self.hub.broadcast_scoped_to_chunk(
                ServerPacket::BlockChange {
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                    block,
                    metadata: variant,
                },
                key,
            );
        }
        Ok(())
    }
}

/// Blocks of a tree rooted at `base`: (position, block, replaces non-air).
///
/// The trunk is `4 + variant` logs tall. Leaves fill two wide layers below the
/// trunk top and a narrow cap above it, and only ever fill air.
pub fn tree_blocks(base: BlockPos, variant: u8) -> Vec<(BlockPos, BlockId, bool)> {
    let height = 4 + i32::from(variant % 4);
    let mut blocks: Vec<(BlockPos, BlockId, bool)> = (0..height)
        .filter_map(|dy| base.translate(0, dy, 0))
        .map(|pos| (pos, BLOCK_LOG, true))
        .collect();

    for dy in height - 2..=height {
        let radius: i32 = if dy == height { 1 } else { 2 };
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let corner = dx.abs() == 2 && dz.abs() == 2;
                let trunk = dx == 0 && dz == 0 && dy < height;
                if corner || trunk {
                    continue;
                }
                if let Some(pos) = base.translate(dx, dy, dz) {
                    blocks.push((pos, BLOCK_LEAVES, false));
                }
            }
        }
    }
    blocks
}
