//! Per-session chunk window.
//!
//! Holds the chunks streamed to one client together with a touch counter per
//! chunk. Both live in the same table, so a key can never have a handle
//! without a counter or the other way round.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mdbeta_core::ChunkKey;
use mdbeta_net::{ChunkPayload, ServerPacket};
use mdbeta_world::{ChunkHandle, WorldStore};
use tracing::{debug, instrument, trace};

use crate::error::SessionError;
use crate::hub::{BroadcastHub, SessionId};
use crate::outbox::Outbox;

type ChunkFetch = Pin<Box<dyn Future<Output = anyhow::Result<ChunkHandle>> + Send>>;

/// All keys in the square of side `2 * radius` around `center`, nearest first.
///
/// The square spans `center - radius` up to but excluding `center + radius` on
/// each axis. Ties in distance are broken by key order.
pub fn visible_keys(center: ChunkKey, radius: i32) -> Vec<ChunkKey> {
    let mut keys: Vec<ChunkKey> = (center.x - radius..center.x + radius)
        .flat_map(|x| (center.z - radius..center.z + radius).map(move |z| ChunkKey::new(x, z)))
        .collect();
    keys.sort_by_key(|key| (key.distance_sq(center), *key));
    keys
}

/// Whether `key` lies in the visibility square around `center`.
pub fn is_visible(center: ChunkKey, key: ChunkKey, radius: i32) -> bool {
    (center.x - radius..center.x + radius).contains(&key.x)
        && (center.z - radius..center.z + radius).contains(&key.z)
}

struct WindowEntry {
    chunk: ChunkHandle,
    touches: u64,
}

/// An in-progress window refresh: one chunk per step, nearest first.
struct WindowRefresh {
    center: ChunkKey,
    queue: VecDeque<ChunkKey>,
    /// Fetch for the front of the queue. Kept here so an interrupted step resumes it.
    in_flight: Option<ChunkFetch>,
}

/// Result of one refresh step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshProgress {
    /// No refresh is running.
    Idle,
    /// One key was enabled; more remain.
    Enabled(ChunkKey),
    /// The queue is exhausted and the window was pruned.
    Finished {
        /// Keys evicted by the closing prune.
        evicted: Vec<ChunkKey>,
    },
}

/// The set of chunks one session streams to its client.
pub struct ChunkWindow {
    session: SessionId,
    world: Arc<dyn WorldStore>,
    hub: Arc<BroadcastHub>,
    outbox: Outbox,
    radius: i32,
    capacity: usize,
    entries: HashMap<ChunkKey, WindowEntry>,
    refresh: Option<WindowRefresh>,
}

impl ChunkWindow {
    /// Create an empty window.
    pub fn new(
        session: SessionId,
        world: Arc<dyn WorldStore>,
        hub: Arc<BroadcastHub>,
        outbox: Outbox,
        radius: i32,
        capacity: usize,
    ) -> Self {
        Self {
            session,
            world,
            hub,
            outbox,
            radius,
            capacity,
            entries: HashMap::new(),
            refresh: None,
        }
    }

    /// Number of chunks in the window.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no chunk is streamed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is streamed.
    pub fn contains(&self, key: ChunkKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Handle for a streamed chunk.
    pub fn chunk(&self, key: ChunkKey) -> Option<&ChunkHandle> {
        self.entries.get(&key).map(|entry| &entry.chunk)
    }

    /// Touch count for a streamed chunk.
    pub fn touches(&self, key: ChunkKey) -> Option<u64> {
        self.entries.get(&key).map(|entry| entry.touches)
    }

    /// Streamed keys in sorted order.
    pub fn keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<ChunkKey> = self.entries.keys().copied().collect();
        keys.sort();
        keys
    }

    /// Visibility radius in chunks.
    pub fn radius(&self) -> i32 {
        self.radius
    }

    /// Soft capacity enforced by [`ChunkWindow::prune`].
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Count a use of `key`, streaming the chunk to the client if it is not
    /// already in the window.
    ///
    /// The store fetch is a suspension point.
    pub async fn enable(&mut self, key: ChunkKey) -> Result<ChunkHandle, SessionError> {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.touches += 1;
            return Ok(entry.chunk.clone());
        }
        let chunk = self
            .world
            .load_chunk(key)
            .await
            .map_err(SessionError::Store)?;
        self.admit(chunk)
    }

    /// Insert a fetched chunk, or count a touch if it arrived while we were suspended.
    fn admit(&mut self, chunk: ChunkHandle) -> Result<ChunkHandle, SessionError> {
        let key = chunk.key();
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.touches += 1;
            return Ok(entry.chunk.clone());
        }

        self.outbox.send(ServerPacket::ChunkEnable { x: key.x, z: key.z })?;
        let payload = ChunkPayload::encode(&chunk.read());
        self.outbox.send(ServerPacket::ChunkData(payload))?;

        trace!(session = %self.session, %key, "chunk enabled");
        self.entries.insert(
            key,
            WindowEntry {
                chunk: chunk.clone(),
                touches: 1,
            },
        );
        self.hub.add_interest(key, self.session);
        Ok(chunk)
    }

    /// Drop `key` from the window and tell the client to release it.
    ///
    /// This is the only removal path. Returns false if the key was not streamed.
    pub fn disable(&mut self, key: ChunkKey) -> bool {
        if self.entries.remove(&key).is_none() {
            return false;
        }
        self.hub.remove_interest(key, self.session);
        if self
            .outbox
            .send(ServerPacket::ChunkDisable { x: key.x, z: key.z })
            .is_err()
        {
            trace!(session = %self.session, %key, "chunk disable not delivered");
        }
        true
    }

    /// Start streaming the visibility square around `center`, replacing any
    /// refresh still in progress.
    pub fn refresh_window(&mut self, center: ChunkKey) {
        debug!(session = %self.session, %center, "refreshing chunk window");
        self.refresh = Some(WindowRefresh {
            center,
            queue: visible_keys(center, self.radius).into(),
            in_flight: None,
        });
    }

    /// True while a refresh has keys left or still has to prune.
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_some()
    }

    /// Drop any refresh in progress, including its in-flight fetch.
    pub fn cancel_refresh(&mut self) {
        self.refresh = None;
    }

    /// Enable the next key of the running refresh, then yield to the scheduler.
    ///
    /// Dropping the returned future part way loses nothing: an interrupted fetch
    /// is resumed by the next call.
    pub async fn refresh_step(&mut self) -> Result<RefreshProgress, SessionError> {
        let Some(refresh) = self.refresh.as_mut() else {
            return Ok(RefreshProgress::Idle);
        };
        let Some(&key) = refresh.queue.front() else {
            let center = refresh.center;
            self.refresh = None;
            let evicted = self.prune(center);
            return Ok(RefreshProgress::Finished { evicted });
        };

        if let Some(entry) = self.entries.get_mut(&key) {
            // An interrupted fetch for a key enabled since then is stale.
            entry.touches += 1;
            refresh.in_flight = None;
            refresh.queue.pop_front();
        } else {
            let world = Arc::clone(&self.world);
            let fetch = refresh.in_flight.get_or_insert_with(|| {
                let fetch: ChunkFetch = Box::pin(async move { world.load_chunk(key).await });
                fetch
            });
            let fetched = fetch.as_mut().await;
            refresh.in_flight = None;
            refresh.queue.pop_front();
            self.admit(fetched.map_err(SessionError::Store)?)?;
        }

        tokio::task::yield_now().await;
        Ok(RefreshProgress::Enabled(key))
    }

    /// Run the current refresh to completion.
    pub async fn finish_refresh(&mut self) -> Result<Vec<ChunkKey>, SessionError> {
        loop {
            match self.refresh_step().await? {
                RefreshProgress::Enabled(_) => {}
                RefreshProgress::Idle => return Ok(Vec::new()),
                RefreshProgress::Finished { evicted } => return Ok(evicted),
            }
        }
    }

    /// Evict least-touched chunks outside the visibility square around `center`
    /// until the window is under capacity.
    ///
    /// Chunks inside the square are never evicted, so the window may stay above
    /// capacity.
    #[instrument(skip(self), fields(session = %self.session, len = self.entries.len()))]
    pub fn prune(&mut self, center: ChunkKey) -> Vec<ChunkKey> {
        if self.entries.len() <= self.capacity {
            return Vec::new();
        }

        let mut victims: Vec<(u64, ChunkKey)> = self
            .entries
            .iter()
            .filter(|(key, _)| !is_visible(center, **key, self.radius))
            .map(|(key, entry)| (entry.touches, *key))
            .collect();
        victims.sort();

        let mut evicted = Vec::new();
        for (_, key) in victims {
            if self.entries.len() < self.capacity {
                break;
            }
            self.disable(key);
            evicted.push(key);
        }
        debug!(evicted = evicted.len(), remaining = self.entries.len(), "pruned chunk window");
        evicted
    }

    /// Forget every chunk without notifying the client. Used when the session closes.
    pub fn release_all(&mut self) {
        self.cancel_refresh();
        for key in self.entries.keys() {
            self.hub.remove_interest(*key, self.session);
        }
        self.entries.clear();
    }
}
