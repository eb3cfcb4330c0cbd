//! One client connection: phase machine, packet dispatch and gameplay handlers.
//!
//! A [`Session`] is driven by its connection task. Bytes go in through
//! [`Session::data_received`]; everything the session says to its own client
//! goes out through the [`Outbox`], and everything addressed to other sessions
//! goes through the [`BroadcastHub`].

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use mdbeta_core::{BlockId, BlockPos, ChunkKey, EntityId, Face, ItemStack, CHUNK_SIZE};
use mdbeta_net::{
    compute_schema_hash, decode_client_frame, ClientPacket, DigState, Frame, Replicate,
    ServerPacket, MAX_REASON_LEN, PROTOCOL_VERSION,
};
use mdbeta_world::{
    BlockCatalog, ContainerKind, Entity, EntityKind, Location, Player, WorldClock, WorldStore,
    BLOCK_SAPLING, BLOCK_WORKBENCH,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::chunk_window::{ChunkWindow, RefreshProgress};
use crate::error::{Disposition, SessionError};
use crate::growth::GrowthScheduler;
use crate::hub::{BroadcastHub, SessionId};
use crate::keepalive::KeepaliveScheduler;
use crate::outbox::Outbox;

/// Window type announced for workbenches.
pub const WORKBENCH_WINDOW_KIND: u8 = 1;

/// Authentication phase of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Waiting for a handshake.
    Unauthenticated,
    /// Handshake answered, waiting for a login.
    Challenged,
    /// Logged in; gameplay packets are accepted.
    Authenticated,
    /// Terminal.
    Closed,
}

/// Tunables shared by every session on a server.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Half-width of the visibility square, in chunks.
    pub view_radius: i32,
    /// Soft cap on chunks held per session.
    pub window_capacity: usize,
    /// Ping cadence.
    pub ping_interval: Duration,
    /// World time cadence.
    pub time_interval: Duration,
    /// Pickup collection radius (taxicab, 1/32 blocks).
    pub pickup_radius: i64,
    /// Range of delays between sapling growth stages, in seconds.
    pub growth_delay_secs: RangeInclusive<u64>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            view_radius: 10,
            window_capacity: 600,
            ping_interval: Duration::from_secs(5),
            time_interval: Duration::from_secs(10),
            pickup_radius: 64,
            growth_delay_secs: 15..=60,
        }
    }
}

/// Server-wide collaborators handed to every session.
#[derive(Clone)]
pub struct SessionContext {
    /// Authoritative chunk and player storage.
    pub world: Arc<dyn WorldStore>,
    /// Session registry and entity table.
    pub hub: Arc<BroadcastHub>,
    /// Block properties.
    pub catalog: Arc<BlockCatalog>,
    /// Shared world clock.
    pub clock: Arc<WorldClock>,
    /// Sapling growth tracks.
    pub growth: GrowthScheduler,
    /// Tunables.
    pub settings: SessionSettings,
}

impl SessionContext {
    /// Context with a fresh hub, the stock block catalog and a clock at tick zero.
    pub fn new(world: Arc<dyn WorldStore>, settings: SessionSettings) -> Self {
        let hub = Arc::new(BroadcastHub::new());
        let growth = GrowthScheduler::new(
            Arc::clone(&world),
            Arc::clone(&hub),
            settings.growth_delay_secs.clone(),
        );
        Self {
            world,
            hub,
            catalog: Arc::new(BlockCatalog::beta()),
            clock: Arc::new(WorldClock::default()),
            growth,
            settings,
        }
    }

    /// Replace the block catalog.
    pub fn with_catalog(mut self, catalog: Arc<BlockCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the world clock.
    pub fn with_clock(mut self, clock: Arc<WorldClock>) -> Self {
        self.clock = clock;
        self
    }
}

/// State of one client connection.
pub struct Session {
    id: SessionId,
    phase: ConnectionPhase,
    buffer: Vec<u8>,
    username: Option<String>,
    entity_id: Option<EntityId>,
    player: Option<Player>,
    center: Option<ChunkKey>,
    window: ChunkWindow,
    keepalive: Option<KeepaliveScheduler>,
    next_window_id: u8,
    outbox: Outbox,
    ctx: SessionContext,
}

impl Session {
    /// Create a session that talks to its client through `outbox`.
    pub fn new(ctx: SessionContext, outbox: Outbox) -> Self {
        let id = ctx.hub.allocate_session();
        let window = ChunkWindow::new(
            id,
            Arc::clone(&ctx.world),
            Arc::clone(&ctx.hub),
            outbox.clone(),
            ctx.settings.view_radius,
            ctx.settings.window_capacity,
        );
        Self {
            id,
            phase: ConnectionPhase::Unauthenticated,
            buffer: Vec::new(),
            username: None,
            entity_id: None,
            player: None,
            center: None,
            window,
            keepalive: None,
            next_window_id: 1,
            outbox,
            ctx,
        }
    }

    /// Connection identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// True once the session has closed.
    pub fn is_closed(&self) -> bool {
        self.phase == ConnectionPhase::Closed
    }

    /// The logged-in player, once authenticated.
    pub fn player(&self) -> Option<&Player> {
        self.player.as_ref()
    }

    /// Chunks streamed to this client.
    pub fn window(&self) -> &ChunkWindow {
        &self.window
    }

    /// Whether the keepalive timers are running.
    pub fn has_keepalive(&self) -> bool {
        self.keepalive
            .as_ref()
            .is_some_and(|keepalive| !keepalive.is_finished())
    }

    /// Feed raw bytes from the transport.
    ///
    /// Every complete frame is dispatched in arrival order; a partial frame stays
    /// buffered until more bytes arrive.
    #[instrument(skip_all, fields(session = %self.id, len = bytes.len()))]
    pub async fn data_received(&mut self, bytes: &[u8]) {
        if self.is_closed() {
            return;
        }
        self.buffer.extend_from_slice(bytes);

        while !self.is_closed() {
            match decode_client_frame(&self.buffer) {
                Ok(None) => break,
                Ok(Some((frame, consumed))) => {
                    self.buffer.drain(..consumed);
                    match frame {
                        Frame::Packet(packet) => {
                            if let Err(err) = self.handle_packet(packet).await {
                                self.fail(err).await;
                            }
                        }
                        Frame::Unknown { id } => debug!(id, "skipping unknown packet"),
                    }
                }
                Err(err) => {
                    self.buffer.clear();
                    self.fail(err.into()).await;
                }
            }
        }
    }

    /// Route one decoded packet according to the current phase.
    pub async fn handle_packet(&mut self, packet: ClientPacket) -> Result<(), SessionError> {
        let id = packet.id();
        match (self.phase, packet) {
            (ConnectionPhase::Closed, _) => Ok(()),
            (_, ClientPacket::Ping) => Ok(()),
            (_, ClientPacket::Quit { message }) => {
                info!(session = %self.id, "client is quitting: {}", message);
                self.close("quit").await;
                Ok(())
            }
            (ConnectionPhase::Unauthenticated, ClientPacket::Handshake { username }) => {
                self.handshake(username)
            }
            (
                ConnectionPhase::Challenged,
                ClientPacket::Login {
                    protocol,
                    username,
                    schema_hash,
                },
            ) => self.login(protocol, username, schema_hash).await,
            (ConnectionPhase::Authenticated, packet) => self.dispatch(packet).await,
            (phase, _) => Err(SessionError::OutOfPhase { phase, id }),
        }
    }

    fn handshake(&mut self, username: String) -> Result<(), SessionError> {
        let entity_id = self.ctx.hub.reserve_entity_id();
        debug!(session = %self.id, %username, entity_id, "handshake");
        self.username = Some(username);
        self.entity_id = Some(entity_id);
        self.outbox.send(ServerPacket::HandshakeAck {
            challenge: "-".to_string(),
        })?;
        self.phase = ConnectionPhase::Challenged;
        Ok(())
    }

    async fn login(
        &mut self,
        protocol: u32,
        username: String,
        schema_hash: u64,
    ) -> Result<(), SessionError> {
        if protocol != PROTOCOL_VERSION {
            return Err(SessionError::VersionMismatch {
                client: protocol,
                server: PROTOCOL_VERSION,
            });
        }
        if schema_hash != compute_schema_hash() {
            return Err(SessionError::SchemaMismatch);
        }
        let handshake = self.username.clone().unwrap_or_default();
        if handshake != username {
            return Err(SessionError::NameMismatch {
                handshake,
                login: username,
            });
        }

        let entity_id = self.entity_id.unwrap_or_else(|| self.ctx.hub.reserve_entity_id());
        self.entity_id = Some(entity_id);
        self.phase = ConnectionPhase::Authenticated;
        self.outbox.send(ServerPacket::LoginAccepted { entity_id })?;
        self.authenticated(entity_id, username).await
    }

    /// Entry sequence for a freshly authenticated player.
    async fn authenticated(
        &mut self,
        entity_id: EntityId,
        username: String,
    ) -> Result<(), SessionError> {
        let hub = Arc::clone(&self.ctx.hub);
        hub.register_session(self.id, self.outbox.clone());
        hub.broadcast(ServerPacket::Chat {
            message: format!("{username} is joining the game..."),
        });

        let spawn = self.ctx.world.spawn();
        self.outbox.send(ServerPacket::SpawnPosition {
            x: spawn.x,
            y: spawn.y,
            z: spawn.z,
        })?;

        let stored = self
            .ctx
            .world
            .load_player(&username)
            .await
            .map_err(SessionError::Store)?;
        let returning = stored.as_ref().is_some_and(|data| data.location.is_some());
        let fallback = Location::at(f64::from(spawn.x), f64::from(spawn.y), f64::from(spawn.z));
        let mut player = Player::hydrate(entity_id, username.clone(), stored, fallback);

        for kind in ContainerKind::ALL {
            self.outbox.send(ServerPacket::InventorySnapshot {
                container: kind.wire_id(),
                slots: player.inventory.container(kind).slots().to_vec(),
            })?;
        }

        let key = ChunkKey::containing(player.location.x, player.location.z);
        let chunk = self.window.enable(key).await?;
        if !returning {
            let column_x = (player.location.x.floor() as i32).rem_euclid(CHUNK_SIZE) as usize;
            let column_z = (player.location.z.floor() as i32).rem_euclid(CHUNK_SIZE) as usize;
            let height = chunk.read().height_at(column_x, column_z);
            player.location.y = f64::from(height + 2);
            player.location.stance = player.location.y + 1.62;
        }
        self.outbox.send(position_look(&player.location))?;

        let (x, y, z) = player.location.fixed();
        hub.insert_entity(Entity {
            id: entity_id,
            x,
            y,
            z,
            kind: EntityKind::Player { username },
        });
        info!(session = %self.id, username = %player.username, entity_id, "player joined");
        self.player = Some(player);

        self.keepalive = Some(KeepaliveScheduler::start(
            self.outbox.clone(),
            Arc::clone(&self.ctx.clock),
            self.ctx.settings.ping_interval,
            self.ctx.settings.time_interval,
        ));
        self.center = Some(key);
        self.window.refresh_window(key);
        Ok(())
    }

    async fn dispatch(&mut self, packet: ClientPacket) -> Result<(), SessionError> {
        match packet {
            ClientPacket::Chat { message } => {
                info!(session = %self.id, "chat: {}", message);
                self.ctx.hub.broadcast(ServerPacket::Chat { message });
            }
            ClientPacket::Inventory { container, slots } => {
                let Some(player) = self.player.as_mut() else {
                    return Ok(());
                };
                match ContainerKind::from_wire(container) {
                    Some(kind) => player.inventory.container_mut(kind).replace(&slots),
                    None => debug!(session = %self.id, container, "ignoring unknown container"),
                }
            }
            ClientPacket::Flying { on_ground } => {
                if let Some(player) = self.player.as_mut() {
                    player.location.on_ground = on_ground;
                }
            }
            ClientPacket::Position {
                x,
                y,
                stance,
                z,
                on_ground,
            } => {
                if let Some(player) = self.player.as_mut() {
                    let location = &mut player.location;
                    location.x = x;
                    location.y = y;
                    location.stance = stance;
                    location.z = z;
                    location.on_ground = on_ground;
                }
                self.moved()?;
            }
            ClientPacket::Look {
                yaw,
                pitch,
                on_ground,
            } => {
                if let Some(player) = self.player.as_mut() {
                    player.location.yaw = yaw;
                    player.location.pitch = pitch;
                    player.location.on_ground = on_ground;
                }
                self.moved()?;
            }
            ClientPacket::PositionLook {
                x,
                y,
                stance,
                z,
                yaw,
                pitch,
                on_ground,
            } => {
                if let Some(player) = self.player.as_mut() {
                    player.location = Location {
                        x,
                        y,
                        z,
                        stance,
                        yaw,
                        pitch,
                        on_ground,
                    };
                }
                self.moved()?;
            }
            ClientPacket::Digging {
                state, x, y, z, ..
            } => {
                if state == DigState::Broken {
                    self.dig(BlockPos::new(x, y, z))?;
                }
            }
            ClientPacket::Build {
                x,
                y,
                z,
                face,
                item,
            } => match item {
                None => self.use_block(BlockPos::new(x, y, z))?,
                Some(item) => match BlockId::try_from(item) {
                    Ok(block) => self.build(BlockPos::new(x, y, z), face, block)?,
                    Err(_) => debug!(session = %self.id, item, "ignoring item use"),
                },
            },
            ClientPacket::Equip { slot } => {
                if let Some(player) = self.player.as_mut() {
                    player.equipped = slot;
                }
            }
            other => {
                debug!(session = %self.id, id = other.id(), "unhandled packet: {:?}", other);
            }
        }
        Ok(())
    }

    /// Bookkeeping after any movement frame: entity position, window center, pickups.
    fn moved(&mut self) -> Result<(), SessionError> {
        let Some(player) = self.player.as_mut() else {
            return Ok(());
        };
        let hub = &self.ctx.hub;
        let (x, y, z) = player.location.fixed();
        hub.move_entity(player.entity_id, x, y, z);

        let key = ChunkKey::containing(player.location.x, player.location.z);
        if self.center != Some(key) {
            self.center = Some(key);
            self.window.refresh_window(key);
        }

        let nearby = hub.entities_near(x, y, z, self.ctx.settings.pickup_radius);
        for entity in nearby.into_iter().filter(Entity::is_pickup) {
            let Some(collected) = hub.destroy_entity(entity.id) else {
                continue;
            };
            let EntityKind::Pickup { item } = collected.kind else {
                continue;
            };
            self.outbox.send(ServerPacket::AddToInventory { item })?;
            let overflow = player.inventory.holdables.add(item);
            if overflow > 0 {
                debug!(session = %self.id, overflow, "inventory full, dropping overflow");
            }
            hub.broadcast(ServerPacket::CollectItem {
                collected: collected.id,
                collector: player.entity_id,
            });
            hub.broadcast(collected.destroy_packet());
            trace!(session = %self.id, entity = collected.id, "collected pickup");
        }
        Ok(())
    }

    /// Break the block at `pos`.
    pub fn dig(&mut self, pos: BlockPos) -> Result<(), SessionError> {
        let Some((key, local)) = pos.split() else {
            return Err(SessionError::OutsideWorld(pos));
        };
        let chunk = self
            .window
            .chunk(key)
            .cloned()
            .ok_or(SessionError::ChunkNotInWindow { action: "dig", key })?;

        let catalog = &self.ctx.catalog;
        let (old, new) = {
            let mut chunk = chunk.write();
            let old = chunk.block(local);
            let new = catalog.replace_of(old);
            chunk.set_block(local, new);
            (old, new)
        };
        self.ctx.growth.cancel(pos);

        let hub = &self.ctx.hub;
        hub.broadcast_scoped_to_chunk(block_change(pos, new, 0), key);
        debug!(session = %self.id, %pos, old, new, "dug block");

        if let Some(item) = catalog.drop_of(old) {
            let Some((x, y, z)) = pos.centroid_fixed() else {
                debug!(session = %self.id, %pos, "no pickup this far out");
                return Ok(());
            };
            let entity = hub.create_entity(
                x,
                y,
                z,
                EntityKind::Pickup {
                    item: ItemStack::new(item, 1),
                },
            );
            for packet in entity.spawn_packets() {
                self.outbox.send(packet)?;
            }
        }
        Ok(())
    }

    /// Place `block` against the `face` of the block at `pos`.
    ///
    /// Faces outside 0..6 place at `pos` itself.
    pub fn build(&mut self, pos: BlockPos, face: u8, block: BlockId) -> Result<(), SessionError> {
        let target = match Face::try_from(face) {
            Ok(face) => pos.offset(face).ok_or(SessionError::OutsideWorld(pos))?,
            Err(_) => pos,
        };
        let Some((key, local)) = target.split() else {
            return Err(SessionError::OutsideWorld(target));
        };
        let chunk = self
            .window
            .chunk(key)
            .ok_or(SessionError::ChunkNotInWindow {
                action: "build",
                key,
            })?;

        chunk.write().set_block(local, block);
        self.ctx
            .hub
            .broadcast_scoped_to_chunk(block_change(target, block, 0), key);
        debug!(session = %self.id, pos = %target, block, "built block");

        if block == BLOCK_SAPLING {
            self.ctx.growth.schedule(target);
        }
        Ok(())
    }

    /// Empty-handed use of the block at `pos`.
    fn use_block(&mut self, pos: BlockPos) -> Result<(), SessionError> {
        let Some((key, local)) = pos.split() else {
            return Ok(());
        };
        let Some(chunk) = self.window.chunk(key) else {
            return Ok(());
        };
        let block = chunk.read().block(local);
        if block != BLOCK_WORKBENCH {
            return Ok(());
        }

        let window_id = self.next_window_id;
        self.next_window_id = self.next_window_id.checked_add(1).unwrap_or(1);
        debug!(session = %self.id, window_id, "opening workbench");
        self.outbox.send(ServerPacket::OpenWindow {
            window_id,
            kind: WORKBENCH_WINDOW_KIND,
            title: "Crafting".to_string(),
            slots: 9,
        })
    }

    /// True while the chunk window still has refresh work queued.
    pub fn is_refreshing(&self) -> bool {
        !self.is_closed() && self.window.is_refreshing()
    }

    /// Advance the chunk window refresh by one key.
    ///
    /// Safe to drop part way; the next call resumes the interrupted fetch.
    pub async fn refresh_step(&mut self) {
        match self.window.refresh_step().await {
            Ok(RefreshProgress::Finished { evicted }) if !evicted.is_empty() => {
                debug!(session = %self.id, evicted = evicted.len(), "window refresh finished");
            }
            Ok(_) => {}
            Err(err) => self.fail(err).await,
        }
    }

    /// Run the pending window refresh to completion.
    pub async fn finish_refresh(&mut self) -> Result<Vec<ChunkKey>, SessionError> {
        self.window.finish_refresh().await
    }

    /// React to an error according to its disposition.
    pub async fn fail(&mut self, err: SessionError) {
        match err.disposition() {
            Disposition::Ignore => {
                warn!(session = %self.id, "ignoring: {}", err);
            }
            Disposition::NotifyAndClose => {
                warn!(session = %self.id, "closing: {}", err);
                let message = truncate_reason(err.to_string());
                if self.outbox.send(ServerPacket::Error { message }).is_err() {
                    trace!(session = %self.id, "error notice not delivered");
                }
                self.close("error").await;
            }
            Disposition::Close => {
                debug!(session = %self.id, "transport lost: {}", err);
                self.close("transport").await;
            }
        }
    }

    /// Enter `Closed`: stop timers and pending window work, leave the hub and
    /// persist the player. Closing twice is a no-op.
    pub async fn close(&mut self, reason: &str) {
        if self.is_closed() {
            return;
        }
        self.phase = ConnectionPhase::Closed;
        self.keepalive = None;
        self.buffer.clear();
        self.window.release_all();
        self.ctx.hub.unregister_session(self.id);

        if let Some(player) = &self.player {
            if let Some(entity) = self.ctx.hub.destroy_entity(player.entity_id) {
                self.ctx.hub.broadcast(entity.destroy_packet());
            }
            if let Err(err) = self
                .ctx
                .world
                .save_player(&player.username, &player.to_data())
                .await
            {
                warn!(session = %self.id, "failed to save {}: {:#}", player.username, err);
            }
        }
        info!(session = %self.id, reason, "session closed");
    }
}

fn position_look(location: &Location) -> ServerPacket {
    ServerPacket::PositionLook {
        x: location.x,
        y: location.y,
        stance: location.stance,
        z: location.z,
        yaw: location.yaw,
        pitch: location.pitch,
        on_ground: location.on_ground,
    }
}

fn block_change(pos: BlockPos, block: BlockId, metadata: u8) -> ServerPacket {
    ServerPacket::BlockChange {
        x: pos.x,
        y: pos.y,
        z: pos.z,
        block,
        metadata,
    }
}

fn truncate_reason(mut message: String) -> String {
    if message.len() > MAX_REASON_LEN {
        let mut end = MAX_REASON_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}
