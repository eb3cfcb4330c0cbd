//! Session harnesses: an in-process session fed encoded frames, and a TCP client.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use mdbeta_core::{BlockId, BlockPos, ChunkKey};
use mdbeta_net::{
    compute_schema_hash, decode_server_frame, encode_client_packet, ClientPacket, DigState, Frame,
    ServerPacket, PROTOCOL_VERSION,
};
use mdbeta_server::{Outbox, Session, SessionContext};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

/// Handshake and login frames for `username`.
pub fn login_packets(username: &str) -> [ClientPacket; 2] {
    [
        ClientPacket::Handshake {
            username: username.to_string(),
        },
        ClientPacket::Login {
            protocol: PROTOCOL_VERSION,
            username: username.to_string(),
            schema_hash: compute_schema_hash(),
        },
    ]
}

/// A finished dig at `pos`.
pub fn dig_packet(pos: BlockPos) -> ClientPacket {
    ClientPacket::Digging {
        state: DigState::Broken,
        x: pos.x,
        y: pos.y,
        z: pos.z,
        face: 1,
    }
}

/// A session driven in-process, with its outbound packets captured.
pub struct TestSession {
    /// The session under test.
    pub session: Session,
    rx: UnboundedReceiver<ServerPacket>,
}

impl TestSession {
    /// Open a session on `ctx`.
    pub fn connect(ctx: &SessionContext) -> Self {
        let (outbox, rx) = Outbox::channel();
        Self {
            session: Session::new(ctx.clone(), outbox),
            rx,
        }
    }

    /// Encode `packet` and feed it through the session's byte path.
    pub async fn send(&mut self, packet: ClientPacket) -> Result<()> {
        let bytes = encode_client_packet(&packet).context("Failed to encode client packet")?;
        self.session.data_received(&bytes).await;
        Ok(())
    }

    /// Feed raw bytes.
    pub async fn send_bytes(&mut self, bytes: &[u8]) {
        self.session.data_received(bytes).await;
    }

    /// Handshake and log in as `username`.
    pub async fn login(&mut self, username: &str) -> Result<()> {
        for packet in login_packets(username) {
            self.send(packet).await?;
        }
        if self.session.player().is_none() {
            bail!("login as {username} did not authenticate");
        }
        Ok(())
    }

    /// Log in and stream the whole initial window.
    pub async fn join(&mut self, username: &str) -> Result<()> {
        self.login(username).await?;
        self.finish_refresh().await?;
        Ok(())
    }

    /// Run the pending window refresh to completion, returning evicted keys.
    pub async fn finish_refresh(&mut self) -> Result<Vec<ChunkKey>> {
        Ok(self.session.finish_refresh().await?)
    }

    /// Every packet queued for the client so far.
    pub fn drain(&mut self) -> Vec<ServerPacket> {
        let mut packets = Vec::new();
        while let Ok(packet) = self.rx.try_recv() {
            packets.push(packet);
        }
        packets
    }
}

/// Keys of every chunk-enable packet, in order.
pub fn chunk_enables(packets: &[ServerPacket]) -> Vec<ChunkKey> {
    packets
        .iter()
        .filter_map(|packet| match packet {
            ServerPacket::ChunkEnable { x, z } => Some(ChunkKey::new(*x, *z)),
            _ => None,
        })
        .collect()
}

/// Keys of every chunk payload, in order.
pub fn chunk_payloads(packets: &[ServerPacket]) -> Vec<ChunkKey> {
    packets
        .iter()
        .filter_map(|packet| match packet {
            ServerPacket::ChunkData(payload) => Some(payload.key()),
            _ => None,
        })
        .collect()
}

/// Every block change as (position, block, metadata).
pub fn block_changes(packets: &[ServerPacket]) -> Vec<(BlockPos, BlockId, u8)> {
    packets
        .iter()
        .filter_map(|packet| match packet {
            ServerPacket::BlockChange {
                x,
                y,
                z,
                block,
                metadata,
            } => Some((BlockPos::new(*x, *y, *z), *block, *metadata)),
            _ => None,
        })
        .collect()
}

/// Number of pickup spawns.
pub fn pickup_spawns(packets: &[ServerPacket]) -> usize {
    packets
        .iter()
        .filter(|packet| matches!(packet, ServerPacket::SpawnPickup { .. }))
        .count()
}

/// Message of the first error notification, if any.
pub fn error_message(packets: &[ServerPacket]) -> Option<&str> {
    packets.iter().find_map(|packet| match packet {
        ServerPacket::Error { message } => Some(message.as_str()),
        _ => None,
    })
}

/// Minimal protocol client over a real socket.
pub struct TcpTestClient {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TcpTestClient {
    /// Connect to a listening server.
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {addr}"))?;
        Ok(Self {
            stream,
            buffer: Vec::new(),
        })
    }

    /// Send one packet.
    pub async fn send(&mut self, packet: &ClientPacket) -> Result<()> {
        let bytes = encode_client_packet(packet).context("Failed to encode client packet")?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    /// Next packet from the server, or `None` once the server closed the stream.
    pub async fn recv(&mut self) -> Result<Option<ServerPacket>> {
        loop {
            if let Some((frame, consumed)) = decode_server_frame(&self.buffer)? {
                self.buffer.drain(..consumed);
                match frame {
                    Frame::Packet(packet) => return Ok(Some(packet)),
                    Frame::Unknown { .. } => continue,
                }
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read packets until one matches `predicate`, failing after `timeout`.
    pub async fn recv_until<F>(&mut self, timeout: Duration, predicate: F) -> Result<ServerPacket>
    where
        F: FnMut(&ServerPacket) -> bool,
    {
        tokio::time::timeout(timeout, self.recv_matching(predicate))
            .await
            .context("Timed out waiting for packet")?
    }

    async fn recv_matching<F>(&mut self, mut predicate: F) -> Result<ServerPacket>
    where
        F: FnMut(&ServerPacket) -> bool,
    {
        loop {
            match self.recv().await? {
                Some(packet) if predicate(&packet) => return Ok(packet),
                Some(_) => continue,
                None => bail!("server closed the connection"),
            }
        }
    }
}
