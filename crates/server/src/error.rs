//! Session error taxonomy.

use mdbeta_core::{BlockPos, ChunkKey};
use mdbeta_net::CodecError;
use thiserror::Error;

use crate::session::ConnectionPhase;

/// What the session does with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log and keep going.
    Ignore,
    /// Send an error notification to the peer, then close.
    NotifyAndClose,
    /// Close without notifying; the peer is unreachable.
    Close,
}

/// Errors raised while a session processes input.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Packet is valid but means nothing in the current phase.
    #[error("packet {id} is not accepted while {phase:?}")]
    OutOfPhase {
        /// Phase at arrival.
        phase: ConnectionPhase,
        /// Packet id.
        id: u8,
    },
    /// Frame bytes could not be decoded.
    #[error("Malformed packet: {0}")]
    Codec(#[from] CodecError),
    /// A handler referenced a chunk this client is not streaming.
    #[error("Couldn't {action} in chunk {key}!")]
    ChunkNotInWindow {
        /// Handler name ("dig", "build").
        action: &'static str,
        /// Missing chunk.
        key: ChunkKey,
    },
    /// Block coordinate above or below the world.
    #[error("block {0} is outside the world")]
    OutsideWorld(BlockPos),
    /// The world store failed.
    #[error("World store failure: {0:#}")]
    Store(#[source] anyhow::Error),
    /// The outbound transport is gone.
    #[error("transport closed")]
    Transport,
    /// Client speaks another protocol version.
    #[error("Outdated protocol: client {client}, server {server}")]
    VersionMismatch {
        /// Client version.
        client: u32,
        /// Server version.
        server: u32,
    },
    /// Client was built from different packet definitions.
    #[error("Incompatible client build")]
    SchemaMismatch,
    /// Login name differs from the handshake name.
    #[error("Login name {login} does not match handshake name {handshake}")]
    NameMismatch {
        /// Name from the handshake.
        handshake: String,
        /// Name from the login.
        login: String,
    },
    /// The server is stopping.
    #[error("Server shutting down")]
    Shutdown,
}

impl SessionError {
    /// How the session reacts to this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            SessionError::OutOfPhase { .. } | SessionError::OutsideWorld(_) => {
                Disposition::Ignore
            }
            SessionError::Transport => Disposition::Close,
            SessionError::Codec(_)
            | SessionError::ChunkNotInWindow { .. }
            | SessionError::Store(_)
            | SessionError::VersionMismatch { .. }
            | SessionError::SchemaMismatch
            | SessionError::NameMismatch { .. }
            | SessionError::Shutdown => Disposition::NotifyAndClose,
        }
    }
}
