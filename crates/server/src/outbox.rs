use mdbeta_net::ServerPacket;
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Sending half of a session's outbound packet queue.
///
/// The receiving half belongs to the connection's writer task; once it is
/// dropped every send fails with [`SessionError::Transport`].
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ServerPacket>,
}

impl Outbox {
    /// Create a queue, returning the sender and the writer's receiver.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerPacket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a packet for the peer.
    pub fn send(&self, packet: ServerPacket) -> Result<(), SessionError> {
        self.tx.send(packet).map_err(|_| SessionError::Transport)
    }

    /// Resolves once the writer has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// True once the writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
