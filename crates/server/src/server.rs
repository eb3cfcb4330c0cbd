//! TCP listener and per-connection driver.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mdbeta_net::{encode_server_packet, ServerPacket};
use mdbeta_world::WorldClock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::outbox::Outbox;
use crate::session::{Session, SessionContext};

const READ_BUFFER_SIZE: usize = 4096;

/// Accepts connections and runs one [`Session`] per client.
pub struct Server {
    ctx: SessionContext,
    ticks_per_second: u32,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a server that advances the world clock by `ticks_per_second` every second.
    pub fn new(ctx: SessionContext, ticks_per_second: u32) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            ctx,
            ticks_per_second,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Collaborators shared by every session.
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Bind to `addr` and run the accept loop until shutdown.
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        info!("Server listening on {}", addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop on a pre-bound listener.
    ///
    /// Returns once [`Server::shutdown`] was called and every session has closed.
    pub async fn run_with_listener(&self, listener: TcpListener) -> Result<()> {
        let clock = spawn_clock(Arc::clone(&self.ctx.clock), self.ticks_per_second);
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = match result {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("Failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {}: {}", peer, err);
                    }
                    info!("Accepted connection from {}", peer);
                    connections.spawn(serve_connection(
                        stream,
                        self.ctx.clone(),
                        self.shutdown_rx.clone(),
                    ));
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Server shutting down");
                        break;
                    }
                }
            }
        }

        while connections.join_next().await.is_some() {}
        clock.abort();
        Ok(())
    }

    /// Ask the accept loop and every session to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn spawn_clock(clock: Arc<WorldClock>, ticks_per_second: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            clock.advance(u64::from(ticks_per_second));
        }
    })
}

/// Drive one connection until its session closes.
///
/// Socket reads, window refresh steps, writer loss and shutdown are multiplexed
/// on this task, so frames and refresh work for one session never run at once.
pub async fn serve_connection(
    stream: TcpStream,
    ctx: SessionContext,
    mut shutdown: watch::Receiver<bool>,
) {
    let peer = stream.peer_addr().ok();
    let (mut reader, writer) = stream.into_split();
    let (outbox, rx) = Outbox::channel();
    let writer_task = tokio::spawn(write_packets(writer, rx));

    let mut session = Session::new(ctx, outbox.clone());
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    while !session.is_closed() {
        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => session.close("disconnected").await,
                Ok(n) => session.data_received(&buf[..n]).await,
                Err(err) => {
                    debug!(session = %session.id(), "read failed: {}", err);
                    session.fail(SessionError::Transport).await;
                }
            },
            _ = session.refresh_step(), if session.is_refreshing() => {}
            _ = outbox.closed() => session.fail(SessionError::Transport).await,
            _ = shutdown.changed() => session.fail(SessionError::Shutdown).await,
        }
    }

    let id = session.id();
    drop(session);
    drop(outbox);
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(session = %id, "writer stopped: {:#}", err),
        Err(err) => warn!(session = %id, "writer task failed: {}", err),
    }
    info!(session = %id, ?peer, "connection closed");
}

async fn write_packets(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<ServerPacket>,
) -> Result<()> {
    while let Some(packet) = rx.recv().await {
        let frame = encode_server_packet(&packet)
            .with_context(|| format!("Failed to encode packet {}", packet.id()))?;
        writer
            .write_all(&frame)
            .await
            .context("Failed to write frame")?;
        if matches!(packet, ServerPacket::Error { .. }) {
            break;
        }
    }
    writer.shutdown().await.context("Failed to shut down stream")?;
    Ok(())
}
