#![warn(missing_docs)]
//! Session engine: connection phases, packet dispatch, chunk windows and the TCP listener.

pub mod chunk_window;
pub mod error;
pub mod growth;
pub mod hub;
pub mod keepalive;
pub mod outbox;
pub mod server;
pub mod session;

pub use chunk_window::{is_visible, visible_keys, ChunkWindow, RefreshProgress};
pub use error::{Disposition, SessionError};
pub use growth::{GrowthScheduler, GrowthStep};
pub use hub::{BroadcastHub, SessionId};
pub use keepalive::KeepaliveScheduler;
pub use outbox::Outbox;
pub use server::{serve_connection, Server};
pub use session::{ConnectionPhase, Session, SessionContext, SessionSettings};
