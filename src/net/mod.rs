//! Replication layer
//!
//! Host-authoritative, line-delimited JSON over TCP:
//! - `protocol`: wire records and the line codec
//! - `peers`: the coordinator's peer table and host migration
//! - `server`: the coordinating process
//! - `client`: a participant's non-blocking link
//! - `replication`: mapping between simulation actions and wire events

pub mod client;
pub mod peers;
pub mod protocol;
pub mod replication;
pub mod server;

pub use client::{Inbox, NetClient};
pub use peers::PeerTable;
pub use protocol::{
    ClientMessage, EventEnvelope, NetEvent, PeerId, PeerState, ProtocolError, ServerMessage,
};
pub use server::Server;

use thiserror::Error;

/// Errors at the edge of the replication layer
#[derive(Debug, Error)]
pub enum NetError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handshake failed: {0}")]
    Handshake(String),
}
