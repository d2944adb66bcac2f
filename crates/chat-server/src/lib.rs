//! Single-room WebSocket chat relay.
//!
//! Clients connect to `/ws?username=<name>`, send `{"content": "..."}`
//! records, and receive every message broadcast to the room plus
//! join/leave notices. The [`Hub`] task owns the membership set; each
//! connection runs an inbound and an outbound pump (see [`endpoint`]).

pub mod endpoint;
pub mod handshake;
pub mod hub;
mod server;

pub use endpoint::{Endpoint, EndpointHandle, KeepAlive, spawn_endpoint};
pub use handshake::{OriginPolicy, Rejection};
pub use hub::{EndpointId, Hub, Registration};
pub use server::{ChatServer, ServerConfig};

/// Errors produced by the chat server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("server already running")]
    AlreadyRunning,

    #[error("connection rejected")]
    ConnectionRejected,
}
