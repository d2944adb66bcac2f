use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capacity of each endpoint's outbound queue.
///
/// A broadcast that finds the queue full evicts the endpoint instead of
/// waiting for it, so this bounds how far a client may lag behind the room.
pub const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Capacity of the Hub's broadcast inbox.
pub const BROADCAST_QUEUE_SIZE: usize = 256;

/// Display name used when a client connects without a `username`.
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// Sender name stamped on join/leave notices.
pub const SYSTEM_USERNAME: &str = "System";

/// Longest display name accepted at connect time, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Default upgrade path.
pub const WS_PATH: &str = "/ws";

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// How often the outbound loop pings an otherwise quiet client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(30);

/// Read deadline: if nothing (not even a pong) arrives within this window
/// the client is considered gone.
pub const WS_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum size of a single inbound frame (64 KiB).
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Clock label format for [`Message::timestamp`](crate::Message): 24-hour `HH:MM`.
pub const TIME_FORMAT: &str = "%H:%M";

/// Kind of a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// A message typed by a client.
    #[serde(rename = "chat")]
    Chat,
    /// A notice synthesized by the relay (joins, leaves).
    #[serde(rename = "system")]
    System,
}

impl MessageKind {
    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::System => "system",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
