use serde::{Deserialize, Serialize};

use crate::constants::{MessageKind, SYSTEM_USERNAME};

/// A message as relayed to clients.
///
/// Wire form: `{"type": "chat", "username": "...", "content": "...", "time": "HH:MM"}`.
/// Values are immutable; [`Message::stamped`] returns a new value carrying
/// the server time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(rename = "username", default)]
    sender: String,
    #[serde(rename = "content", default)]
    body: String,
    #[serde(rename = "time", default)]
    timestamp: String,
}

impl Message {
    /// Creates an unstamped chat message.
    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Chat,
            sender: sender.into(),
            body: body.into(),
            timestamp: String::new(),
        }
    }

    /// Creates an unstamped system notice.
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: SYSTEM_USERNAME.into(),
            body: body.into(),
            timestamp: String::new(),
        }
    }

    /// Notice announcing that `name` entered the room.
    pub fn joined(name: &str) -> Self {
        Self::system(format!("{name} joined the chat"))
    }

    /// Notice announcing that `name` left the room.
    pub fn left(name: &str) -> Self {
        Self::system(format!("{name} left the chat"))
    }

    /// Returns a copy carrying the given clock label, replacing any previous one.
    pub fn stamped(self, label: impl Into<String>) -> Self {
        Self {
            timestamp: label.into(),
            ..self
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Server clock label; empty until the Hub stamps the message.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Serializes to the JSON text sent in one WebSocket frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A record received from a client.
///
/// Only `content` is honoured. Whatever the client puts in `type`,
/// `username` or `time` is ignored: the relay assigns those itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub content: String,
}

impl ClientMessage {
    /// Decodes one frame payload.
    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Turns the client record into an unstamped chat message from `sender`.
    pub fn into_chat(self, sender: &str) -> Message {
        Message::chat(sender, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_wire_shape() {
        let msg = Message::chat("Alice", "hi").stamped("12:34");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "chat",
                "username": "Alice",
                "content": "hi",
                "time": "12:34",
            })
        );
    }

    #[test]
    fn join_and_leave_notices() {
        let join = Message::joined("Alice");
        assert_eq!(join.kind(), MessageKind::System);
        assert_eq!(join.sender(), "System");
        assert_eq!(join.body(), "Alice joined the chat");

        let leave = Message::left("Alice");
        assert_eq!(leave.body(), "Alice left the chat");
    }

    #[test]
    fn stamping_replaces_timestamp() {
        let msg = Message::chat("Bob", "yo").stamped("01:00").stamped("02:00");
        assert_eq!(msg.timestamp(), "02:00");
        assert_eq!(msg.body(), "yo");
    }

    #[test]
    fn unstamped_message_has_empty_timestamp() {
        assert!(Message::chat("a", "b").timestamp().is_empty());
    }

    #[test]
    fn decode_preserves_sender_and_body_for_each_kind() {
        for msg in [
            Message::chat("Carol", "hello there").stamped("10:00"),
            Message::system("Carol joined the chat").stamped("10:00"),
        ] {
            let json = msg.to_json().unwrap();
            let parsed: Message = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.kind(), msg.kind());
            assert_eq!(parsed.sender(), msg.sender());
            assert_eq!(parsed.body(), msg.body());
        }
    }

    #[test]
    fn client_message_ignores_spoofed_fields() {
        let raw = br#"{"type":"system","username":"System","content":"hi","time":"00:00"}"#;
        let msg = ClientMessage::decode(raw).unwrap().into_chat("Mallory");
        assert_eq!(msg.kind(), MessageKind::Chat);
        assert_eq!(msg.sender(), "Mallory");
        assert_eq!(msg.body(), "hi");
        assert!(msg.timestamp().is_empty());
    }

    #[test]
    fn client_message_accepts_browser_shape() {
        let raw = br#"{"id":"1700000000","type":"message","username":"Dave","content":"sup","time":"11:11"}"#;
        let msg = ClientMessage::decode(raw).unwrap();
        assert_eq!(msg.content, "sup");
    }

    #[test]
    fn client_message_missing_content_is_empty() {
        let msg = ClientMessage::decode(b"{}").unwrap();
        assert!(msg.content.is_empty());
    }

    #[test]
    fn client_message_rejects_malformed_json() {
        assert!(ClientMessage::decode(b"not json {{{").is_err());
        assert!(ClientMessage::decode(b"[1,2,3]").is_err());
    }
}
