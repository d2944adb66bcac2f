fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use quiver_protocol::{ClientMessage, Message, MessageKind};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON
    /// values (order-independent comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  Rust:    {reserialized}"
        );
        parsed
    }

    #[test]
    fn fixture_chat_message() {
        let msg = roundtrip_test::<Message>("chat_message.json");
        assert_eq!(msg.kind(), MessageKind::Chat);
        assert_eq!(msg.sender(), "Alice");
        assert_eq!(msg.body(), "hi");
        assert_eq!(msg.timestamp(), "14:05");
    }

    #[test]
    fn fixture_system_join() {
        let msg = roundtrip_test::<Message>("system_join.json");
        assert_eq!(msg, Message::joined("Alice").stamped("14:04"));
    }

    #[test]
    fn fixture_system_leave() {
        let msg = roundtrip_test::<Message>("system_leave.json");
        assert_eq!(msg, Message::left("Alice").stamped("14:09"));
    }

    #[test]
    fn built_messages_match_fixtures() {
        let chat = serde_json::to_value(Message::chat("Alice", "hi").stamped("14:05")).unwrap();
        assert_eq!(chat, load_fixture("chat_message.json"));

        let join = serde_json::to_value(Message::joined("Alice").stamped("14:04")).unwrap();
        assert_eq!(join, load_fixture("system_join.json"));
    }

    #[test]
    fn fixture_browser_outgoing() {
        // The browser client sends `type: "message"` plus its own id and
        // clock. Only the content survives into the relayed message.
        let raw = serde_json::to_vec(&load_fixture("browser_outgoing.json")).unwrap();
        let relayed = ClientMessage::decode(&raw).unwrap().into_chat("Alice");
        assert_eq!(relayed.kind(), MessageKind::Chat);
        assert_eq!(relayed.body(), "hello from the browser");
        assert!(relayed.timestamp().is_empty(), "client clock must not leak");

        // Not a valid relayed message: `message` is not a relay kind.
        let as_message: Result<Message, _> =
            serde_json::from_value(load_fixture("browser_outgoing.json"));
        assert!(as_message.is_err());
    }

    #[test]
    fn field_names_match_wire_schema() {
        let value = serde_json::to_value(Message::system("x").stamped("00:00")).unwrap();
        let mut keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, ["content", "time", "type", "username"]);
    }
}
