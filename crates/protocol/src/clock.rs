//! Server clock labels for message timestamps.

use crate::constants::TIME_FORMAT;

/// Source of the `HH:MM` labels stamped on broadcast messages.
pub trait Clock: Send + Sync + 'static {
    /// Returns the label for "now".
    fn now_label(&self) -> String;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_label(&self) -> String {
        chrono::Local::now().format(TIME_FORMAT).to_string()
    }
}

/// Clock that always reports the same label. Handy in tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl FixedClock {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl Clock for FixedClock {
    fn now_label(&self) -> String {
        self.0.clone()
    }
}
