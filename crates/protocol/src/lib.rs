pub mod clock;
pub mod constants;
pub mod envelope;

// Re-export primary types for convenience.
pub use clock::{Clock, FixedClock, SystemClock};
pub use constants::MessageKind;
pub use envelope::{ClientMessage, Message};
