pub mod cli;
pub mod error;
pub mod events;
pub mod flows;
pub mod messages;
pub mod network;

// Re-export key types for easy testing
pub use error::{ChatError, Result};
pub use events::EventSink;
pub use flows::{ListenFlow, SendFlow};
pub use network::{Connector, LineStream, ResilientSession, RetryPolicy};
