//! Bidirectional line channel to an engine.
//!
//! The adapter only ever talks to a `dyn EngineChannel`. Which implementation
//! backs it is decided by the caller:
//!
//! - [`ProcessChannel`]: a real engine executable over stdin/stdout
//! - [`SimulatedChannel`]: an in-process stand-in speaking the same protocol
//! - `MockChannel` (feature `mock`): scripted, for tests

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod process;
pub mod simulated;
mod subscribers;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockChannel;
pub use process::ProcessChannel;
pub use simulated::{SimulatedChannel, SimulatorConfig};

pub(crate) use subscribers::Subscribers;

use std::sync::Arc;

/// Something the transport surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One line of engine output, without the line terminator.
    Line(String),
    /// The transport went away without `close()` being called.
    Disconnected(String),
}

/// Receives inbound items. Runs on the transport's task and must not call
/// back into the channel it is registered on.
pub type InboundCallback = Arc<dyn Fn(Inbound) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Engine not found")]
    EngineNotFound,
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Channel is closed")]
    Closed,
}

pub trait EngineChannel: Send + Sync {
    /// Queue a command. Fire-and-forget: there is no acknowledgment.
    fn send(&self, command: &str) -> Result<(), ChannelError>;

    /// Register a callback that gets every subsequent inbound item exactly
    /// once, in transport order.
    fn on_receive(&self, callback: InboundCallback);

    /// Release the underlying engine. Once this returns no callback runs again.
    fn close(&self);

    fn is_closed(&self) -> bool;
}
