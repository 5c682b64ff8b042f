//! Asynchronous adapter for line-oriented UCI engines.
//!
//! An [`EngineAdapter`] owns one [`EngineChannel`] (a real engine process or
//! the built-in simulator), performs the `uci`/`isready` handshake, and pushes
//! every parsed [`EngineEvent`] to registered observers.

pub mod adapter;
pub mod channel;
pub mod config;
pub mod readiness;
pub mod request;
pub mod uci;

pub use adapter::{EngineAdapter, ObserverId};
pub use channel::{ChannelError, EngineChannel, Inbound, ProcessChannel, SimulatedChannel, SimulatorConfig};
pub use config::{ChannelKind, ConfigError, EngineConfig};
pub use readiness::{Readiness, ReadinessState};
pub use request::AnalysisRequest;
pub use uci::{parse_line, EngineEvent, EngineId, EventKind, UciCommand, UciError};

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Search depth must be at least 1, got {0}")]
    InvalidDepth(u32),
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] UciError),
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
