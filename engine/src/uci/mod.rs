pub mod parser;

pub use parser::{parse_line, EngineEvent, EngineId, EventKind};

use std::fmt;

/// Shallowest search the engine is ever asked for.
pub const MIN_DEPTH: u32 = 1;

/// Deepest search the engine is ever asked for. Larger requests are capped.
pub const MAX_DEPTH: u32 = 24;

#[derive(Debug, thiserror::Error)]
pub enum UciError {
    #[error("Invalid search depth: {0}")]
    InvalidDepth(u32),
    #[error("Missing position")]
    MissingPosition,
    #[error("Invalid request body: {0}")]
    InvalidRequest(#[from] serde_json::Error),
}

/// Outgoing command to a UCI engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    SetOption { name: String, value: Option<String> },
    Position { fen: String },
    Go { depth: u32 },
    Stop,
    Quit,
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UciCommand::Uci => f.write_str("uci"),
            UciCommand::IsReady => f.write_str("isready"),
            UciCommand::SetOption { name, value } => match value {
                Some(value) => write!(f, "setoption name {} value {}", name, value),
                None => write!(f, "setoption name {}", name),
            },
            UciCommand::Position { fen } => write!(f, "position fen {}", fen),
            UciCommand::Go { depth } => write!(f, "go depth {}", clamp_depth(*depth)),
            UciCommand::Stop => f.write_str("stop"),
            UciCommand::Quit => f.write_str("quit"),
        }
    }
}

/// Cap a requested depth to `MIN_DEPTH..=MAX_DEPTH`.
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(MIN_DEPTH, MAX_DEPTH)
}

/// The two handshake commands, identification first.
pub fn encode_handshake() -> [String; 2] {
    [UciCommand::Uci.to_string(), UciCommand::IsReady.to_string()]
}

/// The FEN is passed through untouched; the engine validates it.
pub fn encode_position(fen: &str) -> String {
    UciCommand::Position {
        fen: fen.to_string(),
    }
    .to_string()
}

pub fn encode_go(depth: u32) -> String {
    UciCommand::Go { depth }.to_string()
}

pub fn encode_set_option(name: &str, value: Option<&str>) -> String {
    UciCommand::SetOption {
        name: name.to_string(),
        value: value.map(str::to_string),
    }
    .to_string()
}

pub fn encode_stop() -> String {
    UciCommand::Stop.to_string()
}

pub fn encode_quit() -> String {
    UciCommand::Quit.to_string()
}
