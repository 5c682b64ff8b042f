//! Analysis request body, in the shape the remote-analysis relay accepts:
//! `{ "fen": ..., "depth": ..., "mode": ..., "multipv": ... }`.

use serde::{Deserialize, Serialize};

use crate::uci::UciError;

const DEFAULT_DEPTH: u32 = 20;
const DEFAULT_MODE: &str = "bestmoves";
const DEFAULT_MULTIPV: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub fen: String,
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_multipv")]
    pub multipv: u32,
}

fn default_depth() -> u32 {
    DEFAULT_DEPTH
}

fn default_mode() -> String {
    DEFAULT_MODE.to_string()
}

fn default_multipv() -> u32 {
    DEFAULT_MULTIPV
}

impl AnalysisRequest {
    pub fn new(fen: impl Into<String>) -> Self {
        Self {
            fen: fen.into(),
            depth: DEFAULT_DEPTH,
            mode: default_mode(),
            multipv: DEFAULT_MULTIPV,
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Parse and validate a JSON request body.
    pub fn from_json(body: &str) -> Result<Self, UciError> {
        let request: Self = serde_json::from_str(body)?;
        request.validate()?;
        Ok(request)
    }

    pub fn to_json(&self) -> Result<String, UciError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The position must be present. Its content is not checked here.
    pub fn validate(&self) -> Result<(), UciError> {
        if self.fen.trim().is_empty() {
            return Err(UciError::MissingPosition);
        }
        if self.depth == 0 {
            return Err(UciError::InvalidDepth(self.depth));
        }
        Ok(())
    }
}
