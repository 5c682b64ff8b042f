//! Engine configuration.
//!
//! Every tunable has a compile-time default and can be overridden through a
//! dedicated environment variable. The choice between a real engine process
//! and the simulator is an explicit [`ChannelKind`], resolved once by the
//! caller and handed to the adapter.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::process::find_stockfish_path;
use crate::channel::{ChannelError, SimulatorConfig};

const CHANNEL_VAR: &str = "ENGINELINK_CHANNEL";
const ENGINE_PATH_VAR: &str = "ENGINELINK_ENGINE_PATH";
const SKILL_LEVEL_VAR: &str = "ENGINELINK_SKILL_LEVEL";
const THREADS_VAR: &str = "ENGINELINK_THREADS";
const HASH_MB_VAR: &str = "ENGINELINK_HASH_MB";
const SIM_SEED_VAR: &str = "ENGINELINK_SIM_SEED";
const SIM_SEARCH_MS_VAR: &str = "ENGINELINK_SIM_SEARCH_MS";

/// Without configuration the simulator is used, so nothing needs installing.
const DEFAULT_CHANNEL: ChannelKind = ChannelKind::Simulated;

const MAX_SKILL_LEVEL: u8 = 20;
const MAX_THREADS: u32 = 16;
const MAX_HASH_MB: u32 = 2048;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown channel kind '{0}' (expected 'process' or 'simulated')")]
    UnknownChannelKind(String),
}

/// Which transport the adapter talks through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Process,
    Simulated,
}

impl FromStr for ChannelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" | "real" => Ok(ChannelKind::Process),
            "simulated" | "mock" => Ok(ChannelKind::Simulated),
            other => Err(ConfigError::UnknownChannelKind(other.to_string())),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Process => f.write_str("process"),
            ChannelKind::Simulated => f.write_str("simulated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub channel: ChannelKind,
    /// Engine executable; searched for in common locations when unset.
    pub engine_path: Option<PathBuf>,
    pub skill_level: Option<u8>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
    pub simulator: SimulatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            engine_path: None,
            skill_level: None,
            threads: None,
            hash_mb: None,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `ENGINELINK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut simulator = SimulatorConfig::default();
        simulator.seed = get_parsed(SIM_SEED_VAR);
        if let Some(ms) = get_parsed::<u64>(SIM_SEARCH_MS_VAR) {
            simulator.search_delay = Duration::from_millis(ms);
        }

        Ok(Self {
            channel: get_channel_kind()?,
            engine_path: get_engine_path(),
            skill_level: get_parsed(SKILL_LEVEL_VAR),
            threads: get_parsed(THREADS_VAR),
            hash_mb: get_parsed(HASH_MB_VAR),
            simulator,
        })
    }

    /// Engine options to set during the handshake, clamped to safe ranges.
    pub fn uci_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        if let Some(level) = self.skill_level {
            options.push(("Skill Level".to_string(), level.min(MAX_SKILL_LEVEL).to_string()));
        }
        if let Some(threads) = self.threads {
            options.push(("Threads".to_string(), threads.clamp(1, MAX_THREADS).to_string()));
        }
        if let Some(hash_mb) = self.hash_mb {
            options.push(("Hash".to_string(), hash_mb.clamp(1, MAX_HASH_MB).to_string()));
        }
        options
    }

    /// The configured executable, or the first Stockfish found on this machine.
    pub fn resolve_engine_path(&self) -> Result<PathBuf, ChannelError> {
        if let Some(path) = &self.engine_path {
            return Ok(path.clone());
        }
        find_stockfish_path().ok_or(ChannelError::EngineNotFound)
    }
}

/// Get the channel kind.
///
/// Priority:
/// 1. `ENGINELINK_CHANNEL` env variable if set (`process` or `simulated`)
/// 2. `simulated` as fallback
pub fn get_channel_kind() -> Result<ChannelKind, ConfigError> {
    match std::env::var(CHANNEL_VAR) {
        Ok(value) => value.parse(),
        Err(_) => Ok(DEFAULT_CHANNEL),
    }
}

/// Get the engine executable path from `ENGINELINK_ENGINE_PATH`, if set.
pub fn get_engine_path() -> Option<PathBuf> {
    std::env::var(ENGINE_PATH_VAR).ok().map(PathBuf::from)
}

/// Numeric variables that fail to parse are ignored with a warning.
fn get_parsed<T: FromStr>(var: &str) -> Option<T> {
    let value = std::env::var(var).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring {}={:?}: not a valid number", var, value);
            None
        }
    }
}
