//! In-process stand-in for a UCI engine.
//!
//! Speaks the same command vocabulary and emits the same line grammar as a
//! real engine, with artificial latency and random but well-formed analysis.
//! Moves come from a fixed candidate list and are never checked for legality.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use super::{ChannelError, EngineChannel, Inbound, InboundCallback, Subscribers};
use crate::lock;
use crate::uci::clamp_depth;

/// Moves the simulator picks its answers from.
pub const CANDIDATE_MOVES: [&str; 4] = ["e2e4", "d2d4", "g1f3", "b1c3"];

/// Depth used for a bare `go`.
const DEFAULT_SEARCH_DEPTH: u32 = 12;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Reported in `id name`.
    pub name: String,
    /// Latency before each command is answered.
    pub reply_delay: Duration,
    /// Time a `go` takes before it reports, unless stopped.
    pub search_delay: Duration,
    /// Fixed seed for reproducible output.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            name: "Simulated Stockfish".to_string(),
            reply_delay: Duration::from_millis(100),
            search_delay: Duration::from_millis(1000),
            seed: None,
        }
    }
}

/// Channel whose far end is a [`SimulatedEngine`] task instead of a process.
pub struct SimulatedChannel {
    command_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    subscribers: Arc<Subscribers>,
}

impl SimulatedChannel {
    /// Start the simulator task. Must be called from within a tokio runtime.
    pub fn spawn(config: SimulatorConfig) -> Self {
        tracing::info!("Starting simulated engine (config: {:?})", config);
        let subscribers = Arc::new(Subscribers::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let engine = SimulatedEngine::new(config, subscribers.clone());
        tokio::spawn(engine.run(command_rx));

        Self {
            command_tx: Mutex::new(Some(command_tx)),
            subscribers,
        }
    }
}

impl EngineChannel for SimulatedChannel {
    fn send(&self, command: &str) -> Result<(), ChannelError> {
        let command_tx = lock(&self.command_tx);
        let tx = command_tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(command.to_string()).map_err(|_| ChannelError::Closed)
    }

    fn on_receive(&self, callback: InboundCallback) {
        self.subscribers.register(callback);
    }

    fn close(&self) {
        if self.subscribers.close() {
            tracing::debug!("Closing simulated engine channel");
            lock(&self.command_tx).take();
        }
    }

    fn is_closed(&self) -> bool {
        self.subscribers.is_closed()
    }
}

impl Drop for SimulatedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

struct PendingSearch {
    started: Instant,
    deadline: Instant,
    depth: u32,
}

struct SimulatedEngine {
    config: SimulatorConfig,
    rng: StdRng,
    subscribers: Arc<Subscribers>,
    uci_ok: bool,
    position: Option<String>,
    pending: Option<PendingSearch>,
}

impl SimulatedEngine {
    fn new(config: SimulatorConfig, subscribers: Arc<Subscribers>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            subscribers,
            uci_ok: false,
            position: None,
            pending: None,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<String>) {
        tracing::debug!("Simulated engine started");

        loop {
            let deadline = self.pending.as_ref().map(|search| search.deadline);

            tokio::select! {
                biased;

                cmd = command_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd.trim()).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.finish_search();
                }
            }
        }

        tracing::debug!("Simulated engine exited");
    }

    /// Returns `false` once the engine should stop.
    async fn handle_command(&mut self, cmd: &str) -> bool {
        tracing::trace!("Simulated engine received: {}", cmd);
        time::sleep(self.config.reply_delay).await;

        let keyword = cmd.split_whitespace().next().unwrap_or("");
        match keyword {
            "uci" => {
                self.emit(format!("id name {}", self.config.name));
                self.emit("id author enginelink".to_string());
                self.emit("uciok".to_string());
                self.uci_ok = true;
            }
            "isready" => self.emit("readyok".to_string()),
            "setoption" => {}
            "position" => {
                self.position = Some(cmd.to_string());
                self.emit("info string position set".to_string());
            }
            "go" => self.start_search(cmd),
            "stop" => self.finish_search(),
            "quit" => return false,
            _ => self.emit(format!("info string unknown command: {}", cmd)),
        }
        true
    }

    fn start_search(&mut self, cmd: &str) {
        if !self.uci_ok {
            self.emit("info string go refused before uci handshake".to_string());
            return;
        }
        if self.position.is_none() {
            tracing::debug!("Simulated search without a position, using the start position");
        }

        let mut tokens = cmd.split_whitespace().skip_while(|t| *t != "depth").skip(1);
        let depth = tokens
            .next()
            .and_then(|d| d.parse().ok())
            .map(clamp_depth)
            .unwrap_or(DEFAULT_SEARCH_DEPTH);

        let started = Instant::now();
        // A new go supersedes whatever was running
        self.pending = Some(PendingSearch {
            started,
            deadline: started + self.config.search_delay,
            depth,
        });
    }

    fn finish_search(&mut self) {
        let Some(search) = self.pending.take() else {
            return;
        };

        let best = CANDIDATE_MOVES.choose(&mut self.rng).copied().unwrap_or("e2e4");
        let score: i32 = self.rng.gen_range(-50..=80);
        let nodes: u64 = self.rng.gen_range(1_000..=250_000);
        let time_ms = search.started.elapsed().as_millis().max(1) as u64;
        let nps = nodes * 1000 / time_ms;

        self.emit(format!(
            "info depth {} score cp {} nodes {} nps {} time {} pv {}",
            search.depth, score, nodes, nps, time_ms, best
        ));
        self.emit(format!("bestmove {}", best));
    }

    fn emit(&self, line: String) {
        tracing::trace!("Simulated engine << {}", line);
        self.subscribers.deliver(Inbound::Line(line));
    }
}
