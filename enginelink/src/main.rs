//! enginelink - drive a UCI engine from the command line.
//!
//! Starts either a real engine process or the built-in simulator (see
//! [`engine::config`] for the `ENGINELINK_*` environment variables), waits for
//! the handshake, runs one depth-limited analysis and prints what the engine
//! says. Subcommands:
//!
//! - `analyze --fen <FEN> [--depth N]`: analyse a position
//! - `request '<JSON>'`: analyse a relay-shaped body `{fen, depth, mode, multipv}`
//! - `handshake`: only check that the engine comes up

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use engine::{
    AnalysisRequest, ChannelKind, ConfigError, EngineAdapter, EngineConfig, EngineError, EventKind,
    UciError,
};

mod logging;
mod output;
mod wait;

use output::OutputFormat;

/// Depth used when `--depth` is not given.
const DEFAULT_DEPTH: u32 = 12;

/// Default caller-side deadline for the handshake and for the result.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "enginelink", about = "Analyse chess positions with a UCI engine or a simulator")]
struct Cli {
    /// Write logs to a daily rolling file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse one position.
    Analyze {
        /// Position in FEN. Passed to the engine unchecked.
        #[arg(long)]
        fen: String,

        /// Search depth; values above 24 are capped.
        #[arg(short, long, default_value_t = DEFAULT_DEPTH)]
        depth: u32,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Analyse a JSON request body: {"fen": ..., "depth": ..., "mode": ..., "multipv": ...}
    Request {
        /// The request body.
        body: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Start the engine, complete the handshake and report its name.
    Handshake {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Engine selection and tuning. Flags override `ENGINELINK_*` variables.
#[derive(Args, Debug, Clone)]
struct EngineArgs {
    /// `process` for a real engine, `simulated` for the built-in stand-in.
    #[arg(long)]
    channel: Option<ChannelKind>,

    /// Engine executable (process channel only).
    #[arg(long)]
    engine_path: Option<PathBuf>,

    /// Engine skill level, 0-20.
    #[arg(long)]
    skill_level: Option<u8>,

    /// Engine search threads, 1-16.
    #[arg(long)]
    threads: Option<u32>,

    /// Engine hash table size in MB, 1-2048.
    #[arg(long)]
    hash_mb: Option<u32>,

    /// Seed for the simulator's random output.
    #[arg(long)]
    seed: Option<u64>,

    /// Give up waiting for the engine after this many seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Print events as JSON lines.
    #[arg(long)]
    json: bool,
}

impl EngineArgs {
    /// Environment configuration with the flags layered on top.
    fn to_config(&self) -> Result<EngineConfig, ConfigError> {
        let mut config = EngineConfig::from_env()?;
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(path) = &self.engine_path {
            config.engine_path = Some(path.clone());
        }
        if let Some(level) = self.skill_level {
            config.skill_level = Some(level);
        }
        if let Some(threads) = self.threads {
            config.threads = Some(threads);
        }
        if let Some(hash_mb) = self.hash_mb {
            config.hash_mb = Some(hash_mb);
        }
        if let Some(seed) = self.seed {
            config.simulator.seed = Some(seed);
        }
        Ok(config)
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("invalid request: {0}")]
    Request(#[from] UciError),

    #[error(transparent)]
    Wait(#[from] wait::WaitError),

    #[error("failed to render event: {0}")]
    Render(#[from] serde_json::Error),
}

/// Start the engine and wait for the handshake.
async fn start_engine(args: &EngineArgs) -> Result<EngineAdapter, CliError> {
    let config = args.to_config()?;
    tracing::debug!("Engine configuration: {:?}", config);

    let adapter = EngineAdapter::from_config(&config)?;
    if let Err(e) = wait::wait_for_ready(&adapter, args.timeout()).await {
        adapter.terminate();
        return Err(e.into());
    }
    Ok(adapter)
}

/// Run one analysis and print every event plus a summary.
async fn run_analysis(args: &EngineArgs, request: AnalysisRequest) -> Result<(), CliError> {
    request.validate()?;
    let adapter = start_engine(args).await?;
    let mut events = wait::subscribe(&adapter);
    tracing::info!(
        "Engine ready: {}",
        adapter.engine_name().as_deref().unwrap_or("unknown engine")
    );

    adapter.submit(&request)?;

    let format = args.format();
    let mut last_info = None;
    let mut render_error = None;
    let result = wait::wait_for_result(&mut events, args.timeout(), |event| {
        match output::render_event(event, format) {
            Ok(line) => println!("{}", line),
            Err(e) => render_error = Some(e),
        }
        if event.kind == EventKind::Info
            && (event.score_centipawns.is_some() || event.mate_in.is_some())
        {
            last_info = Some(event.clone());
        }
    })
    .await;

    if result.is_err() {
        adapter.stop();
    }
    adapter.terminate();

    if let Some(e) = render_error {
        return Err(e.into());
    }
    let best = result?;
    if format == OutputFormat::Text {
        println!("{}", output::render_summary(&best, last_info.as_ref()));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Analyze { fen, depth, engine } => {
            run_analysis(&engine, AnalysisRequest::new(fen).with_depth(depth)).await
        }
        Commands::Request { body, engine } => {
            let request = AnalysisRequest::from_json(&body)?;
            tracing::debug!(
                "Request mode={} multipv={} (engine reports its principal line only)",
                request.mode,
                request.multipv
            );
            run_analysis(&engine, request).await
        }
        Commands::Handshake { engine } => {
            let adapter = start_engine(&engine).await?;
            let name = adapter.engine_name().unwrap_or_else(|| "unknown engine".to_string());
            if engine.json {
                println!("{}", serde_json::json!({ "ready": true, "engine": name }));
            } else {
                println!("Engine ready: {}", name);
            }
            adapter.terminate();
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_dir.as_deref()).context("failed to set up logging")?;

    tracing::info!("Starting enginelink");
    run(cli).await?;
    Ok(())
}
