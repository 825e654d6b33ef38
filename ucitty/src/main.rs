//! ucitty - drive a UCI chess engine from the command line.
//!
//! Runs one engine session against a real engine binary:
//!
//! - **`analyse <FEN>`**: search a position until the requested depth and
//!   print the ranked lines, as a table or as JSON.
//! - **`raw <COMMAND...>`**: send one command (`d`, `eval`, `bench`, ...) and
//!   print everything the engine answered to it.
//!
//! The engine binary comes from `--engine`, else `UCITTY_ENGINE`, else
//! `stockfish` (see [`config`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uci_session::uci::FIXED_SEARCH_DEPTH;
use uci_session::{EngineSession, SessionError};

mod config;
mod output;

use output::AnalysisReport;

/// Top-level CLI arguments.
#[derive(Debug, Parser)]
#[command(name = "ucitty", about = "Talk to a UCI chess engine")]
struct Cli {
    /// Engine binary (path or name on PATH).
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Print every raw engine line to stderr.
    #[arg(long, global = true)]
    debug: bool,

    /// Engine thread count.
    #[arg(long, global = true)]
    threads: Option<u32>,

    /// Transposition table size in MB.
    #[arg(long, global = true)]
    hash: Option<u32>,

    /// Write logs to a daily-rolling file in this directory instead of stderr.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Analyse a position and print the best lines.
    Analyse {
        /// Position in FEN.
        fen: String,

        /// Depth to wait for before stopping.
        #[arg(long, default_value_t = 20)]
        depth: u32,

        /// Number of lines to report.
        #[arg(long)]
        multipv: Option<u32>,

        /// Let the engine search to its fixed depth instead of searching until stopped.
        #[arg(long)]
        fixed: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Give up waiting for the depth after this many seconds.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Send a raw command and print the reply.
    Raw {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Error type for CLI operations.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("engine session failed: {0}")]
    Session(#[from] SessionError),

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode analysis: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().or_else(config::get_log_dir);
    let _guard = init_tracing(log_dir.as_deref())?;

    let engine = cli.engine.clone().unwrap_or_else(config::get_engine);
    tracing::info!("ucitty starting with engine {}", engine);

    let session = EngineSession::new(engine);
    let result = run(&cli, &session).await;
    if let Err(e) = session.destroy().await {
        tracing::warn!("Failed to destroy engine session: {}", e);
    }

    result?;
    Ok(())
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir).map_err(|source| CliError::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let file_appender = tracing_appender::rolling::daily(dir, "ucitty");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .with(filter)
        .init();
    Ok(Some(guard))
}

async fn run(cli: &Cli, session: &EngineSession) -> Result<(), CliError> {
    let threads = cli.threads;
    let hash = cli.hash;
    session
        .update_config(move |config| {
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if let Some(hash) = hash {
                config.hash_mb = hash;
            }
        })
        .await?;

    if cli.debug {
        session
            .set_debug_stream(|line| eprintln!("<< {}", line))
            .await?;
    }

    session.init().await?;

    match &cli.command {
        Commands::Analyse {
            fen,
            depth,
            multipv,
            fixed,
            json,
            timeout_secs,
        } => {
            let target = target_depth(*depth, *fixed);
            let config = session
                .update_config(move |config| config.max_depth = config.max_depth.max(target))
                .await?;
            let multipv = multipv.unwrap_or(config.multipv);

            session.evaluate_fen(fen.as_str(), multipv, !fixed).await?;
            let eval = session
                .wait_for_depth(target, Duration::from_secs(*timeout_secs))
                .await;
            session.stop().await?;

            let eval = match eval {
                Ok(eval) => eval,
                Err(SessionError::EvaluationTimeout(waited)) => {
                    tracing::warn!("Depth {} not reached within {:?}", target, waited);
                    session.current_eval()
                }
                Err(e) => return Err(e.into()),
            };

            let report = AnalysisReport::new(fen, &eval);
            if *json {
                println!("{}", report.to_json()?);
            } else {
                print!("{}", report.to_plain());
            }
        }
        Commands::Raw { command } => {
            let reply = session.command(command.join(" ")).await?;
            println!("{}", reply);
        }
    }

    Ok(())
}

/// A fixed-depth search never goes past the engine's fixed depth.
fn target_depth(requested: u32, fixed: bool) -> u32 {
    if fixed {
        requested.min(FIXED_SEARCH_DEPTH)
    } else {
        requested
    }
}
