// ABOUTME: CLI entry point for sql-exec-eval
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use sql_exec_eval::commands;
use sql_exec_eval::config;
use sql_exec_eval::engine::Engine;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sql-exec-eval")]
#[command(about = "Execution-accuracy evaluation of SQL batches against a live engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the referenced databases and execute a query batch
    Run {
        /// Batch file: one query per line as index<TAB>sql<TAB>db_id
        #[arg(long)]
        input: PathBuf,
        /// Directory holding <db_id>/<db_id>.sqlite source databases
        #[arg(long)]
        db_dir: PathBuf,
        /// Result file to write, one line per query
        #[arg(long)]
        output: PathBuf,
        /// Target engine to execute against
        #[arg(long, value_enum)]
        engine: Option<Engine>,
        /// Connection URL (or file path for the sqlite engine)
        #[arg(long)]
        url: Option<String>,
        /// Concurrent workers (defaults to the CPU count)
        #[arg(long)]
        workers: Option<usize>,
        /// Per-query timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Path to an eval-config.toml with engine, url, workers, timeout_secs
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Score a prediction result file against a gold result file
    Score {
        /// Gold result file
        #[arg(long)]
        gold: PathBuf,
        /// Predicted result file
        #[arg(long)]
        pred: PathBuf,
        /// Score log to append to
        #[arg(long, default_value = "eval_score.txt")]
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            input,
            db_dir,
            output,
            engine,
            url,
            workers,
            timeout_secs,
            config,
        } => {
            let settings =
                config::resolve(config.as_deref(), engine, url, timeout_secs, workers)?;
            commands::run::run(&input, &db_dir, &output, settings).await
        }
        Commands::Score { gold, pred, log } => commands::score::run(&gold, &pred, &log),
    }
}
