//! Stagehand CLI - Main Entry Point
//!
//! Replays recorded domain event streams through the notifier and reports
//! the run outcome through the process exit code.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stagehand_cli::commands::{config, replay};
use stagehand_cli::output::{self, print_error};
use stagehand_core::StagehandConfig;

/// Exit code for a corrupt stream, unreadable input or outstanding async work
const EXIT_FATAL: i32 = 2;

/// Stagehand - test-lifecycle event notification
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(
        long,
        short,
        env = "STAGEHAND_CONFIG",
        default_value = stagehand_core::DEFAULT_CONFIG_FILE,
        global = true
    )]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event stream and emit native notifications
    Replay(replay::ReplayArgs),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),

    /// Show version information
    Version,
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Replay(args) => {
            let config = StagehandConfig::load(&cli.config)?;
            replay::execute(args, config, cli.format).await
        }
        Commands::Config(cmd) => {
            config::execute(cmd, &cli.config, cli.format)?;
            Ok(0)
        }
        Commands::Version => {
            println!("Stagehand CLI v{}", stagehand_core::VERSION);
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays a clean notification stream
    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&format!("Fatal: {:#}", e));
            std::process::exit(EXIT_FATAL);
        }
    }
}
