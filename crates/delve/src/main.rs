//! Delve: recursive deep research from the command line.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{Context, config, research};

/// Delve - recursive deep research with web search and LLMs
#[derive(Parser)]
#[command(name = "delve", author, version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Show debug logs and resolved profiles
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding the user config.toml (default: platform config dir)
    #[arg(long, global = true, env = "DELVE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a topic and write a report
    Research(research::ResearchArgs),

    /// Inspect or create configuration files
    Config(config::ConfigArgs),
}

const CONSOLE_FILTER: &str = "delve=info,delve_research=info,delve_llm=warn,warn";
const VERBOSE_FILTER: &str =
    "delve=debug,delve_research=debug,delve_llm=debug,delve_config=debug,info";
const FILE_FILTER: &str = "delve=trace,delve_research=trace,delve_llm=trace,delve_config=trace,info";

/// Human-readable logs on stderr (stdout carries results), plus a daily
/// JSON log file. `RUST_LOG` overrides the console filter only.
fn init_tracing(verbose: bool, log_dir: &Path) -> WorkerGuard {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { CONSOLE_FILTER })
    });
    let console = tracing_subscriber::fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "delve.log"));
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_filter(EnvFilter::new(FILE_FILTER));

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // keys may come from a .env file; its absence is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let ctx = Context {
        verbose: cli.verbose,
        config_dir: cli.config_dir,
    };

    let log_dir = ctx
        .user_config_dir()
        .map_or_else(|| PathBuf::from("logs"), |dir| dir.join("logs"));
    let _guard = init_tracing(ctx.verbose, &log_dir);

    match cli.command {
        Command::Research(args) => research::run(args, &ctx).await,
        Command::Config(args) => config::run(args, &ctx).await,
    }
}
