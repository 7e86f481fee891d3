//! MediaPush CLI - move a local media library into a remote content store
//!
//! Provides commands for:
//! - Scanning a library directory into the state database
//! - Previewing the next disk-bounded batch
//! - Running upload cycles (pausable with Ctrl-C)
//! - Inspecting and retrying failed items
//! - Managing the OAuth credential

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    auth::AuthCommand, plan::PlanCommand, retry::RetryCommand, scan::ScanCommand,
    status::StatusCommand, upload::UploadCommand,
};
use context::AppContext;
use mediapush_core::config::LoggingConfig;
use output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Parser)]
#[command(
    name = "mediapush",
    version,
    about = "Upload a local media library to a remote content store"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Record the media in a directory as pending
    Scan(ScanCommand),
    /// Show what the next batch would contain
    Plan(PlanCommand),
    /// Stage, deduplicate and upload pending media
    Upload(UploadCommand),
    /// Show item counts and recent failures
    Status(StatusCommand),
    /// Return failed items to pending
    Retry(RetryCommand),
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
}

fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let level = match cli.verbose {
        0 if cli.quiet => "warn",
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json || logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(cli: &Cli, format: OutputFormat, fmt: &dyn OutputFormatter) -> Result<()> {
    let (config, _path) = context::load_config(cli.config.as_deref())?;
    init_tracing(cli, &config.logging);

    let ctx = AppContext::open(config).await?;
    match &cli.command {
        Commands::Scan(cmd) => cmd.execute(&ctx, format, fmt).await,
        Commands::Plan(cmd) => cmd.execute(&ctx, format, fmt).await,
        Commands::Upload(cmd) => cmd.execute(&ctx, format, fmt).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format, fmt).await,
        Commands::Retry(cmd) => cmd.execute(&ctx, format, fmt).await,
        Commands::Auth(cmd) => cmd.execute(&ctx, format, fmt).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let fmt = get_formatter(format, cli.quiet);

    match run(&cli, format, &*fmt).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            fmt.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
