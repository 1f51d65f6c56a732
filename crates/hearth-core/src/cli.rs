use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "hearth",
    version,
    about = "Hearth: timezone-aware calendar layout for the household planner"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Path to hearth.toml
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Viewer timezone, e.g. America/Chicago
    #[arg(long = "tz", global = true)]
    pub timezone: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Compute the layout of one calendar view
    Layout(LayoutArgs),
    /// Show the timezone and viewer-local span each event resolves to
    Resolve(ResolveArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Event feed JSON: {"events": [...], "calendars": [...]}
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, value_enum, default_value_t = ViewKind::Week)]
    pub view: ViewKind,

    /// Focus date (YYYY-MM-DD); defaults to today in the viewer timezone
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Number of days for list and gantt views
    #[arg(long, default_value_t = 14)]
    pub days: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Day,
    Week,
    Month,
    Year,
    List,
    Gantt,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
