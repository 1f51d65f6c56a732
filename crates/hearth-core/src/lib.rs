pub mod cli;
pub mod commands;
pub mod config;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod render;
pub mod timezone;
pub mod window;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use layout::{
  layout_all_day_segments,
  layout_day,
  layout_gantt,
  layout_list,
  layout_month,
  layout_timed_columns,
  layout_week,
  layout_year,
  pack_columns
};
pub use model::{
  Calendar,
  Event,
  EventFeed
};
pub use timezone::{
  Viewer,
  is_event_on_day,
  minutes_of_day,
  resolve_event,
  resolve_event_timezone
};
pub use window::ViewWindow;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting hearth"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_timezone_override(
    cli.timezone.as_deref()
  );
  debug!(
    timezone = %cfg.timezone,
    week_start = %cfg.calendar.week_start,
    "effective config"
  );

  let now = Utc::now();
  let stdout = std::io::stdout();
  let mut out = stdout.lock();

  commands::dispatch(
    &cli.command,
    &cfg,
    &mut out,
    now
  )
  .context("command failed")?;

  info!("done");
  Ok(())
}
