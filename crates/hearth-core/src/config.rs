use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::Weekday;
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  warn
};

use crate::geometry::{
  DEFAULT_MIN_EVENT_MINUTES,
  HourRange
};
use crate::timezone::parse_timezone;
use crate::window::parse_week_start;

pub const CONFIG_FILE: &str =
  "hearth.toml";
const CONFIG_ENV_VAR: &str =
  "HEARTH_CONFIG";
const TIMEZONE_ENV_VAR: &str =
  "HEARTH_TIMEZONE";
const DEFAULT_TIMEZONE: &str = "UTC";
const DEFAULT_TIMED_ROW_CAP: usize = 2;

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct Config {
  #[serde(default = "default_timezone")]
  pub timezone:    String,
  #[serde(default)]
  pub calendar:    CalendarSection,
  #[serde(default)]
  pub day_view:    DayViewSection,
  #[serde(default)]
  pub year_view:   YearViewSection,
  #[serde(skip)]
  pub loaded_from: Option<PathBuf>
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct CalendarSection {
  #[serde(
    default = "default_week_start"
  )]
  pub week_start: String
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct DayViewSection {
  #[serde(default)]
  pub hour_start:        u32,
  #[serde(
    default = "default_hour_end"
  )]
  pub hour_end:          u32,
  #[serde(
    default = "default_min_event_minutes"
  )]
  pub min_event_minutes: u32
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Serialize,
  Deserialize,
)]
pub struct YearViewSection {
  #[serde(
    default = "default_timed_row_cap"
  )]
  pub timed_row_cap: usize
}

fn default_timezone() -> String {
  DEFAULT_TIMEZONE.to_string()
}

fn default_week_start() -> String {
  "monday".to_string()
}

fn default_hour_end() -> u32 {
  23
}

fn default_min_event_minutes() -> u32
{
  DEFAULT_MIN_EVENT_MINUTES
}

fn default_timed_row_cap() -> usize {
  DEFAULT_TIMED_ROW_CAP
}

impl Default for Config {
  fn default() -> Self {
    Self {
      timezone:    default_timezone(),
      calendar:    CalendarSection::default(),
      day_view:    DayViewSection::default(),
      year_view:   YearViewSection::default(),
      loaded_from: None
    }
  }
}

impl Default for CalendarSection {
  fn default() -> Self {
    Self {
      week_start: default_week_start()
    }
  }
}

impl Default for DayViewSection {
  fn default() -> Self {
    Self {
      hour_start:        0,
      hour_end:          default_hour_end(),
      min_event_minutes:
        default_min_event_minutes()
    }
  }
}

impl Default for YearViewSection {
  fn default() -> Self {
    Self {
      timed_row_cap:
        default_timed_row_cap()
    }
  }
}

impl Config {
  /// Loads the config file, if any,
  /// then applies `HEARTH_TIMEZONE`.
  #[tracing::instrument]
  pub fn load(
    override_path: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg =
      match resolve_config_path(
        override_path
      )? {
        | Some(path) => {
          info!(config = %path.display(), "loading config");
          Self::load_file(&path)?
        }
        | None => {
          debug!(
            "no config file found; \
             using defaults"
          );
          Self::default()
        }
      };

    if let Ok(raw) =
      std::env::var(TIMEZONE_ENV_VAR)
    {
      debug!(timezone = %raw, "applying timezone from environment");
      cfg.apply_timezone_override(Some(
        &raw
      ));
    }

    Ok(cfg)
  }

  fn load_file(
    path: &Path
  ) -> anyhow::Result<Self> {
    let raw = fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?;
    let mut cfg = Self::from_toml_str(
      &raw
    )
    .with_context(|| {
      format!(
        "failed to parse {}",
        path.display()
      )
    })?;
    cfg.loaded_from =
      Some(path.to_path_buf());
    Ok(cfg)
  }

  pub fn from_toml_str(
    raw: &str
  ) -> anyhow::Result<Self> {
    let mut cfg: Self =
      toml::from_str(raw).context(
        "invalid hearth config"
      )?;
    cfg.sanitize();
    Ok(cfg)
  }

  pub fn apply_timezone_override(
    &mut self,
    timezone: Option<&str>
  ) {
    let Some(raw) = timezone else {
      return;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return;
    }
    self.timezone = trimmed.to_string();
    self.sanitize();
  }

  #[must_use]
  pub fn viewer_timezone(&self) -> Tz {
    parse_timezone(
      &self.timezone,
      "config"
    )
    .unwrap_or(chrono_tz::UTC)
  }

  #[must_use]
  pub fn week_start(&self) -> Weekday {
    parse_week_start(
      &self.calendar.week_start
    )
    .unwrap_or(Weekday::Mon)
  }

  #[must_use]
  pub fn hour_range(&self) -> HourRange {
    HourRange::new(
      self.day_view.hour_start,
      self.day_view.hour_end
    )
  }

  fn sanitize(&mut self) {
    if parse_timezone(
      &self.timezone,
      "config"
    )
    .is_none()
    {
      tracing::error!(
        timezone = %self.timezone,
        "invalid viewer timezone; using UTC"
      );
      self.timezone = default_timezone();
    }

    if parse_week_start(
      &self.calendar.week_start
    )
    .is_none()
    {
      warn!(
        week_start = %self.calendar.week_start,
        "unknown week start; using monday"
      );
      self.calendar.week_start =
        default_week_start();
    }

    if self.day_view.hour_start > 23 {
      self.day_view.hour_start = 23;
    }
    if self.day_view.hour_end > 23 {
      self.day_view.hour_end = 23;
    }
    if self.day_view.hour_end
      < self.day_view.hour_start
    {
      self.day_view.hour_end =
        self.day_view.hour_start;
    }

    if self.day_view.min_event_minutes
      == 0
    {
      self.day_view.min_event_minutes =
        default_min_event_minutes();
    }

    if self.year_view.timed_row_cap == 0
    {
      self.year_view.timed_row_cap =
        default_timed_row_cap();
    }
  }
}

fn resolve_config_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    if !path.exists() {
      return Err(anyhow!(
        "config file {} does not exist",
        path.display()
      ));
    }
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(raw) =
    std::env::var(CONFIG_ENV_VAR)
  {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      let path = PathBuf::from(trimmed);
      if path.exists() {
        return Ok(Some(path));
      }
      warn!(config = %path.display(), "config from environment does not exist; ignoring");
    }
  }

  let candidate =
    dirs::config_dir().map(|dir| {
      dir.join("hearth").join(CONFIG_FILE)
    });
  Ok(candidate.filter(|path| {
    path.exists()
  }))
}

#[cfg(test)]
mod tests {
  use chrono::Weekday;

  use super::Config;
  use crate::geometry::HourRange;

  #[test]
  fn empty_file_gives_defaults() {
    let cfg = Config::from_toml_str("")
      .expect("parse empty");
    assert_eq!(cfg, Config::default());
    assert_eq!(
      cfg.viewer_timezone(),
      chrono_tz::UTC
    );
    assert_eq!(
      cfg.week_start(),
      Weekday::Mon
    );
    assert_eq!(
      cfg.year_view.timed_row_cap,
      2
    );
  }

  #[test]
  fn reads_every_section() {
    let cfg = Config::from_toml_str(
      r#"
timezone = "Asia/Tokyo"

[calendar]
week_start = "sunday"

[day_view]
hour_start = 7
hour_end = 21
min_event_minutes = 20

[year_view]
timed_row_cap = 3
"#
    )
    .expect("parse config");

    assert_eq!(
      cfg.viewer_timezone(),
      chrono_tz::Asia::Tokyo
    );
    assert_eq!(
      cfg.week_start(),
      Weekday::Sun
    );
    assert_eq!(
      cfg.hour_range(),
      HourRange::new(7, 21)
    );
    assert_eq!(
      cfg.day_view.min_event_minutes,
      20
    );
    assert_eq!(
      cfg.year_view.timed_row_cap,
      3
    );
  }

  #[test]
  fn sanitizes_bad_values() {
    let cfg = Config::from_toml_str(
      r#"
timezone = "Not/AZone"

[calendar]
week_start = "thursday"

[day_view]
hour_start = 30
hour_end = 4
min_event_minutes = 0

[year_view]
timed_row_cap = 0
"#
    )
    .expect("parse config");

    assert_eq!(cfg.timezone, "UTC");
    assert_eq!(
      cfg.calendar.week_start,
      "monday"
    );
    assert_eq!(cfg.day_view.hour_start, 23);
    assert_eq!(cfg.day_view.hour_end, 23);
    assert_eq!(
      cfg.day_view.min_event_minutes,
      15
    );
    assert_eq!(
      cfg.year_view.timed_row_cap,
      2
    );
  }

  #[test]
  fn timezone_override_replaces_file_value()
  {
    let mut cfg = Config::default();
    cfg.apply_timezone_override(Some(
      " Europe/Berlin "
    ));
    assert_eq!(
      cfg.viewer_timezone(),
      chrono_tz::Europe::Berlin
    );

    cfg.apply_timezone_override(Some(""));
    assert_eq!(cfg.timezone, "Europe/Berlin");

    cfg.apply_timezone_override(Some(
      "bogus"
    ));
    assert_eq!(cfg.timezone, "UTC");
  }

  #[test]
  fn malformed_toml_is_an_error() {
    assert!(
      Config::from_toml_str(
        "timezone = ["
      )
      .is_err()
    );
  }
}
