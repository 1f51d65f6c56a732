use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{Command, LayoutArgs, OutputFormat, ResolveArgs, ViewKind};
use crate::config::Config;
use crate::layout::{
    GanttBar, ListDay, MonthLayout, TimeGridLayout, YearLayout, layout_day, layout_gantt,
    layout_list, layout_month, layout_week, layout_year,
};
use crate::model::{Event, EventFeed};
use crate::render::Renderer;
use crate::timezone::{Viewer, resolve_event, zoned_date};
use crate::window::ViewWindow;

/// A computed view, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", content = "layout", rename_all = "lowercase")]
pub enum ViewLayout<'a> {
    Day(TimeGridLayout<'a>),
    Week(TimeGridLayout<'a>),
    Month(MonthLayout<'a>),
    Year(YearLayout<'a>),
    List(Vec<ListDay<'a>>),
    Gantt(Vec<GanttBar<'a>>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub id: String,
    pub title: String,
    pub timezone: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub viewer_start: String,
    pub viewer_end: String,
    pub all_day: bool,
}

#[tracing::instrument(skip(cfg, out, now))]
pub fn dispatch<W: Write>(
    command: &Command,
    cfg: &Config,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match command {
        Command::Layout(args) => run_layout(args, cfg, out, now),
        Command::Resolve(args) => run_resolve(args, cfg, out, now),
    }
}

fn run_layout<W: Write>(
    args: &LayoutArgs,
    cfg: &Config,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let feed = EventFeed::load(&args.input)?;
    let viewer = Viewer::new(cfg.viewer_timezone(), &feed.calendars, now);
    let focus = args
        .date
        .unwrap_or_else(|| zoned_date(now, viewer.timezone));

    info!(
        view = ?args.view,
        %focus,
        timezone = %viewer.timezone,
        events = feed.events.len(),
        "computing layout"
    );
    let view = compute_view(args.view, focus, args.days, &feed.events, cfg, &viewer);

    match args.format {
        OutputFormat::Json => write_json(out, &view),
        OutputFormat::Text => Renderer::new(cfg).write_view(out, &view),
    }
}

/// Builds the window for `kind` around `focus` and lays `events` out in it.
pub fn compute_view<'a>(
    kind: ViewKind,
    focus: NaiveDate,
    days: usize,
    events: &'a [Event],
    cfg: &Config,
    viewer: &Viewer<'_>,
) -> ViewLayout<'a> {
    let timezone = viewer.timezone;
    match kind {
        ViewKind::Day => ViewLayout::Day(layout_day(events, focus, viewer)),
        ViewKind::Week => {
            let window = ViewWindow::week(focus, cfg.week_start(), timezone);
            ViewLayout::Week(layout_week(events, &window, viewer))
        }
        ViewKind::Month => {
            let window = ViewWindow::month(focus, cfg.week_start(), timezone);
            ViewLayout::Month(layout_month(events, &window, viewer))
        }
        ViewKind::Year => ViewLayout::Year(layout_year(
            events,
            focus.year(),
            viewer,
            cfg.year_view.timed_row_cap,
        )),
        ViewKind::List => {
            let window = ViewWindow::range(focus, days.max(1), timezone);
            ViewLayout::List(layout_list(events, &window, viewer))
        }
        ViewKind::Gantt => {
            let window = ViewWindow::range(focus, days.max(1), timezone);
            ViewLayout::Gantt(layout_gantt(events, &window, viewer))
        }
    }
}

fn run_resolve<W: Write>(
    args: &ResolveArgs,
    cfg: &Config,
    out: &mut W,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let feed = EventFeed::load(&args.input)?;
    let viewer = Viewer::new(cfg.viewer_timezone(), &feed.calendars, now);
    let resolutions = resolve_feed(&feed.events, &viewer);
    debug!(count = resolutions.len(), "resolved events");

    match args.format {
        OutputFormat::Json => write_json(out, &resolutions),
        OutputFormat::Text => Renderer::new(cfg).write_resolutions(out, &resolutions),
    }
}

pub fn resolve_feed(events: &[Event], viewer: &Viewer<'_>) -> Vec<Resolution> {
    events
        .iter()
        .map(|event| {
            let resolved = resolve_event(event, viewer);
            let local = |instant: DateTime<Utc>| {
                instant
                    .with_timezone(&viewer.timezone)
                    .format("%Y-%m-%d %H:%M %Z")
                    .to_string()
            };
            Resolution {
                id: event.id.clone(),
                title: event.display_title().to_string(),
                timezone: resolved.timezone.name().to_string(),
                start: resolved.start,
                end: resolved.end,
                viewer_start: local(resolved.start),
                viewer_end: local(resolved.end),
                all_day: resolved.all_day,
            }
        })
        .collect()
}

fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to encode json output")?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{ViewLayout, compute_view, resolve_feed};
    use crate::cli::ViewKind;
    use crate::config::Config;
    use crate::model::{Calendar, Event};
    use crate::timezone::Viewer;

    #[test]
    fn resolution_reports_calendar_timezone_and_viewer_times() {
        let calendars = vec![Calendar {
            id: "school".to_string(),
            timezone: Some("America/Chicago".to_string()),
            ..Calendar::default()
        }];
        let events = vec![
            Event::new("pickup", "2024-03-01T15:00:00", "2024-03-01T15:30:00")
                .with_calendar("school"),
        ];
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
            .single()
            .expect("now");
        let viewer = Viewer::new(chrono_tz::America::New_York, &calendars, now);

        let resolutions = resolve_feed(&events, &viewer);
        assert_eq!(resolutions[0].timezone, "America/Chicago");
        assert_eq!(resolutions[0].viewer_start, "2024-03-01 16:00 EST");
    }

    #[test]
    fn compute_view_serializes_with_view_tag() {
        let events = vec![Event::new("a", "2024-03-04T09:00:00", "2024-03-04T10:00:00")];
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 0, 0, 0)
            .single()
            .expect("now");
        let viewer = Viewer::new(chrono_tz::UTC, &[], now);
        let focus = NaiveDate::from_ymd_opt(2024, 3, 4).expect("date");

        let view = compute_view(ViewKind::List, focus, 7, &events, &Config::default(), &viewer);
        assert!(matches!(&view, ViewLayout::List(days) if days.len() == 1));

        let json = serde_json::to_value(&view).expect("encode");
        assert_eq!(json["view"], "list");
        assert_eq!(json["layout"][0]["entries"][0]["event"]["id"], "a");
        assert_eq!(json["layout"][0]["entries"][0]["minutes"]["startMinute"], 540);
    }
}
