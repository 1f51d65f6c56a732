use std::io::{self, IsTerminal, Write};

use chrono::{Month, NaiveDate};
use unicode_width::UnicodeWidthStr;

use crate::commands::{Resolution, ViewLayout};
use crate::config::Config;
use crate::geometry::{HourRange, css_percent, day_bar, timed_box};
use crate::layout::{GanttBar, ListDay, MonthLayout, Segment, TimeGridLayout, YearLayout};
use crate::timezone::MinuteSpan;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    hours: HourRange,
    min_event_minutes: u32,
}

impl Renderer {
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: io::stdout().is_terminal(),
            hours: cfg.hour_range(),
            min_event_minutes: cfg.day_view.min_event_minutes,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    #[tracing::instrument(skip(self, out, view))]
    pub fn write_view<W: Write>(&self, out: &mut W, view: &ViewLayout<'_>) -> anyhow::Result<()> {
        match view {
            ViewLayout::Day(grid) | ViewLayout::Week(grid) => self.write_time_grid(out, grid),
            ViewLayout::Month(month) => self.write_month(out, month),
            ViewLayout::Year(year) => self.write_year(out, year),
            ViewLayout::List(days) => self.write_list(out, days),
            ViewLayout::Gantt(bars) => self.write_gantt(out, bars),
        }
    }

    pub fn write_time_grid<W: Write>(
        &self,
        out: &mut W,
        grid: &TimeGridLayout<'_>,
    ) -> anyhow::Result<()> {
        if !grid.all_day.is_empty() {
            writeln!(out, "{}", self.paint("All day", "1"))?;
            let rows = grid
                .all_day
                .iter()
                .map(|segment| {
                    let bar = day_bar(segment.start_day_index, segment.end_day_index, grid.days.len());
                    vec![
                        date_range(&grid.days, segment),
                        segment.row.to_string(),
                        css_percent(bar.left_pct),
                        css_percent(bar.width_pct),
                        self.title_of(segment),
                    ]
                })
                .collect();
            write_table(&mut *out, &["Days", "Row", "Left", "Width", "Event"], rows)?;
            writeln!(out)?;
        }

        let mut rows = Vec::new();
        for (date, segments) in grid.days.iter().zip(&grid.timed) {
            for segment in segments {
                let Some(span) = segment.minutes else {
                    continue;
                };
                let column = segment.column.unwrap_or(0);
                let columns = segment.columns.unwrap_or(1);
                let Some(geometry) =
                    timed_box(span, column, columns, self.hours, self.min_event_minutes)
                else {
                    continue;
                };
                rows.push(vec![
                    self.paint(&date.format("%a %m-%d").to_string(), "36"),
                    minute_range(span),
                    format!("{}/{}", column + 1, columns),
                    css_percent(geometry.top_pct),
                    css_percent(geometry.height_pct),
                    css_percent(geometry.left_pct),
                    css_percent(geometry.width_pct),
                    self.title_of(segment),
                ]);
            }
        }

        if rows.is_empty() {
            writeln!(out, "no timed events")?;
            return Ok(());
        }
        write_table(
            out,
            &["Day", "Time", "Col", "Top", "Height", "Left", "Width", "Event"],
            rows,
        )
    }

    pub fn write_month<W: Write>(&self, out: &mut W, month: &MonthLayout<'_>) -> anyhow::Result<()> {
        for week in &month.weeks {
            let (Some(first), Some(last)) = (week.days.first(), week.days.last()) else {
                continue;
            };
            writeln!(
                out,
                "{}",
                self.paint(&format!("Week {first} .. {last}"), "1")
            )?;

            for bar in &week.bars {
                writeln!(
                    out,
                    "  row {} {:<13} {}",
                    bar.row,
                    date_range(&week.days, bar),
                    self.title_of(bar)
                )?;
            }
            for marker in &week.markers {
                let date = week
                    .days
                    .get(marker.day_index)
                    .map(|date| date.to_string())
                    .unwrap_or_default();
                writeln!(out, "  *     {date:<13} {}", marker.event.display_title())?;
            }
        }
        Ok(())
    }

    pub fn write_year<W: Write>(&self, out: &mut W, year: &YearLayout<'_>) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&year.year.to_string(), "1"))?;
        for month in &year.months {
            if month.all_day.is_empty() && month.timed.is_empty() && month.overflow.is_empty() {
                continue;
            }
            let name = u8::try_from(month.month)
                .ok()
                .and_then(|number| Month::try_from(number).ok())
                .map(|named| named.name().to_string())
                .unwrap_or_else(|| month.month.to_string());
            writeln!(out, "{name}")?;

            for segment in &month.all_day {
                writeln!(
                    out,
                    "  row {} {:<23} {}",
                    segment.row,
                    date_range(&month.days, segment),
                    self.title_of(segment)
                )?;
            }
            for segment in &month.timed {
                writeln!(
                    out,
                    "  slot {} {:<22} {}",
                    segment.row,
                    date_range(&month.days, segment),
                    self.title_of(segment)
                )?;
            }
            for overflow in &month.overflow {
                let date = month
                    .days
                    .get(overflow.day_index)
                    .map(|date| date.to_string())
                    .unwrap_or_default();
                writeln!(out, "         {date:<22} {}", self.paint(&overflow.label(), "2"))?;
            }
        }
        Ok(())
    }

    pub fn write_list<W: Write>(&self, out: &mut W, days: &[ListDay<'_>]) -> anyhow::Result<()> {
        if days.is_empty() {
            writeln!(out, "no events")?;
            return Ok(());
        }

        for day in days {
            writeln!(
                out,
                "{}",
                self.paint(&day.date.format("%A %Y-%m-%d").to_string(), "1")
            )?;
            for entry in &day.entries {
                let when = match entry.minutes {
                    Some(span) if !entry.all_day => minute_range(span),
                    _ => "all day".to_string(),
                };
                let location = entry
                    .event
                    .location
                    .as_deref()
                    .map(|location| format!(" @ {location}"))
                    .unwrap_or_default();
                writeln!(out, "  {when:<11} {}{location}", entry.event.display_title())?;
            }
        }
        Ok(())
    }

    pub fn write_gantt<W: Write>(&self, out: &mut W, bars: &[GanttBar<'_>]) -> anyhow::Result<()> {
        if bars.is_empty() {
            writeln!(out, "no events")?;
            return Ok(());
        }

        let rows = bars
            .iter()
            .map(|bar| {
                let mut flags = String::new();
                if bar.clipped_start {
                    flags.push('<');
                }
                if bar.clipped_end {
                    flags.push('>');
                }
                vec![
                    bar.row.to_string(),
                    css_percent(bar.bar.left_pct),
                    css_percent(bar.bar.width_pct),
                    flags,
                    bar.event.display_title().to_string(),
                ]
            })
            .collect();
        write_table(out, &["Row", "Left", "Width", "Clip", "Event"], rows)
    }

    pub fn write_resolutions<W: Write>(
        &self,
        out: &mut W,
        resolutions: &[Resolution],
    ) -> anyhow::Result<()> {
        let rows = resolutions
            .iter()
            .map(|resolution| {
                vec![
                    self.paint(&resolution.id, "33"),
                    resolution.timezone.clone(),
                    resolution.viewer_start.clone(),
                    resolution.viewer_end.clone(),
                    if resolution.all_day { "yes" } else { "" }.to_string(),
                    resolution.title.clone(),
                ]
            })
            .collect();
        write_table(
            out,
            &["ID", "Timezone", "Start", "End", "All day", "Title"],
            rows,
        )
    }

    fn title_of(&self, segment: &Segment<'_>) -> String {
        let mut title = String::new();
        if !segment.is_start {
            title.push_str("<< ");
        }
        title.push_str(segment.event.display_title());
        if !segment.is_end {
            title.push_str(" >>");
        }
        title
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn date_range(days: &[NaiveDate], segment: &Segment<'_>) -> String {
    let first = days.get(segment.start_day_index);
    let last = days.get(segment.end_day_index);
    match (first, last) {
        (Some(first), Some(last)) if first == last => first.format("%m-%d").to_string(),
        (Some(first), Some(last)) => {
            format!("{}..{}", first.format("%m-%d"), last.format("%m-%d"))
        }
        _ => "-".to_string(),
    }
}

fn minute_range(span: MinuteSpan) -> String {
    format!("{}-{}", clock(span.start_minute), clock(span.end_minute))
}

fn clock(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
