use serde::Serialize;

use crate::timezone::{MINUTES_PER_DAY, MinuteSpan};

pub const DEFAULT_MIN_EVENT_MINUTES: u32 = 15;
pub const MIN_BAR_WIDTH_PCT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourRange {
    pub start: u32,
    pub end: u32,
}

impl HourRange {
    pub fn new(start: u32, end: u32) -> Self {
        let start = start.min(23);
        let end = end.clamp(start, 23);
        Self { start, end }
    }

    pub fn full_day() -> Self {
        Self::new(0, 23)
    }

    pub fn first_minute(&self) -> u32 {
        self.start * 60
    }

    pub fn end_minute(&self) -> u32 {
        ((self.end + 1) * 60).min(MINUTES_PER_DAY)
    }

    pub fn total_minutes(&self) -> u32 {
        self.end_minute() - self.first_minute()
    }
}

impl Default for HourRange {
    fn default() -> Self {
        Self::full_day()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxGeometry {
    pub top_pct: f64,
    pub height_pct: f64,
    pub left_pct: f64,
    pub width_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarGeometry {
    pub left_pct: f64,
    pub width_pct: f64,
}

/// Box for a timed segment in a day column. `None` when the span lies outside
/// the visible hours. The height never drops below `min_minutes` worth of
/// grid unless the box would run past the bottom edge.
pub fn timed_box(
    span: MinuteSpan,
    column: usize,
    columns: usize,
    hours: HourRange,
    min_minutes: u32,
) -> Option<BoxGeometry> {
    let visible_start = hours.first_minute();
    let visible_end = hours.end_minute();
    if span.end_minute <= visible_start || span.start_minute >= visible_end {
        return None;
    }

    let total = f64::from(hours.total_minutes());
    let start = span.start_minute.max(visible_start);
    let end = span.end_minute.min(visible_end);
    let drawn = (end - start).max(min_minutes.max(1));

    let top_pct = f64::from(start - visible_start) / total * 100.0;
    let height_pct = (f64::from(drawn) / total * 100.0).min(100.0 - top_pct);
    let column_bar = column_bar(column, columns);

    Some(BoxGeometry {
        top_pct,
        height_pct,
        left_pct: column_bar.left_pct,
        width_pct: column_bar.width_pct,
    })
}

pub fn column_bar(column: usize, columns: usize) -> BarGeometry {
    let columns = columns.max(1);
    let width_pct = 100.0 / columns as f64;
    BarGeometry {
        left_pct: column.min(columns - 1) as f64 * width_pct,
        width_pct,
    }
}

pub fn day_bar(start_day_index: usize, end_day_index: usize, days: usize) -> BarGeometry {
    let days = days.max(1);
    let start = start_day_index.min(days - 1);
    let end = end_day_index.clamp(start, days - 1);
    let cell = 100.0 / days as f64;
    BarGeometry {
        left_pct: start as f64 * cell,
        width_pct: (end - start + 1) as f64 * cell,
    }
}

pub fn timeline_bar(offset: i64, duration: i64, total: i64) -> BarGeometry {
    if total <= 0 {
        return BarGeometry {
            left_pct: 0.0,
            width_pct: 100.0,
        };
    }

    let total = total as f64;
    let left_pct = (offset.max(0) as f64 / total * 100.0).min(100.0 - MIN_BAR_WIDTH_PCT);
    let width_pct = (duration.max(0) as f64 / total * 100.0)
        .max(MIN_BAR_WIDTH_PCT)
        .min(100.0 - left_pct);
    BarGeometry {
        left_pct,
        width_pct,
    }
}

pub fn css_percent(value: f64) -> String {
    format!("{value:.2}%")
}

#[cfg(test)]
mod tests {
    use super::{HourRange, column_bar, css_percent, day_bar, timed_box, timeline_bar};
    use crate::timezone::MinuteSpan;

    #[test]
    fn timed_box_scales_to_visible_hours() {
        let hours = HourRange::new(8, 19);
        let geometry = timed_box(MinuteSpan::new(9 * 60, 10 * 60), 1, 2, hours, 15)
            .expect("visible");

        assert_eq!(css_percent(geometry.top_pct), "8.33%");
        assert_eq!(css_percent(geometry.height_pct), "8.33%");
        assert_eq!(geometry.left_pct, 50.0);
        assert_eq!(geometry.width_pct, 50.0);
    }

    #[test]
    fn timed_box_skips_hidden_hours_and_keeps_minimum_height() {
        let hours = HourRange::new(8, 19);
        assert!(timed_box(MinuteSpan::new(60, 120), 0, 1, hours, 15).is_none());
        assert!(timed_box(MinuteSpan::new(20 * 60, 21 * 60), 0, 1, hours, 15).is_none());

        let point = timed_box(MinuteSpan::new(12 * 60, 12 * 60 + 1), 0, 1, hours, 15)
            .expect("visible");
        assert!((point.height_pct - 15.0 / 720.0 * 100.0).abs() < 1e-9);

        let bottom = timed_box(MinuteSpan::new(19 * 60 + 59, 20 * 60), 0, 1, hours, 15)
            .expect("visible");
        assert!(bottom.height_pct > 0.0);
        assert!(bottom.top_pct + bottom.height_pct <= 100.0 + 1e-9);
    }

    #[test]
    fn hour_range_is_sanitized() {
        assert_eq!(HourRange::new(30, 2), HourRange { start: 23, end: 23 });
        assert_eq!(HourRange::new(9, 5), HourRange { start: 9, end: 9 });
        assert_eq!(HourRange::full_day().total_minutes(), 1440);
    }

    #[test]
    fn bars_split_rows_evenly() {
        let bar = day_bar(2, 4, 7);
        assert!((bar.left_pct - 200.0 / 7.0).abs() < 1e-9);
        assert!((bar.width_pct - 300.0 / 7.0).abs() < 1e-9);

        let third = column_bar(2, 3);
        assert!((third.left_pct - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(column_bar(0, 0).width_pct, 100.0);
    }

    #[test]
    fn timeline_bar_has_minimum_width() {
        let bar = timeline_bar(50, 0, 100);
        assert_eq!(bar.left_pct, 50.0);
        assert!(bar.width_pct > 0.0);

        let clipped = timeline_bar(90, 50, 100);
        assert!((clipped.left_pct + clipped.width_pct - 100.0).abs() < 1e-9);
    }
}
