use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::geometry::{BarGeometry, MIN_BAR_WIDTH_PCT, timeline_bar};
use crate::model::Event;
use crate::timezone::{MinuteSpan, ResolvedEvent, Viewer, resolve_event, span_on_date};
use crate::window::{ViewWindow, WindowDay};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment<'a> {
    pub event: &'a Event,
    pub start_day_index: usize,
    pub end_day_index: usize,
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<MinuteSpan>,
    pub is_start: bool,
    pub is_end: bool,
}

impl Segment<'_> {
    pub fn span_days(&self) -> usize {
        self.end_day_index - self.start_day_index + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaySpan {
    pub start_day_index: usize,
    pub end_day_index: usize,
    pub is_start: bool,
    pub is_end: bool,
}

impl DaySpan {
    pub fn len(&self) -> usize {
        self.end_day_index - self.start_day_index + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSlot {
    pub column: usize,
    pub columns: usize,
}

#[derive(Debug, Clone)]
pub struct RowPacker<K> {
    rows: Vec<Vec<(K, K)>>,
}

impl<K: Ord + Copy> Default for RowPacker<K> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<K: Ord + Copy> RowPacker<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest row whose intervals do not intersect `[start, end)`; opens a
    /// new row when none fits.
    pub fn place(&mut self, start: K, end: K) -> usize {
        match self.free_row(start, end, self.rows.len()) {
            Some(row) => {
                self.rows[row].push((start, end));
                row
            }
            None => {
                self.rows.push(vec![(start, end)]);
                self.rows.len() - 1
            }
        }
    }

    pub fn place_capped(&mut self, start: K, end: K, cap: usize) -> Option<usize> {
        if let Some(row) = self.free_row(start, end, cap) {
            self.rows[row].push((start, end));
            return Some(row);
        }
        if self.rows.len() < cap {
            self.rows.push(vec![(start, end)]);
            return Some(self.rows.len() - 1);
        }
        None
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn free_row(&self, start: K, end: K, limit: usize) -> Option<usize> {
        self.rows.iter().take(limit).position(|row| {
            !row.iter()
                .any(|&(taken_start, taken_end)| start < taken_end && taken_start < end)
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry<'a> {
    event: &'a Event,
    resolved: ResolvedEvent,
}

fn resolve_all<'a>(events: &'a [Event], viewer: &Viewer<'_>) -> Vec<Entry<'a>> {
    events
        .iter()
        .map(|event| Entry {
            event,
            resolved: resolve_event(event, viewer),
        })
        .collect()
}

pub fn day_span(resolved: &ResolvedEvent, window: &ViewWindow) -> Option<DaySpan> {
    let window_first = window.first_date()?;
    let window_last = window.last_date()?;
    let (first, last) = resolved.viewer_dates(window.timezone());
    if last < window_first || first > window_last {
        return None;
    }

    Some(DaySpan {
        start_day_index: window.index_of(first.max(window_first))?,
        end_day_index: window.index_of(last.min(window_last))?,
        is_start: first >= window_first,
        is_end: last <= window_last,
    })
}

#[tracing::instrument(skip(events, window, viewer), fields(events = events.len()))]
pub fn layout_all_day_segments<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> Vec<Segment<'a>> {
    pack_day_rows(&resolve_all(events, viewer), window)
}

fn pack_day_rows<'a>(entries: &[Entry<'a>], window: &ViewWindow) -> Vec<Segment<'a>> {
    let mut placed: Vec<(&Event, DaySpan)> = entries
        .iter()
        .filter_map(|entry| day_span(&entry.resolved, window).map(|span| (entry.event, span)))
        .collect();

    // Chronological, then longest first among same-day starts.
    placed.sort_by(|(_, a), (_, b)| {
        a.start_day_index
            .cmp(&b.start_day_index)
            .then_with(|| b.len().cmp(&a.len()))
    });

    let mut packer = RowPacker::new();
    let segments: Vec<Segment<'a>> = placed
        .into_iter()
        .map(|(event, span)| {
            let row = packer.place(span.start_day_index, span.end_day_index + 1);
            Segment {
                event,
                start_day_index: span.start_day_index,
                end_day_index: span.end_day_index,
                row,
                column: None,
                columns: None,
                minutes: None,
                is_start: span.is_start,
                is_end: span.is_end,
            }
        })
        .collect();

    debug!(
        segments = segments.len(),
        rows = packer.row_count(),
        days = window.len(),
        "packed day rows"
    );
    segments
}

/// Side-by-side columns for minute spans on one day. The result lines up with
/// `spans`. Each overlap cluster shares its own column count.
pub fn pack_columns(spans: &[MinuteSpan]) -> Vec<ColumnSlot> {
    let mut order: Vec<usize> = (0..spans.len()).collect();
    order.sort_by_key(|&idx| (spans[idx].start_minute, spans[idx].end_minute));

    let mut slots = vec![
        ColumnSlot {
            column: 0,
            columns: 1,
        };
        spans.len()
    ];
    let mut active: Vec<(usize, usize)> = Vec::new();
    let mut cluster: Vec<usize> = Vec::new();
    let mut cluster_max_columns = 0;

    for idx in order {
        let span = spans[idx];
        active.retain(|&(other, _)| spans[other].end_minute > span.start_minute);

        if active.is_empty() {
            close_cluster(&mut slots, &cluster, cluster_max_columns);
            cluster.clear();
            cluster_max_columns = 0;
        }

        let column = lowest_free_column(&active);
        slots[idx].column = column;
        active.push((idx, column));
        cluster.push(idx);
        cluster_max_columns = cluster_max_columns.max(column + 1);
    }
    close_cluster(&mut slots, &cluster, cluster_max_columns);

    slots
}

fn lowest_free_column(active: &[(usize, usize)]) -> usize {
    let mut column = 0;
    while active.iter().any(|&(_, used)| used == column) {
        column += 1;
    }
    column
}

fn close_cluster(slots: &mut [ColumnSlot], cluster: &[usize], columns: usize) {
    for &idx in cluster {
        slots[idx].columns = columns;
    }
}

#[tracing::instrument(skip(events, viewer), fields(events = events.len(), date = %day.date))]
pub fn layout_timed_columns<'a>(
    events: &'a [Event],
    day: &WindowDay,
    viewer: &Viewer<'_>,
) -> Vec<Segment<'a>> {
    let timed: Vec<Entry<'a>> = resolve_all(events, viewer)
        .into_iter()
        .filter(|entry| !entry.resolved.all_day)
        .collect();
    timed_columns_at(&timed, day.date, 0, viewer)
}

fn timed_columns_at<'a>(
    entries: &[Entry<'a>],
    date: NaiveDate,
    day_index: usize,
    viewer: &Viewer<'_>,
) -> Vec<Segment<'a>> {
    let on_day: Vec<(&Entry<'a>, MinuteSpan)> = entries
        .iter()
        .filter_map(|entry| {
            span_on_date(&entry.resolved, date, viewer.timezone).map(|span| (entry, span))
        })
        .collect();

    let spans: Vec<MinuteSpan> = on_day.iter().map(|(_, span)| *span).collect();
    let slots = pack_columns(&spans);

    let mut segments: Vec<Segment<'a>> = on_day
        .iter()
        .zip(slots)
        .map(|((entry, span), slot)| {
            let (first, last) = entry.resolved.viewer_dates(viewer.timezone);
            Segment {
                event: entry.event,
                start_day_index: day_index,
                end_day_index: day_index,
                row: 0,
                column: Some(slot.column),
                columns: Some(slot.columns),
                minutes: Some(*span),
                is_start: first == date,
                is_end: last == date,
            }
        })
        .collect();

    segments.sort_by_key(|segment| {
        segment
            .minutes
            .map(|span| (span.start_minute, span.end_minute))
    });
    segments
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeGridLayout<'a> {
    pub days: Vec<NaiveDate>,
    pub all_day: Vec<Segment<'a>>,
    pub timed: Vec<Vec<Segment<'a>>>,
}

#[tracing::instrument(skip(events, window, viewer), fields(events = events.len(), days = window.len()))]
pub fn layout_time_grid<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> TimeGridLayout<'a> {
    let (all_day, timed): (Vec<Entry<'a>>, Vec<Entry<'a>>) = resolve_all(events, viewer)
        .into_iter()
        .partition(|entry| entry.resolved.all_day);

    let timed = window
        .days()
        .iter()
        .enumerate()
        .map(|(idx, day)| timed_columns_at(&timed, day.date, idx, viewer))
        .collect();

    TimeGridLayout {
        days: window.days().iter().map(|day| day.date).collect(),
        all_day: pack_day_rows(&all_day, window),
        timed,
    }
}

pub fn layout_week<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> TimeGridLayout<'a> {
    layout_time_grid(events, window, viewer)
}

pub fn layout_day<'a>(events: &'a [Event], date: NaiveDate, viewer: &Viewer<'_>) -> TimeGridLayout<'a> {
    layout_time_grid(events, &ViewWindow::day(date, viewer.timezone), viewer)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMarker<'a> {
    pub event: &'a Event,
    pub day_index: usize,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthWeek<'a> {
    pub days: Vec<NaiveDate>,
    pub bars: Vec<Segment<'a>>,
    pub markers: Vec<DayMarker<'a>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthLayout<'a> {
    pub weeks: Vec<MonthWeek<'a>>,
}

#[tracing::instrument(skip(events, window, viewer), fields(events = events.len(), days = window.len()))]
pub fn layout_month<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> MonthLayout<'a> {
    let timezone = window.timezone();
    let (bars, dots): (Vec<Entry<'a>>, Vec<Entry<'a>>) = resolve_all(events, viewer)
        .into_iter()
        .partition(|entry| entry.resolved.all_day || entry.resolved.spans_multiple_days(timezone));

    let weeks = window
        .weeks()
        .iter()
        .map(|week| {
            let mut markers: Vec<DayMarker<'a>> = dots
                .iter()
                .filter_map(|entry| {
                    let (first, _) = entry.resolved.viewer_dates(timezone);
                    week.index_of(first).map(|day_index| DayMarker {
                        event: entry.event,
                        day_index,
                        start: entry.resolved.start,
                    })
                })
                .collect();
            markers.sort_by_key(|marker| (marker.day_index, marker.start));

            MonthWeek {
                days: week.days().iter().map(|day| day.date).collect(),
                bars: pack_day_rows(&bars, week),
                markers,
            }
        })
        .collect();

    MonthLayout { weeks }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overflow {
    pub day_index: usize,
    pub hidden: usize,
}

impl Overflow {
    pub fn label(&self) -> String {
        format!("+{} more", self.hidden)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearMonth<'a> {
    pub month: u32,
    pub days: Vec<NaiveDate>,
    pub all_day: Vec<Segment<'a>>,
    pub timed: Vec<Segment<'a>>,
    pub overflow: Vec<Overflow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearLayout<'a> {
    pub year: i32,
    pub months: Vec<YearMonth<'a>>,
}

/// Twelve month strips. All-day rows are unbounded; timed events get at most
/// `timed_row_cap` rows and the rest are counted per day.
#[tracing::instrument(skip(events, viewer), fields(events = events.len()))]
pub fn layout_year<'a>(
    events: &'a [Event],
    year: i32,
    viewer: &Viewer<'_>,
    timed_row_cap: usize,
) -> YearLayout<'a> {
    let (long, short): (Vec<Entry<'a>>, Vec<Entry<'a>>) = resolve_all(events, viewer)
        .into_iter()
        .partition(|entry| {
            entry.resolved.all_day || entry.resolved.spans_multiple_days(viewer.timezone)
        });

    let months = (1_u32..=12)
        .filter_map(|month| NaiveDate::from_ymd_opt(year, month, 1))
        .map(|first| {
            let window = ViewWindow::calendar_month(first, viewer.timezone);
            let (timed, overflow) = pack_capped(&short, &window, timed_row_cap);
            YearMonth {
                month: first.month(),
                days: window.days().iter().map(|day| day.date).collect(),
                all_day: pack_day_rows(&long, &window),
                timed,
                overflow,
            }
        })
        .collect();

    YearLayout { year, months }
}

fn pack_capped<'a>(
    entries: &[Entry<'a>],
    window: &ViewWindow,
    cap: usize,
) -> (Vec<Segment<'a>>, Vec<Overflow>) {
    let mut placed: Vec<(&Entry<'a>, DaySpan)> = entries
        .iter()
        .filter_map(|entry| day_span(&entry.resolved, window).map(|span| (entry, span)))
        .collect();
    placed.sort_by_key(|(entry, span)| (span.start_day_index, entry.resolved.start));

    let mut packer = RowPacker::new();
    let mut segments = Vec::new();
    let mut overflow: Vec<Overflow> = Vec::new();

    for (entry, span) in placed {
        match packer.place_capped(span.start_day_index, span.end_day_index + 1, cap) {
            Some(row) => segments.push(Segment {
                event: entry.event,
                start_day_index: span.start_day_index,
                end_day_index: span.end_day_index,
                row,
                column: None,
                columns: None,
                minutes: None,
                is_start: span.is_start,
                is_end: span.is_end,
            }),
            None => match overflow.last_mut() {
                Some(last) if last.day_index == span.start_day_index => last.hidden += 1,
                _ => overflow.push(Overflow {
                    day_index: span.start_day_index,
                    hidden: 1,
                }),
            },
        }
    }

    (segments, overflow)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry<'a> {
    pub event: &'a Event,
    pub all_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<MinuteSpan>,
    pub is_start: bool,
    pub is_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDay<'a> {
    pub date: NaiveDate,
    pub entries: Vec<ListEntry<'a>>,
}

#[tracing::instrument(skip(events, window, viewer), fields(events = events.len(), days = window.len()))]
pub fn layout_list<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> Vec<ListDay<'a>> {
    let mut entries = resolve_all(events, viewer);
    entries.sort_by(|a, b| match (a.resolved.all_day, b.resolved.all_day) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .resolved
            .start
            .cmp(&b.resolved.start)
            .then_with(|| a.event.id.cmp(&b.event.id)),
    });

    let timezone = window.timezone();
    window
        .days()
        .iter()
        .filter_map(|day| {
            let listed: Vec<ListEntry<'a>> = entries
                .iter()
                .filter(|entry| entry.resolved.touches_date(day.date, timezone))
                .map(|entry| {
                    let (first, last) = entry.resolved.viewer_dates(timezone);
                    ListEntry {
                        event: entry.event,
                        all_day: entry.resolved.all_day,
                        minutes: if entry.resolved.all_day {
                            None
                        } else {
                            span_on_date(&entry.resolved, day.date, timezone)
                        },
                        is_start: first == day.date,
                        is_end: last == day.date,
                    }
                })
                .collect();

            (!listed.is_empty()).then(|| ListDay {
                date: day.date,
                entries: listed,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttBar<'a> {
    pub event: &'a Event,
    pub row: usize,
    pub bar: BarGeometry,
    pub clipped_start: bool,
    pub clipped_end: bool,
}

#[tracing::instrument(skip(events, window, viewer), fields(events = events.len(), days = window.len()))]
pub fn layout_gantt<'a>(
    events: &'a [Event],
    window: &ViewWindow,
    viewer: &Viewer<'_>,
) -> Vec<GanttBar<'a>> {
    let (Some(window_start), Some(window_end)) = (window.start_instant(), window.end_instant())
    else {
        return Vec::new();
    };

    let total_seconds = (window_end - window_start).num_seconds();
    let min_seconds = ((total_seconds as f64) * MIN_BAR_WIDTH_PCT / 100.0).ceil() as i64;

    let mut visible: Vec<(Entry<'a>, i64, i64)> = resolve_all(events, viewer)
        .into_iter()
        .filter(|entry| {
            let resolved = &entry.resolved;
            resolved.start < window_end
                && (resolved.end > window_start
                    || (resolved.is_point() && resolved.start >= window_start))
        })
        .map(|entry| {
            let start = (entry.resolved.start.max(window_start) - window_start).num_seconds();
            let end = (entry.resolved.end.min(window_end) - window_start).num_seconds();
            (entry, start, end.max(start + min_seconds))
        })
        .collect();

    visible.sort_by(|(_, a_start, a_end), (_, b_start, b_end)| {
        a_start
            .cmp(b_start)
            .then_with(|| (b_end - b_start).cmp(&(a_end - a_start)))
    });

    let mut packer = RowPacker::new();
    visible
        .into_iter()
        .map(|(entry, start, end)| GanttBar {
            event: entry.event,
            row: packer.place(start, end),
            bar: timeline_bar(start, end - start, total_seconds),
            clipped_start: entry.resolved.start < window_start,
            clipped_end: entry.resolved.end > window_end,
        })
        .collect()
}
