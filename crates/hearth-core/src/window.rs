use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::timezone::localize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Day,
    Week,
    Month,
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowDay {
    pub date: NaiveDate,
    pub midnight: DateTime<Utc>,
}

impl WindowDay {
    pub fn new(date: NaiveDate, timezone: Tz) -> Self {
        Self {
            date,
            midnight: localize(date.and_time(NaiveTime::MIN), timezone),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewWindow {
    kind: WindowKind,
    timezone: Tz,
    days: Vec<WindowDay>,
}

impl ViewWindow {
    pub fn day(date: NaiveDate, timezone: Tz) -> Self {
        Self::build(WindowKind::Day, date, 1, timezone)
    }

    pub fn week(focus: NaiveDate, week_start: Weekday, timezone: Tz) -> Self {
        Self::build(WindowKind::Week, start_of_week(focus, week_start), 7, timezone)
    }

    /// The weeks of a month grid that contain at least one day of `focus`'s
    /// month: four to six rows.
    pub fn month(focus: NaiveDate, week_start: Weekday, timezone: Tz) -> Self {
        let first = first_day_of_month(focus);
        let last = last_day_of_month(focus);
        let grid_start = start_of_week(first, week_start);

        let weeks = (0_i64..6)
            .map(|row| add_days(grid_start, row * 7))
            .filter(|week_start_day| *week_start_day <= last)
            .count();

        Self::build(WindowKind::Month, grid_start, weeks * 7, timezone)
    }

    pub fn range(start: NaiveDate, days: usize, timezone: Tz) -> Self {
        Self::build(WindowKind::Range, start, days, timezone)
    }

    pub fn calendar_month(focus: NaiveDate, timezone: Tz) -> Self {
        let first = first_day_of_month(focus);
        let days = last_day_of_month(focus).day() as usize;
        Self::range(first, days, timezone)
    }

    fn build(kind: WindowKind, start: NaiveDate, days: usize, timezone: Tz) -> Self {
        let days = (0..days)
            .map(|offset| WindowDay::new(add_days(start, offset as i64), timezone))
            .collect();
        Self {
            kind,
            timezone,
            days,
        }
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn days(&self) -> &[WindowDay] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.days.first().map(|day| day.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.days.last().map(|day| day.date)
    }

    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.days.first().map(|day| day.midnight)
    }

    pub fn end_instant(&self) -> Option<DateTime<Utc>> {
        self.last_date()
            .map(|last| WindowDay::new(add_days(last, 1), self.timezone).midnight)
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let first = self.first_date()?;
        let offset = (date - first).num_days();
        usize::try_from(offset)
            .ok()
            .filter(|idx| *idx < self.days.len())
    }

    pub fn weeks(&self) -> Vec<ViewWindow> {
        self.days
            .chunks(7)
            .map(|chunk| ViewWindow {
                kind: WindowKind::Week,
                timezone: self.timezone,
                days: chunk.to_vec(),
            })
            .collect()
    }
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days))
        .unwrap_or(date)
}

pub fn start_of_week(day: NaiveDate, week_start: Weekday) -> NaiveDate {
    let day_idx = day.weekday().num_days_from_monday() as i64;
    let start_idx = week_start.num_days_from_monday() as i64;
    let diff = (7 + day_idx - start_idx) % 7;
    add_days(day, -diff)
}

pub fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = first_day_of_month(date);
    let next_month = first
        .checked_add_months(chrono::Months::new(1))
        .unwrap_or(first);
    add_days(next_month, -1)
}

pub fn parse_week_start(raw: &str) -> Option<Weekday> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "sunday" | "sun" => Some(Weekday::Sun),
        "saturday" | "sat" => Some(Weekday::Sat),
        _ => None,
    }
}
