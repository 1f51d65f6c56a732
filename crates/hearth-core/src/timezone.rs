use anyhow::anyhow;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::model::{
  Calendar,
  Event
};

pub const MINUTES_PER_DAY: u32 = 1440;

const NAIVE_FORMATS: [&str; 4] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M"
];

const GAP_SEARCH_MINUTES: i64 =
  24 * 60;

#[derive(Debug, Clone, Copy)]
pub struct Viewer<'a> {
  pub timezone:  Tz,
  pub calendars: &'a [Calendar],
  pub now:       DateTime<Utc>
}

impl<'a> Viewer<'a> {
  pub fn new(
    timezone: Tz,
    calendars: &'a [Calendar],
    now: DateTime<Utc>
  ) -> Self {
    Self {
      timezone,
      calendars,
      now
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct ZonedParts {
  pub year:   i32,
  pub month:  u32,
  pub day:    u32,
  pub hour:   u32,
  pub minute: u32
}

impl ZonedParts {
  #[must_use]
  pub fn minute_of_day(&self) -> u32 {
    self.hour * 60 + self.minute
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "camelCase")]
pub struct MinuteSpan {
  pub start_minute: u32,
  pub end_minute:   u32
}

impl MinuteSpan {
  #[must_use]
  pub fn new(
    start_minute: u32,
    end_minute: u32
  ) -> Self {
    Self {
      start_minute,
      end_minute
    }
  }

  #[must_use]
  pub fn duration(&self) -> u32 {
    self
      .end_minute
      .saturating_sub(self.start_minute)
  }

  #[must_use]
  pub fn overlaps(
    &self,
    other: &MinuteSpan
  ) -> bool {
    self.start_minute
      < other.end_minute
      && other.start_minute
        < self.end_minute
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedEvent {
  pub timezone: Tz,
  pub start:    DateTime<Utc>,
  pub end:      DateTime<Utc>,
  pub all_day:  bool
}

impl ResolvedEvent {
  #[must_use]
  pub fn is_point(&self) -> bool {
    self.start == self.end
  }

  /// Last instant the event still
  /// occupies. Ends are exclusive, so
  /// a ranged event gives up its final
  /// millisecond; an all-day event
  /// stored as `[d, d+1)` stays on `d`.
  #[must_use]
  pub fn last_instant(
    &self
  ) -> DateTime<Utc> {
    if self.is_point() {
      return self.end;
    }
    (self.end
      - Duration::milliseconds(1))
    .max(self.start)
  }

  #[must_use]
  pub fn viewer_dates(
    &self,
    timezone: Tz
  ) -> (NaiveDate, NaiveDate) {
    (
      zoned_date(self.start, timezone),
      zoned_date(
        self.last_instant(),
        timezone
      )
    )
  }

  #[must_use]
  pub fn touches_date(
    &self,
    date: NaiveDate,
    timezone: Tz
  ) -> bool {
    let (first, last) =
      self.viewer_dates(timezone);
    first <= date && date <= last
  }

  #[must_use]
  pub fn spans_multiple_days(
    &self,
    timezone: Tz
  ) -> bool {
    let (first, last) =
      self.viewer_dates(timezone);
    first != last
  }
}

/// Picks the timezone an event's naive
/// timestamps are written in. The first
/// non-empty source wins; a source that
/// names an unknown zone falls back to
/// `fallback` rather than to the next
/// source.
#[must_use]
pub fn resolve_event_timezone(
  event: &Event,
  calendars: &[Calendar],
  fallback: Tz
) -> Tz {
  let calendar_timezone = event
    .google_calendar_id
    .as_deref()
    .and_then(|calendar_id| {
      calendars.iter().find(|calendar| {
        calendar.id == calendar_id
      })
    })
    .and_then(|calendar| {
      calendar.timezone.as_deref()
    });

  let candidates = [
    ("event.timezone", event.timezone.as_deref()),
    (
      "metadata.timezone",
      event.metadata.timezone.as_deref()
    ),
    (
      "metadata.departure_timezone",
      event
        .metadata
        .departure_timezone
        .as_deref()
    ),
    ("calendar.timezone", calendar_timezone)
  ];

  let chosen =
    candidates.into_iter().find_map(
      |(source, raw)| {
        raw
          .filter(|raw| {
            !raw.trim().is_empty()
          })
          .map(|raw| (source, raw))
      }
    );

  let Some((source, raw)) = chosen else {
    return fallback;
  };

  parse_timezone(raw, source)
    .unwrap_or_else(|| {
      tracing::warn!(
        event = %event.id,
        source,
        timezone = %raw,
        fallback = %fallback,
        "unknown event timezone; using viewer timezone"
      );
      fallback
    })
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

pub fn parse_naive_timestamp(
  raw: &str
) -> anyhow::Result<NaiveDateTime> {
  let token = raw.trim();

  for fmt in NAIVE_FORMATS {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return date
      .and_hms_opt(0, 0, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct \
           midnight for {token}"
        )
      });
  }

  Err(anyhow!(
    "unrecognized naive timestamp: \
     {raw:?}"
  ))
}

#[tracing::instrument(level = "trace")]
pub fn to_instant(
  naive: &str,
  timezone: Tz
) -> anyhow::Result<DateTime<Utc>> {
  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      naive.trim()
    )
  {
    return Ok(dt.with_timezone(&Utc));
  }

  let local =
    parse_naive_timestamp(naive)?;
  Ok(localize(local, timezone))
}

/// Wall-clock to instant. Ambiguous
/// times take the earlier candidate;
/// times inside a gap move forward to
/// the first minute that exists.
#[must_use]
pub fn localize(
  local: NaiveDateTime,
  timezone: Tz
) -> DateTime<Utc> {
  match timezone
    .from_local_datetime(&local)
  {
    | LocalResult::Single(dt) => {
      dt.with_timezone(&Utc)
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        %local,
        %timezone,
        "ambiguous local datetime; using earliest"
      );
      first.min(second).with_timezone(&Utc)
    }
    | LocalResult::None => {
      resolve_gap(local, timezone)
    }
  }
}

fn resolve_gap(
  local: NaiveDateTime,
  timezone: Tz
) -> DateTime<Utc> {
  let floor = local
    .with_second(0)
    .and_then(|ndt| {
      ndt.with_nanosecond(0)
    })
    .unwrap_or(local);

  for step in 1..=GAP_SEARCH_MINUTES {
    let candidate = floor
      + Duration::minutes(step);
    if let Some(dt) = timezone
      .from_local_datetime(&candidate)
      .earliest()
    {
      tracing::warn!(
        %local,
        %timezone,
        resolved = %dt,
        "local datetime does not exist; moved forward"
      );
      return dt.with_timezone(&Utc);
    }
  }

  tracing::error!(
    %local,
    %timezone,
    "no valid local time found after gap; reading as UTC"
  );
  local.and_utc()
}

#[must_use]
pub fn zoned_parts(
  instant: DateTime<Utc>,
  timezone: Tz
) -> ZonedParts {
  let local =
    instant.with_timezone(&timezone);
  ZonedParts {
    year:   local.year(),
    month:  local.month(),
    day:    local.day(),
    hour:   local.hour(),
    minute: local.minute()
  }
}

#[must_use]
pub fn zoned_date(
  instant: DateTime<Utc>,
  timezone: Tz
) -> NaiveDate {
  instant
    .with_timezone(&timezone)
    .date_naive()
}

/// Settles the timezone and both
/// boundaries of `event`. Bad
/// boundaries borrow the other one, or
/// `viewer.now` when both are bad; the
/// event is never dropped.
#[must_use]
pub fn resolve_event(
  event: &Event,
  viewer: &Viewer<'_>
) -> ResolvedEvent {
  let timezone = resolve_event_timezone(
    event,
    viewer.calendars,
    viewer.timezone
  );

  let start = boundary_instant(
    event,
    "startTime",
    &event.start_time,
    timezone
  );
  let end = boundary_instant(
    event,
    "endTime",
    &event.end_time,
    timezone
  );

  let (start, end) = match (start, end)
  {
    | (Some(start), Some(end)) => {
      if end < start {
        tracing::warn!(
          event = %event.id,
          %start,
          %end,
          "event ends before it starts; treating as point in time"
        );
      }
      (start, end.max(start))
    }
    | (Some(start), None) => {
      (start, start)
    }
    | (None, Some(end)) => (end, end),
    | (None, None) => {
      tracing::warn!(
        event = %event.id,
        now = %viewer.now,
        "event has no usable timestamps; placing at now"
      );
      (viewer.now, viewer.now)
    }
  };

  ResolvedEvent {
    timezone,
    start,
    end,
    all_day: event.all_day
  }
}

fn boundary_instant(
  event: &Event,
  field: &str,
  raw: &str,
  timezone: Tz
) -> Option<DateTime<Utc>> {
  if raw.trim().is_empty() {
    return None;
  }

  match to_instant(raw, timezone) {
    | Ok(instant) => Some(instant),
    | Err(err) => {
      tracing::warn!(
        event = %event.id,
        field,
        error = %err,
        "unparseable event timestamp"
      );
      None
    }
  }
}

#[must_use]
pub fn is_event_on_day(
  event: &Event,
  day: DateTime<Utc>,
  viewer: &Viewer<'_>
) -> bool {
  let resolved =
    resolve_event(event, viewer);
  resolved.touches_date(
    zoned_date(day, viewer.timezone),
    viewer.timezone
  )
}

#[must_use]
pub fn minutes_of_day(
  event: &Event,
  day: DateTime<Utc>,
  viewer: &Viewer<'_>
) -> Option<MinuteSpan> {
  let resolved =
    resolve_event(event, viewer);
  span_on_date(
    &resolved,
    zoned_date(day, viewer.timezone),
    viewer.timezone
  )
}

#[must_use]
pub fn span_on_date(
  resolved: &ResolvedEvent,
  date: NaiveDate,
  timezone: Tz
) -> Option<MinuteSpan> {
  let (start_date, end_date) =
    resolved.viewer_dates(timezone);
  if start_date > date || end_date < date
  {
    return None;
  }

  let start_minute = if start_date < date
  {
    0
  } else {
    zoned_parts(resolved.start, timezone)
      .minute_of_day()
  }
  .min(MINUTES_PER_DAY - 1);

  if resolved.is_point() {
    return Some(MinuteSpan::new(
      start_minute,
      start_minute + 1
    ));
  }

  let end_minute = if end_date > date {
    MINUTES_PER_DAY
  } else {
    end_minute_ceil(
      resolved.end,
      date,
      timezone
    )
  };

  Some(MinuteSpan::new(
    start_minute,
    end_minute
      .max(start_minute + 1)
      .min(MINUTES_PER_DAY)
  ))
}

fn end_minute_ceil(
  end: DateTime<Utc>,
  date: NaiveDate,
  timezone: Tz
) -> u32 {
  let local = end.with_timezone(&timezone);
  if local.date_naive() > date {
    return MINUTES_PER_DAY;
  }
  let partial = local.second() > 0
    || local.nanosecond() > 0;
  zoned_parts(end, timezone)
    .minute_of_day()
    + u32::from(partial)
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };
  use chrono_tz::Tz;

  use super::{
    MinuteSpan,
    Viewer,
    is_event_on_day,
    minutes_of_day,
    resolve_event,
    resolve_event_timezone,
    to_instant,
    zoned_parts
  };
  use crate::model::{
    Calendar,
    Event
  };

  fn tz(name: &str) -> Tz {
    name.parse().expect("valid tz")
  }

  fn now() -> chrono::DateTime<Utc> {
    Utc
      .with_ymd_and_hms(
        2024, 3, 1, 12, 0, 0
      )
      .single()
      .expect("valid now")
  }

  fn midnight(
    y: i32,
    m: u32,
    d: u32,
    zone: Tz
  ) -> chrono::DateTime<Utc> {
    let date =
      NaiveDate::from_ymd_opt(y, m, d)
        .expect("valid date");
    super::localize(
      date
        .and_hms_opt(0, 0, 0)
        .expect("midnight"),
      zone
    )
  }

  #[test]
  fn resolution_order_prefers_event_then_metadata_then_calendar()
   {
    let calendars = vec![Calendar {
      id: "family".to_string(),
      timezone: Some(
        "America/Chicago".to_string()
      ),
      ..Calendar::default()
    }];
    let fallback = tz("Europe/Paris");

    let mut event = Event::new(
      "a",
      "2024-03-01T09:00:00",
      "2024-03-01T10:00:00"
    )
    .with_calendar("family");
    assert_eq!(
      resolve_event_timezone(
        &event, &calendars, fallback
      ),
      tz("America/Chicago")
    );

    event.metadata.departure_timezone =
      Some("Asia/Tokyo".to_string());
    assert_eq!(
      resolve_event_timezone(
        &event, &calendars, fallback
      ),
      tz("Asia/Tokyo")
    );

    event.metadata.timezone =
      Some("Europe/London".to_string());
    assert_eq!(
      resolve_event_timezone(
        &event, &calendars, fallback
      ),
      tz("Europe/London")
    );

    event.timezone = Some(
      "America/Denver".to_string()
    );
    assert_eq!(
      resolve_event_timezone(
        &event, &calendars, fallback
      ),
      tz("America/Denver")
    );
  }

  #[test]
  fn blank_and_unknown_timezones_fall_back()
  {
    let fallback = tz("Asia/Tokyo");
    let blank = Event::new(
      "a",
      "2024-03-01T09:00:00",
      ""
    )
    .with_timezone("   ");
    assert_eq!(
      resolve_event_timezone(
        &blank, &[], fallback
      ),
      fallback
    );

    let unknown = Event::new(
      "b",
      "2024-03-01T09:00:00",
      ""
    )
    .with_timezone("Mars/Olympus");
    assert_eq!(
      resolve_event_timezone(
        &unknown, &[], fallback
      ),
      fallback
    );

    let missing_calendar = Event::new(
      "c",
      "2024-03-01T09:00:00",
      ""
    )
    .with_calendar("nope");
    assert_eq!(
      resolve_event_timezone(
        &missing_calendar,
        &[],
        fallback
      ),
      fallback
    );
  }

  #[test]
  fn round_trips_wall_clock_fields() {
    for zone in [
      "America/Los_Angeles",
      "Asia/Kolkata",
      "Australia/Lord_Howe",
      "UTC"
    ] {
      let zone = tz(zone);
      let instant = to_instant(
        "2024-07-14T18:45:00",
        zone
      )
      .expect("instant");
      let parts =
        zoned_parts(instant, zone);
      assert_eq!(
        (
          parts.year,
          parts.month,
          parts.day,
          parts.hour,
          parts.minute
        ),
        (2024, 7, 14, 18, 45)
      );
    }
  }

  #[test]
  fn nonexistent_time_moves_forward() {
    let zone = tz("America/New_York");
    let instant = to_instant(
      "2024-03-10T02:30:00",
      zone
    )
    .expect("instant");
    let parts = zoned_parts(instant, zone);
    assert_eq!(
      (parts.hour, parts.minute),
      (3, 0)
    );
  }

  #[test]
  fn ambiguous_time_takes_earlier_instant()
  {
    let zone = tz("America/New_York");
    let instant = to_instant(
      "2024-11-03T01:30:00",
      zone
    )
    .expect("instant");
    assert_eq!(
      instant,
      Utc
        .with_ymd_and_hms(
          2024, 11, 3, 5, 30, 0
        )
        .single()
        .expect("utc")
    );
  }

  #[test]
  fn offset_strings_are_taken_at_face_value()
  {
    let instant = to_instant(
      "2024-03-01T10:00:00Z",
      tz("Asia/Tokyo")
    )
    .expect("instant");
    assert_eq!(
      instant,
      Utc
        .with_ymd_and_hms(
          2024, 3, 1, 10, 0, 0
        )
        .single()
        .expect("utc")
    );
    assert!(
      to_instant(
        "next tuesday",
        tz("UTC")
      )
      .is_err()
    );
  }

  #[test]
  fn day_shifts_into_viewer_timezone() {
    let event = Event::new(
      "red-eye",
      "2024-03-01T23:30:00",
      "2024-03-01T23:30:00"
    )
    .with_timezone("America/Los_Angeles");
    let tokyo = tz("Asia/Tokyo");
    let viewer =
      Viewer::new(tokyo, &[], now());

    assert!(is_event_on_day(
      &event,
      midnight(2024, 3, 2, tokyo),
      &viewer
    ));
    assert!(!is_event_on_day(
      &event,
      midnight(2024, 3, 1, tokyo),
      &viewer
    ));
  }

  #[test]
  fn all_day_end_is_exclusive() {
    let event = Event::all_day(
      "holiday",
      "2024-03-04T00:00:00",
      "2024-03-06T00:00:00"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());

    assert!(is_event_on_day(
      &event,
      midnight(2024, 3, 5, utc),
      &viewer
    ));
    assert!(!is_event_on_day(
      &event,
      midnight(2024, 3, 6, utc),
      &viewer
    ));
  }

  #[test]
  fn minutes_clamp_across_midnight() {
    let event = Event::new(
      "party",
      "2024-03-01T22:00:00",
      "2024-03-02T02:00:00"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());

    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 1, utc),
        &viewer
      ),
      Some(MinuteSpan::new(1320, 1440))
    );
    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 2, utc),
        &viewer
      ),
      Some(MinuteSpan::new(0, 120))
    );
    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 3, utc),
        &viewer
      ),
      None
    );
  }

  #[test]
  fn event_ending_at_midnight_stays_on_its_day()
  {
    let event = Event::new(
      "late",
      "2024-03-01T23:00:00",
      "2024-03-02T00:00:00"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());

    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 2, utc),
        &viewer
      ),
      None
    );
    assert!(!is_event_on_day(
      &event,
      midnight(2024, 3, 2, utc),
      &viewer
    ));
  }

  #[test]
  fn seconds_past_midnight_agree_with_day_membership()
  {
    let event = Event::new(
      "overrun",
      "2024-03-01T23:00:00",
      "2024-03-02T00:00:30"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());
    let march_second =
      midnight(2024, 3, 2, utc);

    assert!(is_event_on_day(
      &event,
      march_second,
      &viewer
    ));
    assert_eq!(
      minutes_of_day(
        &event,
        march_second,
        &viewer
      ),
      Some(MinuteSpan::new(0, 1))
    );
    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 1, utc),
        &viewer
      ),
      Some(MinuteSpan::new(1380, 1440))
    );
  }

  #[test]
  fn partial_minute_end_rounds_up() {
    let event = Event::new(
      "call",
      "2024-03-01T09:00:00",
      "2024-03-01T09:45:10"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());

    assert_eq!(
      minutes_of_day(
        &event,
        midnight(2024, 3, 1, utc),
        &viewer
      ),
      Some(MinuteSpan::new(540, 586))
    );
  }

  #[test]
  fn point_event_gets_a_visible_minute() {
    let event = Event::new(
      "reminder",
      "2024-03-01T23:59:00",
      "2024-03-01T23:59:00"
    );
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());
    let span = minutes_of_day(
      &event,
      midnight(2024, 3, 1, utc),
      &viewer
    )
    .expect("on day");

    assert!(span.duration() >= 1);
    assert_eq!(span.end_minute, 1440);
  }

  #[test]
  fn bad_timestamps_still_resolve() {
    let utc = tz("UTC");
    let viewer = Viewer::new(utc, &[], now());

    let half = Event::new(
      "half",
      "garbage",
      "2024-03-01T10:00:00"
    );
    let resolved =
      resolve_event(&half, &viewer);
    assert!(resolved.is_point());
    assert_eq!(
      zoned_parts(resolved.start, utc)
        .hour,
      10
    );

    let none =
      Event::new("none", "???", "");
    let resolved =
      resolve_event(&none, &viewer);
    assert_eq!(resolved.start, now());
  }

  #[test]
  fn reversed_boundaries_collapse_to_start()
  {
    let event = Event::new(
      "backwards",
      "2024-03-01T10:00:00",
      "2024-03-01T09:00:00"
    );
    let viewer =
      Viewer::new(tz("UTC"), &[], now());
    let resolved =
      resolve_event(&event, &viewer);
    assert_eq!(resolved.start, resolved.end);
  }
}
