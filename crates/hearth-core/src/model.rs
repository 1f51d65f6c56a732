use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub start_time: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub end_time: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub all_day: bool,

    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: EventMetadata,

    #[serde(default)]
    pub google_calendar_id: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    #[serde(default)]
    pub timezone: Option<String>,

    /// Written by older travel entries before events carried their own zone.
    #[serde(default)]
    pub departure_timezone: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventFeed {
    #[serde(default, deserialize_with = "null_as_default")]
    pub events: Vec<Event>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub calendars: Vec<Calendar>,
}

/// Backend rows send `null` for blank fields; read those as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Event {
    pub fn new(id: impl Into<String>, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            ..Self::default()
        }
    }

    pub fn all_day(id: impl Into<String>, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            all_day: true,
            ..Self::new(id, start_time, end_time)
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    #[must_use]
    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.google_calendar_id = Some(calendar_id.into());
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

impl EventFeed {
    #[tracing::instrument]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let feed: EventFeed = serde_json::from_str(&raw)
            .with_context(|| format!("invalid event feed json in {}", path.display()))?;
        tracing::debug!(
            events = feed.events.len(),
            calendars = feed.calendars.len(),
            "loaded event feed"
        );
        Ok(feed)
    }
}
