//! Data models shared by every scraper.
//!
//! - [`Station`]: immutable station description, shared as `Arc<Station>`
//! - [`TimeUrl`]: anchor instant + fetchable location + owning station
//! - [`CalendarItem`]: one element of a JSON calendar feed
//! - [`Broadcast`]: the terminal schedule record
//!
//! Optional [`Broadcast`] fields serialize as absent, never as empty strings.

use chrono::{DateTime, Duration, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// How a station publishes its program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StationKind {
    /// JSON `calendarItems` endpoint queried per time range, detail page per item.
    CalendarItems,
    /// One HTML table per day holding every broadcast.
    DayTable,
    /// Program calendar page linking day pages, which link detail pages.
    ScheduleIndex,
}

/// Parameters of the time-range query of [`StationKind::CalendarItems`] stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeParams {
    /// Offset added to the anchor to get `from`.
    pub lead: Duration,
    /// Distance between `from` and `to`.
    pub width: Duration,
    /// Row limit passed to the endpoint.
    pub rows: u32,
}

impl Default for RangeParams {
    fn default() -> Self {
        Self {
            lead: Duration::minutes(1),
            width: Duration::hours(1),
            rows: 800,
        }
    }
}

/// A radio station.
///
/// Constructed once by the [`Registry`](crate::config::Registry), which
/// guarantees a non-empty `identifier`.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub identifier: String,
    pub name: String,
    /// Local time-of-day at which the broadcast day starts, `HH:MM`.
    pub close_down: String,
    pub program_url: Url,
    pub time_zone: Tz,
    pub kind: StationKind,
    pub calendar_url: Option<Url>,
    /// strftime template of a day page URL, e.g. `...html?drbm:date=%d.%m.%Y`.
    pub day_url: Option<String>,
    pub language: String,
    pub publisher: Option<String>,
    pub range: RangeParams,
}

impl Station {
    /// Close-down as a time of day. Validated at registry construction.
    pub fn close_down_time(&self) -> NaiveTime {
        NaiveTime::parse_from_str(&self.close_down, "%H:%M").unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Station '{}'", self.name)
    }
}

/// An anchor instant, a location to fetch, and the station it belongs to.
#[derive(Debug, Clone)]
pub struct TimeUrl {
    pub time: DateTime<Tz>,
    pub source: Url,
    pub station: Arc<Station>,
}

impl fmt::Display for TimeUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.station.identifier,
            self.time.format("%Y-%m-%dT%H:%M"),
            self.source
        )
    }
}

/// One element of a JSON calendar feed: `{ "datetime": ..., "html": ... }`.
#[derive(Debug, Clone)]
pub struct CalendarItem {
    pub datetime: DateTime<Tz>,
    pub html: String,
    pub station: Arc<Station>,
}

/// Wire shape of a [`CalendarItem`] before it is localized.
#[derive(Debug, Deserialize)]
pub(crate) struct RawCalendarItem {
    pub datetime: String,
    pub html: String,
}

/// A single scheduled broadcast.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    #[serde(serialize_with = "station_identifier")]
    pub station: Arc<Station>,
    pub source: Url,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_episode: Option<String>,
    pub time: DateTime<Tz>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt_end: Option<DateTime<Tz>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Tz>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
}

fn station_identifier<S: Serializer>(station: &Arc<Station>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&station.identifier)
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.station.identifier,
            self.time.format("%Y-%m-%d %H:%M"),
            self.title
        )
    }
}
