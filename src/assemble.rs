//! Broadcast assembly.
//!
//! Scrapers fill a [`BroadcastDraft`] field by field as extraction finds
//! values, then call [`BroadcastDraft::finish`] which applies station defaults
//! and checks the required fields.

use crate::dates;
use crate::error::ScrapeError;
use crate::models::{Broadcast, Station, StationKind, TimeUrl};
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// A broadcast under construction. Every field may still be missing.
#[derive(Debug, Clone)]
pub struct BroadcastDraft {
    pub station: Arc<Station>,
    pub source: Option<Url>,
    pub title: Option<String>,
    pub title_series: Option<String>,
    pub title_episode: Option<String>,
    pub time: Option<DateTime<Tz>>,
    pub dt_end: Option<DateTime<Tz>>,
    pub subject: Option<Url>,
    pub modified: Option<DateTime<Tz>>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub image: Option<Url>,
    pub language: Option<String>,
    pub publisher: Option<String>,
    pub creator: Option<String>,
    pub copyright: Option<String>,
}

impl BroadcastDraft {
    pub fn new(station: Arc<Station>) -> Self {
        Self {
            station,
            source: None,
            title: None,
            title_series: None,
            title_episode: None,
            time: None,
            dt_end: None,
            subject: None,
            modified: None,
            author: None,
            description: None,
            image: None,
            language: None,
            publisher: None,
            creator: None,
            copyright: None,
        }
    }

    /// Draft seeded with time, source and station of `tu`.
    pub fn from_time_url(tu: &TimeUrl) -> Self {
        let mut draft = Self::new(Arc::clone(&tu.station));
        draft.time = Some(tu.time);
        draft.source = Some(tu.source.clone());
        draft
    }

    /// Validate and turn into a [`Broadcast`].
    ///
    /// # Errors
    ///
    /// [`ScrapeError::IncompleteBroadcast`] if source, time or a non-blank
    /// title is missing.
    pub fn finish(self) -> Result<Broadcast, ScrapeError> {
        debug_assert!(
            !self.station.identifier.is_empty(),
            "broadcast without station identifier"
        );
        let hint = self
            .source
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| self.station.identifier.clone());
        let missing = |field: &'static str| ScrapeError::IncompleteBroadcast {
            field,
            source_hint: hint.clone(),
        };

        let source = self.source.ok_or_else(|| missing("source"))?;
        let time = self.time.ok_or_else(|| missing("time"))?;
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| missing("title"))?;

        let dt_end = match self.dt_end {
            Some(end) if end <= time => {
                warn!(%source, %time, %end, "end not after start; leaving end unset");
                None
            }
            other => other,
        };

        let title_series = match self.station.kind {
            // this feed distinguishes "no series" from an empty one
            StationKind::CalendarItems => self.title_series,
            _ => self.title_series.filter(|s| !s.is_empty()),
        };

        let language = self
            .language
            .unwrap_or_else(|| self.station.language.clone());
        let publisher = self.publisher.or_else(|| self.station.publisher.clone());

        Ok(Broadcast {
            station: self.station,
            source,
            title,
            title_series,
            title_episode: self.title_episode,
            time,
            dt_end,
            subject: self.subject,
            modified: self.modified,
            author: self.author,
            description: self.description,
            image: self.image,
            language,
            publisher,
            creator: self.creator,
            copyright: self.copyright,
        })
    }
}

/// Back-fill end times of one day's drafts in document order: each ends when
/// the next one starts, the last one at `day_end` (usually the following
/// midnight). Drafts that already have an end keep it.
pub fn fill_end_times(drafts: &mut [BroadcastDraft], day_end: Option<DateTime<Tz>>) {
    let starts: Vec<Option<DateTime<Tz>>> = drafts.iter().map(|d| d.time).collect();
    for (i, draft) in drafts.iter_mut().enumerate() {
        if draft.dt_end.is_some() {
            continue;
        }
        draft.dt_end = match starts.get(i + 1) {
            Some(next) => *next,
            None => day_end,
        };
    }
}

/// Following midnight of the calendar day of `t`, in its own zone.
pub fn midnight_after(t: &DateTime<Tz>) -> Result<DateTime<Tz>, ScrapeError> {
    dates::following_midnight(&t.timezone(), t.date_naive())
}
