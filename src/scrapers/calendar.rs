//! JSON calendar feeds queried per time range.
//!
//! The endpoint answers
//! `calendarItems.jsp?rows=800&from=2015-11-30T05:01:00&to=2015-11-30T06:01:00`
//! with an array of `{ "datetime": "...", "html": "<li>...</li>" }`. Each
//! element becomes an [`ItemJob`] seeded with time, detail link and image.
//! Elements are decoded one by one so a broken element drops only itself.

use super::broadcast_page::{ItemJob, is_detail_link};
use super::{Job, ScrapeContext, Scraped, Scraper};
use crate::dates;
use crate::error::ScrapeError;
use crate::extract::{attr, find_last, is_tag};
use crate::fetch::Fetch;
use crate::models::{CalendarItem, RawCalendarItem, Station, TimeUrl};
use crate::utils::truncate_for_log;
use chrono::DateTime;
use chrono_tz::Tz;
use scraper::Html;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// One time range of a calendar feed.
#[derive(Debug, Clone)]
pub struct RangeJob(pub TimeUrl);

impl RangeJob {
    /// Range starting `lead` after `anchor` and `width` long.
    pub fn for_anchor(station: &Arc<Station>, anchor: DateTime<Tz>) -> Result<Self, ScrapeError> {
        let base = station
            .calendar_url
            .as_ref()
            .ok_or_else(|| ScrapeError::config(format!("{}: no calendar_url", station.identifier)))?;
        let from = anchor + station.range.lead;
        let to = from + station.range.width;
        let raw = format!(
            "{}?rows={}&from={}&to={}",
            base,
            station.range.rows,
            dates::format_local_timestamp(&from),
            dates::format_local_timestamp(&to)
        );
        let source = Url::parse(&raw).map_err(|e| ScrapeError::config(format!("{}: {}", raw, e)))?;
        Ok(RangeJob(TimeUrl {
            time: from,
            source,
            station: Arc::clone(station),
        }))
    }

    /// Decode the feed. A body that is not a JSON array fails the whole range;
    /// a malformed element is reported and skipped.
    pub fn parse_items(&self, body: &str) -> Result<(Vec<CalendarItem>, Vec<ScrapeError>), ScrapeError> {
        let values: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| ScrapeError::Parse {
            what: self.0.source.to_string(),
            message: format!("{} in {}", e, truncate_for_log(body, 120)),
        })?;
        let tz = self.0.station.time_zone;
        let mut items = Vec::with_capacity(values.len());
        let mut errors = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let raw: RawCalendarItem = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    errors.push(ScrapeError::Parse {
                        what: format!("calendar item #{}", i),
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            match dates::parse_local_timestamp(&tz, &raw.datetime) {
                Ok(datetime) => items.push(CalendarItem {
                    datetime,
                    html: raw.html,
                    station: Arc::clone(&self.0.station),
                }),
                Err(e) => errors.push(e),
            }
        }
        Ok((items, errors))
    }
}

impl CalendarItem {
    /// Detail page job from the embedded markup. The last detail link and the
    /// last image win.
    pub fn seed(&self) -> Result<ItemJob, ScrapeError> {
        let fragment = Html::parse_fragment(&self.html);
        let root = fragment.root_element();
        let base = &self.station.program_url;

        let link = find_last(root, |e| is_tag(e, "a") && is_detail_link(attr(e, "href")));
        let source = link
            .and_then(|a| base.join(attr(&a, "href")).ok())
            .ok_or_else(|| ScrapeError::IncompleteBroadcast {
                field: "source",
                source_hint: format!("calendar item {}", self.datetime),
            })?;
        let image = find_last(root, |e| is_tag(e, "img"))
            .map(|img| attr(&img, "src"))
            .filter(|src| !src.is_empty())
            .and_then(|src| base.join(src).ok());

        Ok(ItemJob {
            time_url: TimeUrl {
                time: self.datetime,
                source,
                station: Arc::clone(&self.station),
            },
            title: None,
            image,
            dt_end: None,
        })
    }
}

impl Scraper for RangeJob {
    #[instrument(level = "info", skip_all, fields(source = %self.0.source))]
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
        let mut out = Scraped::default();
        let fetched = ctx.get(&self.0.source, &mut out.bytes).await?;
        let (items, errors) = self.parse_items(&fetched.body)?;
        out.errors = errors;
        for item in &items {
            match item.seed() {
                Ok(job) => out.jobs.push(Job::Item(job)),
                Err(e) => {
                    warn!(error = %e, time = %item.datetime, "Dropping calendar item");
                    out.errors.push(e);
                }
            }
        }
        info!(items = items.len(), jobs = out.jobs.len(), "Parsed calendar items");
        Ok(out)
    }
}
