//! Jobs of the crawl graph.
//!
//! Every unit of work implements [`Scraper`]: `scrape` fetches one document
//! and returns child jobs and/or finished broadcasts, `matches` says whether
//! the job is relevant for the current anchors. [`Job`] is the closed set of
//! variants the runner schedules.
//!
//! | Variant | Module | Produces |
//! |---------|--------|----------|
//! | [`Job::Station`] | [`station`] | range or day jobs for the crawl window |
//! | [`Job::Range`] | [`calendar`] | item jobs from a JSON calendar feed |
//! | [`Job::Day`] | [`day_table`] / [`schedule`] | broadcasts, or item jobs |
//! | [`Job::Item`] | [`broadcast_page`] | one broadcast from its detail page |
//!
//! A job may succeed partially: item-level failures go to
//! [`Scraped::errors`] while the rest of the batch is still returned.

use crate::error::ScrapeError;
use crate::fetch::{Fetch, Fetched};
use crate::models::{Broadcast, Station, StationKind};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub mod broadcast_page;
pub mod calendar;
pub mod day_table;
pub mod schedule;
pub mod station;

pub use broadcast_page::ItemJob;
pub use calendar::RangeJob;
pub use station::StationJob;

/// Everything a job may use while running.
pub struct ScrapeContext<'a, F> {
    pub fetch: &'a F,
    /// Reference instant of the crawl.
    pub now: DateTime<Utc>,
    /// Anchor instants of the crawl window.
    pub anchors: &'a [DateTime<Utc>],
}

impl<'a, F: Fetch> ScrapeContext<'a, F> {
    pub(crate) async fn get(&self, url: &Url, bytes: &mut usize) -> Result<Fetched, ScrapeError> {
        let fetched = self.fetch.fetch(url).await?;
        *bytes += fetched.bytes;
        debug!(%url, bytes = fetched.bytes, "Fetched");
        Ok(fetched)
    }
}

/// Output of one successful `scrape` call.
#[derive(Debug, Default)]
pub struct Scraped {
    pub jobs: Vec<Job>,
    pub results: Vec<Broadcast>,
    /// Items dropped while the job as a whole went on.
    pub errors: Vec<ScrapeError>,
    /// Bytes fetched by this job.
    pub bytes: usize,
}

/// A unit of crawl work.
pub trait Scraper {
    /// Fetch and parse. Invoked at most once per job.
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError>;

    /// Whether the job is relevant for `anchors`. Currently always true.
    fn matches(&self, _anchors: &[DateTime<Utc>]) -> bool {
        true
    }
}

/// Day page of a [`StationKind::DayTable`] or [`StationKind::ScheduleIndex`] station.
#[derive(Debug, Clone)]
pub struct DayJob(pub crate::models::TimeUrl);

impl Scraper for DayJob {
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
        match self.0.station.kind {
            StationKind::ScheduleIndex => schedule::scrape_day(&self.0, ctx).await,
            _ => day_table::scrape_day(&self.0, ctx).await,
        }
    }
}

/// The closed set of job variants.
#[derive(Debug, Clone)]
pub enum Job {
    Station(StationJob),
    Range(RangeJob),
    Day(DayJob),
    Item(ItemJob),
}

impl Job {
    pub fn station(station: Arc<Station>) -> Self {
        Job::Station(StationJob { station })
    }

    pub fn variant(&self) -> &'static str {
        match self {
            Job::Station(_) => "station",
            Job::Range(_) => "range",
            Job::Day(_) => "day",
            Job::Item(_) => "item",
        }
    }
}

impl Scraper for Job {
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
        match self {
            Job::Station(j) => j.scrape(ctx).await,
            Job::Range(j) => j.scrape(ctx).await,
            Job::Day(j) => j.scrape(ctx).await,
            Job::Item(j) => j.scrape(ctx).await,
        }
    }

    fn matches(&self, anchors: &[DateTime<Utc>]) -> bool {
        match self {
            Job::Station(j) => j.matches(anchors),
            Job::Range(j) => j.matches(anchors),
            Job::Day(j) => j.matches(anchors),
            Job::Item(j) => j.matches(anchors),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Station(j) => write!(f, "station {}", j.station.identifier),
            Job::Range(j) => write!(f, "range {}", j.0),
            Job::Day(j) => write!(f, "day {}", j.0),
            Job::Item(j) => write!(f, "item {}", j.time_url),
        }
    }
}
