//! Station jobs: the roots of the crawl graph.

use super::{DayJob, Job, ScrapeContext, Scraped, Scraper, calendar, day_table, schedule};
use crate::error::ScrapeError;
use crate::fetch::Fetch;
use crate::models::{Station, StationKind};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{info, instrument};

/// Expands a station into the jobs covering the crawl window.
#[derive(Debug, Clone)]
pub struct StationJob {
    pub station: Arc<Station>,
}

impl Scraper for StationJob {
    #[instrument(level = "info", skip_all, fields(station = %self.station.identifier))]
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
        let station = &self.station;
        let tz = station.time_zone;
        let scraped = match station.kind {
            StationKind::CalendarItems => {
                let jobs = ctx
                    .anchors
                    .iter()
                    .map(|a| calendar::RangeJob::for_anchor(station, a.with_timezone(&tz)).map(Job::Range))
                    .collect::<Result<Vec<_>, _>>()?;
                Scraped {
                    jobs,
                    ..Scraped::default()
                }
            }
            StationKind::DayTable => {
                let jobs = ctx
                    .anchors
                    .iter()
                    .map(|a| a.with_timezone(&tz).date_naive())
                    .unique()
                    .map(|d| day_table::day_url_for_date(station, d).map(|tu| Job::Day(DayJob(tu))))
                    .collect::<Result<Vec<_>, _>>()?;
                Scraped {
                    jobs,
                    ..Scraped::default()
                }
            }
            StationKind::ScheduleIndex => schedule::scrape_index(station, ctx).await?,
        };
        info!(jobs = scraped.jobs.len(), "Expanded station");
        Ok(scraped)
    }
}
