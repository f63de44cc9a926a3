//! Job graph runner.
//!
//! Starts from the seed jobs (usually one per station) and keeps scheduling
//! until no job is left. Children go to the back of a FIFO queue; at most
//! `concurrency` jobs are in flight at a time, polled through a
//! `FuturesUnordered` on the current task.
//!
//! Job lifecycle: `Pending -> Running -> Expanded | Failed`. A failed job only
//! loses its own subtree; everything else that finished is kept.

use crate::fetch::Fetch;
use crate::models::Broadcast;
use crate::scrapers::{Job, ScrapeContext, Scraped, Scraper};
use crate::window::WindowPolicy;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Expanded,
    Failed,
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Jobs that ran to completion.
    pub expanded: usize,
    /// Jobs whose scrape returned an error.
    pub failed: usize,
    /// Jobs not scheduled because they did not match the anchors, or were
    /// already seen.
    pub skipped: usize,
    /// Failed jobs and dropped items, by [`ScrapeError::kind`](crate::error::ScrapeError::kind).
    pub drops: BTreeMap<&'static str, usize>,
    /// Bytes fetched.
    pub bytes: usize,
}

impl RunReport {
    /// Total number of failed jobs plus dropped items.
    pub fn dropped(&self) -> usize {
        self.drops.values().sum()
    }
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub broadcasts: Vec<Broadcast>,
    pub report: RunReport,
}

/// Drives jobs to completion with bounded concurrency.
pub struct Runner<'a, F> {
    fetch: &'a F,
    now: DateTime<Utc>,
    policy: WindowPolicy,
    concurrency: usize,
}

impl<'a, F: Fetch> Runner<'a, F> {
    /// # Arguments
    ///
    /// * `fetch` - Document source shared by all jobs
    /// * `now` - Reference instant the crawl window is computed from
    /// * `policy` - Crawl window
    /// * `concurrency` - Maximum number of jobs in flight, at least 1
    pub fn new(fetch: &'a F, now: DateTime<Utc>, policy: WindowPolicy, concurrency: usize) -> Self {
        Self {
            fetch,
            now,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    /// Run `seeds` and everything they expand into.
    #[instrument(level = "info", skip_all, fields(seeds = seeds.len(), concurrency = self.concurrency))]
    pub async fn run(&self, seeds: Vec<Job>) -> RunOutcome {
        let t0 = Instant::now();
        let anchors = self.policy.anchors(&self.now);
        let ctx = ScrapeContext {
            fetch: self.fetch,
            now: self.now,
            anchors: &anchors,
        };
        let ctx = &ctx;

        let mut outcome = RunOutcome::default();
        let mut states: Vec<JobState> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(usize, Job)> = VecDeque::new();
        let mut in_flight = FuturesUnordered::new();

        let mut enqueue = |job: Job,
                           states: &mut Vec<JobState>,
                           queue: &mut VecDeque<(usize, Job)>,
                           report: &mut RunReport| {
            let key = job.to_string();
            if !seen.insert(key) {
                debug!(%job, "Skipping duplicate job");
                report.skipped += 1;
                return;
            }
            if !job.matches(&anchors) {
                debug!(%job, "Skipping job outside the crawl window");
                report.skipped += 1;
                return;
            }
            states.push(JobState::Pending);
            queue.push_back((states.len() - 1, job));
        };

        for job in seeds {
            enqueue(job, &mut states, &mut queue, &mut outcome.report);
        }

        loop {
            while in_flight.len() < self.concurrency {
                let Some((id, job)) = queue.pop_front() else {
                    break;
                };
                states[id] = JobState::Running;
                debug!(id, %job, "Running");
                in_flight.push(async move {
                    let result = job.scrape(ctx).await;
                    (id, job, result)
                });
            }

            let Some((id, job, result)) = in_flight.next().await else {
                break;
            };
            let report = &mut outcome.report;
            match result {
                Ok(Scraped {
                    jobs,
                    results,
                    errors,
                    bytes,
                }) => {
                    states[id] = JobState::Expanded;
                    report.expanded += 1;
                    report.bytes += bytes;
                    for e in &errors {
                        warn!(%job, kind = e.kind(), error = %e, "Dropped item");
                        *report.drops.entry(e.kind()).or_default() += 1;
                    }
                    debug!(%job, children = jobs.len(), broadcasts = results.len(), "Expanded");
                    outcome.broadcasts.extend(results);
                    for child in jobs {
                        enqueue(child, &mut states, &mut queue, &mut *report);
                    }
                }
                Err(e) => {
                    states[id] = JobState::Failed;
                    report.failed += 1;
                    *report.drops.entry(e.kind()).or_default() += 1;
                    error!(%job, kind = e.kind(), error = %e, "Job failed");
                }
            }
        }

        debug_assert!(
            states.iter().all(|s| matches!(s, JobState::Expanded | JobState::Failed)),
            "job left unfinished"
        );
        let report = &outcome.report;
        info!(
            broadcasts = outcome.broadcasts.len(),
            expanded = report.expanded,
            failed = report.failed,
            skipped = report.skipped,
            dropped = report.dropped(),
            bytes = report.bytes,
            millis = t0.elapsed().as_millis() as u64,
            "Run complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use crate::models::{StationKind, fixtures};
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    const FEED: &str = include_str!("../testdata/2015-11-30T05-b4-program.json");
    const DETAIL: &str = include_str!("../testdata/2016-11-27T2030-b4-ausstrahlung-914548.html");
    const DAY_TABLE: &str = include_str!("../testdata/2015-11-19-dlf-programmvorschau.html");

    const RANGE_05: &str = "https://www.br-klassik.de/programm/radio/radiosendungen-100~calendarItems.jsp?rows=800&from=2015-11-30T05:01:00&to=2015-11-30T06:01:00";
    const ITEM_512526: &str = "https://www.br-klassik.de/programm/radio/ausstrahlung-512526.html";

    fn policy() -> WindowPolicy {
        WindowPolicy {
            lookback: 0,
            lookahead: 1,
            ..WindowPolicy::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Berlin.with_ymd_and_hms(2015, 11, 30, 5, 6, 7).unwrap().to_utc()
    }

    #[tokio::test]
    async fn test_calendar_station_keeps_partial_results() {
        // second range and second detail page are missing
        let fetch = StaticFetcher::new().page(RANGE_05, FEED).page(ITEM_512526, DETAIL);
        let seeds = vec![Job::station(fixtures::station("b4", StationKind::CalendarItems))];

        for concurrency in [1, 4] {
            let outcome = Runner::new(&fetch, now(), policy(), concurrency).run(seeds.clone()).await;
            assert_eq!(outcome.broadcasts.len(), 1);
            let bc = &outcome.broadcasts[0];
            assert_eq!(bc.title, "Intermezzo");
            assert_eq!(bc.source.as_str(), ITEM_512526);
            assert_eq!(bc.time.to_rfc3339(), "2015-11-30T05:00:00+01:00");
            assert_eq!(bc.dt_end.unwrap().to_rfc3339(), "2015-11-30T21:00:00+01:00");

            let report = &outcome.report;
            assert_eq!(report.expanded, 3, "station, first range, first item");
            assert_eq!(report.failed, 2, "second range, second item");
            assert_eq!(report.drops.get("fetch"), Some(&2));
            assert_eq!(report.bytes, FEED.len() + DETAIL.len());
        }
    }

    #[tokio::test]
    async fn test_day_table_station() {
        let fetch = StaticFetcher::new().page(
            "http://www.deutschlandfunk.de/programmvorschau.281.de.html?drbm:date=19.11.2015",
            DAY_TABLE,
        );
        let now = Berlin.with_ymd_and_hms(2015, 11, 19, 12, 0, 0).unwrap().to_utc();
        let outcome = Runner::new(&fetch, now, policy(), 2)
            .run(vec![Job::station(fixtures::station("dlf", StationKind::DayTable))])
            .await;
        assert_eq!(outcome.broadcasts.len(), 3);
        assert_eq!(outcome.report.expanded, 2);
        assert_eq!(outcome.report.failed, 0);
        assert_eq!(outcome.report.dropped(), 0);
        assert_eq!(fetch.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_seeds_run_once() {
        let fetch = StaticFetcher::new();
        let station = fixtures::station("b4", StationKind::CalendarItems);
        let outcome = Runner::new(&fetch, now(), policy(), 0)
            .run(vec![Job::station(station.clone()), Job::station(station)])
            .await;
        assert_eq!(outcome.report.skipped, 1);
        assert_eq!(outcome.report.expanded, 1);
        assert_eq!(outcome.report.failed, 2);
        assert!(outcome.broadcasts.is_empty());
    }

    #[tokio::test]
    async fn test_no_seeds() {
        let fetch = StaticFetcher::new();
        let outcome = Runner::new(&fetch, now(), policy(), 4).run(Vec::new()).await;
        assert!(outcome.broadcasts.is_empty());
        assert_eq!(outcome.report, RunReport::default());
    }
}
