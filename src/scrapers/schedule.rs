//! Schedule-index stations: program calendar, day pages, detail pages.
//!
//! The calendar page links one day page per broadcast day
//! (`programmfahne102~_date-2015-10-21_-5dde...html`). A day page lists
//! several neighbouring days, each under a heading with a relative date:
//!
//! ```text
//! <div class="day">
//!   <h4>Heute, 21.10.</h4>
//!   <a class="link_broadcast" href=".../ausstrahlung-472576.html">
//!     <span class="time">10:05</span><span class="title">Notizbuch</span>
//!   </a>
//!   ...
//! ```
//!
//! Listed times before the station's close-down belong to the following
//! calendar day. Only the section of the page's own broadcast day is turned
//! into item jobs; the neighbours have day pages of their own.

use super::broadcast_page::{ItemJob, is_detail_link};
use super::{DayJob, Job, ScrapeContext, Scraped};
use crate::dates;
use crate::error::ScrapeError;
use crate::extract::{attr, find_all, find_single, has_class, is_tag, text};
use crate::fetch::Fetch;
use crate::models::{Station, TimeUrl};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

static DAY_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_date-(\d{4})-(\d{2})-(\d{2})_").expect("static regex"));

/// Fetch the program calendar and emit a day job per broadcast day that
/// covers one of the anchors.
#[instrument(level = "info", skip_all, fields(station = %station.identifier))]
pub(crate) async fn scrape_index<F: Fetch>(
    station: &Arc<Station>,
    ctx: &ScrapeContext<'_, F>,
) -> Result<Scraped, ScrapeError> {
    let mut out = Scraped::default();
    let fetched = ctx.get(&station.program_url, &mut out.bytes).await?;
    let doc = Html::parse_document(&fetched.body);
    let (days, errors) = parse_day_links(station, &doc)?;
    let total = days.len();
    out.errors = errors;
    out.jobs = days
        .into_iter()
        .filter(|tu| covers_any(tu, ctx.anchors))
        .map(|tu| Job::Day(DayJob(tu)))
        .collect();
    info!(days = total, selected = out.jobs.len(), "Parsed program calendar");
    Ok(out)
}

/// Every distinct day page linked from the program calendar, in date order,
/// each anchored at the close-down of its day. Links without a valid date are
/// returned as errors.
pub fn parse_day_links(
    station: &Arc<Station>,
    doc: &Html,
) -> Result<(Vec<TimeUrl>, Vec<ScrapeError>), ScrapeError> {
    let close = station.close_down_time();
    let links = find_all(doc.root_element(), |e| is_tag(e, "a") && DAY_LINK.is_match(attr(e, "href")));
    let mut days = Vec::with_capacity(links.len());
    let mut errors = Vec::new();
    for a in links {
        let href = attr(&a, "href");
        let Some(date) = DAY_LINK.captures(href).and_then(|c| {
            NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
        }) else {
            warn!(href, "Skipping day link without a valid date");
            errors.push(ScrapeError::date(href, "no such calendar date"));
            continue;
        };
        let source = match station.program_url.join(href) {
            Ok(source) => source,
            Err(e) => {
                warn!(href, error = %e, "Skipping unresolvable day link");
                errors.push(ScrapeError::Parse {
                    what: href.to_string(),
                    message: e.to_string(),
                });
                continue;
            }
        };
        let time = dates::localize(&station.time_zone, date.and_time(close))?;
        days.push(TimeUrl {
            time,
            source,
            station: Arc::clone(station),
        });
    }
    let days = days
        .into_iter()
        .unique_by(|tu| tu.time)
        .sorted_by_key(|tu| tu.time)
        .collect();
    Ok((days, errors))
}

/// Whether an anchor falls into the broadcast day starting at `tu.time`.
fn covers_any(tu: &TimeUrl, anchors: &[DateTime<Utc>]) -> bool {
    let start = tu.time.with_timezone(&Utc);
    let end = tu.time.date_naive().succ_opt().and_then(|next| {
        dates::localize(&tu.station.time_zone, next.and_time(tu.station.close_down_time())).ok()
    });
    let Some(end) = end.map(|e| e.with_timezone(&Utc)) else {
        return false;
    };
    anchors.iter().any(|a| *a >= start && *a < end)
}

/// Start of a listed entry of broadcast day `day`, with close-down rollover.
pub(crate) fn listed_start(
    tz: &Tz,
    day: NaiveDate,
    hour: u32,
    minute: u32,
    close_down: NaiveTime,
) -> Result<DateTime<Tz>, ScrapeError> {
    let time = NaiveTime::from_hms_opt(hour % 24, minute, 0)
        .ok_or_else(|| ScrapeError::date(format!("{:02}:{:02}", hour, minute), "no such time of day"))?;
    if hour == 24 {
        return dates::at(tz, day, hour, minute);
    }
    dates::at(tz, dates::listing_date(day, time, close_down), hour, minute)
}

#[instrument(level = "info", skip_all, fields(source = %tu.source))]
pub(crate) async fn scrape_day<F: Fetch>(tu: &TimeUrl, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
    let mut out = Scraped::default();
    let fetched = ctx.get(&tu.source, &mut out.bytes).await?;
    let doc = Html::parse_document(&fetched.body);
    let today = ctx.now.with_timezone(&tu.station.time_zone).date_naive();
    let (seeds, errors) = parse_day_page(tu, &doc, today)?;
    info!(items = seeds.len(), dropped = errors.len(), "Parsed day page");
    out.jobs = seeds.into_iter().map(Job::Item).collect();
    out.errors = errors;
    Ok(out)
}

/// A listed entry before it is filtered by broadcast day.
struct Listed {
    day: NaiveDate,
    start: DateTime<Tz>,
    seed: Result<ItemJob, ScrapeError>,
}

/// Item jobs for the broadcast day of `tu`. Relative day headings resolve
/// against `today`. Sections and entries of the page's own day that cannot be
/// read are reported next to the rest; neighbouring sections only supply the
/// end of the last own entry.
pub fn parse_day_page(
    tu: &TimeUrl,
    doc: &Html,
    today: NaiveDate,
) -> Result<(Vec<ItemJob>, Vec<ScrapeError>), ScrapeError> {
    let station = &tu.station;
    let reference = tu.time.date_naive();
    let sections = find_all(doc.root_element(), |e| is_tag(e, "div") && has_class(e, "day"));
    if sections.is_empty() {
        warn!("Day page without day sections");
    }

    let mut errors = Vec::new();
    let mut listed = Vec::new();
    for section in sections {
        let day = match section_day(section, today) {
            Ok(day) => day,
            Err(e) => {
                warn!(error = %e, "Skipping day section");
                errors.push(e);
                continue;
            }
        };
        let own = day == reference;
        for a in find_all(section, |e| is_tag(e, "a") && has_class(e, "link_broadcast")) {
            match listed_entry(tu, day, a) {
                Ok(entry) => listed.push(entry),
                Err(e) if own => errors.push(e),
                // reported by the day page of `day`
                Err(e) => debug!(%day, error = %e, "Skipping neighbouring entry"),
            }
        }
    }

    // each entry ends when the next listed one starts, across sections
    let starts: Vec<DateTime<Tz>> = listed.iter().map(|l| l.start).collect();
    let mut seeds = Vec::new();
    for (i, entry) in listed.into_iter().enumerate() {
        if entry.day != reference {
            continue;
        }
        match entry.seed {
            Ok(mut seed) => {
                seed.dt_end = starts.get(i + 1).copied().filter(|end| *end > entry.start);
                seeds.push(seed);
            }
            Err(e) => {
                warn!(error = %e, station = %station.identifier, "Dropping listed broadcast");
                errors.push(e);
            }
        }
    }
    Ok((seeds, errors))
}

fn section_day(section: ElementRef<'_>, today: NaiveDate) -> Result<NaiveDate, ScrapeError> {
    let h4 = find_single(section, |e| is_tag(e, "h4"), "<div class='day'><h4>")?
        .ok_or_else(|| ScrapeError::date("", "day section without heading"))?;
    dates::resolve_day_heading(&text(&h4), today)
}

/// Time and title of one listing link. A bad time fails the entry outright;
/// a missing detail link only fails its seed.
fn listed_entry(tu: &TimeUrl, day: NaiveDate, a: ElementRef<'_>) -> Result<Listed, ScrapeError> {
    let station = &tu.station;
    let span = |class: &str| {
        find_single(a, |e| is_tag(e, "span") && has_class(e, class), class).map(|s| s.map(|s| text(&s)))
    };
    let time_text = span("time")?.unwrap_or_default();
    let (hour, minute) = dates::parse_time_of_day(&time_text)?;
    let start = listed_start(&station.time_zone, day, hour, minute, station.close_down_time())?;
    let title = span("title")?.filter(|t| !t.is_empty());

    let href = attr(&a, "href");
    let seed = if is_detail_link(href) {
        tu.source
            .join(href)
            .map_err(|e| ScrapeError::Parse {
                what: href.to_string(),
                message: e.to_string(),
            })
            .map(|source| ItemJob {
                time_url: TimeUrl {
                    time: start,
                    source,
                    station: Arc::clone(station),
                },
                title,
                image: None,
                dt_end: None,
            })
    } else {
        Err(ScrapeError::IncompleteBroadcast {
            field: "source",
            source_hint: format!("{} {}", tu.source, time_text),
        })
    };
    Ok(Listed { day, start, seed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use crate::models::{StationKind, fixtures};
    use crate::window::WindowPolicy;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use url::Url;

    const INDEX: &str = include_str!("../../testdata/2015-10-21-b2-programmfahne.html");
    const DAY: &str = include_str!("../../testdata/2015-10-21-b2-day.html");
    const DAY_URL: &str = "http://www.br.de/radio/bayern2/programmkalender/programmfahne102~_date-2015-10-21_-5ddeec3fc12bdd255a6c45c650f068b54f7b010b.html";

    fn b2() -> Arc<Station> {
        let mut s = (*fixtures::station("b2", StationKind::ScheduleIndex)).clone();
        s.program_url = Url::parse("http://www.br.de/radio/bayern2/programmkalender/programmfahne102.html").unwrap();
        s.calendar_url = None;
        s.day_url = None;
        Arc::new(s)
    }

    fn day_tu() -> TimeUrl {
        TimeUrl {
            time: Berlin.with_ymd_and_hms(2015, 10, 21, 5, 0, 0).unwrap(),
            source: Url::parse(DAY_URL).unwrap(),
            station: b2(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2015, 10, 21).unwrap()
    }

    #[test]
    fn test_parse_day_links() {
        let (days, errors) = parse_day_links(&b2(), &Html::parse_document(INDEX)).unwrap();
        let got: Vec<String> = days.iter().map(|d| d.time.to_rfc3339()).collect();
        assert_eq!(
            got,
            [
                "2015-10-20T05:00:00+02:00",
                "2015-10-21T05:00:00+02:00",
                "2015-10-22T05:00:00+02:00",
                "2015-12-09T05:00:00+01:00",
            ]
        );
        assert_eq!(days[1].source.as_str(), DAY_URL);
        assert_eq!(days[0].station.identifier, "b2");
        // 2015-02-30
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), "date_resolution");
    }

    #[tokio::test]
    async fn test_scrape_index_keeps_covered_days() {
        let station = b2();
        let fetch = StaticFetcher::new().page(station.program_url.as_str(), INDEX);
        let now = Berlin.with_ymd_and_hms(2015, 10, 21, 12, 0, 0).unwrap();
        let anchors = WindowPolicy::default().anchors(&now);
        let ctx = ScrapeContext {
            fetch: &fetch,
            now: now.to_utc(),
            anchors: &anchors,
        };
        let out = scrape_index(&station, &ctx).await.unwrap();
        let days: Vec<String> = out
            .jobs
            .iter()
            .map(|j| match j {
                Job::Day(d) => d.0.time.to_rfc3339(),
                other => panic!("unexpected {}", other),
            })
            .collect();
        assert_eq!(days, ["2015-10-21T05:00:00+02:00", "2015-10-22T05:00:00+02:00"]);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.bytes, INDEX.len());
    }

    #[test]
    fn test_parse_day_page() {
        let (seeds, errors) = parse_day_page(&day_tu(), &Html::parse_document(DAY), today()).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
        let got: Vec<(String, String, Option<String>)> = seeds
            .iter()
            .map(|s| {
                (
                    s.time_url.time.to_rfc3339(),
                    s.title.clone().unwrap_or_default(),
                    s.dt_end.map(|e| e.to_rfc3339()),
                )
            })
            .collect();
        let expect = |t: &str, title: &str, end: &str| (t.to_string(), title.to_string(), Some(end.to_string()));
        assert_eq!(
            got,
            [
                expect("2015-10-21T05:00:00+02:00", "radioWelt", "2015-10-21T10:05:00+02:00"),
                expect("2015-10-21T10:05:00+02:00", "Notizbuch", "2015-10-21T23:05:00+02:00"),
                expect("2015-10-21T23:05:00+02:00", "Nachtmix", "2015-10-22T00:05:00+02:00"),
                expect("2015-10-22T00:05:00+02:00", "Concerto bavarese", "2015-10-22T04:58:00+02:00"),
                expect("2015-10-22T04:58:00+02:00", "Nachrichten", "2015-10-22T05:00:00+02:00"),
            ]
        );
        assert_eq!(
            seeds[1].time_url.source.as_str(),
            "http://www.br.de/radio/bayern2/programmkalender/ausstrahlung-472576.html"
        );
    }

    #[test]
    fn test_broken_entries_are_isolated() {
        let page = DAY
            .replace("<span class=\"time\">10:05</span>", "<span class=\"time\">zehn</span>")
            .replace("ausstrahlung-472628.html", "nachtmix.html");
        let (seeds, errors) = parse_day_page(&day_tu(), &Html::parse_document(&page), today()).unwrap();
        assert_eq!(seeds.len(), 3);
        let kinds: Vec<&str> = errors.iter().map(ScrapeError::kind).collect();
        assert_eq!(kinds, ["date_resolution", "incomplete_broadcast"]);
    }

    #[test]
    fn test_unreadable_heading_drops_section() {
        let page = DAY.replace("Heute, 21.10.", "Sonntag");
        let (seeds, errors) = parse_day_page(&day_tu(), &Html::parse_document(&page), today()).unwrap();
        assert!(seeds.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind(), "date_resolution");
    }

    #[tokio::test]
    async fn test_relative_headings_resolve_against_now() {
        let page = r#"<html><body>
  <div class="day"><h4>Heute</h4><ul>
    <li><a class="link_broadcast" href="/radio/bayern2/programmkalender/ausstrahlung-1.html"><span class="time">10:05</span><span class="title">Notizbuch 21.</span></a></li>
  </ul></div>
  <div class="day"><h4>Morgen</h4><ul>
    <li><a class="link_broadcast" href="/radio/bayern2/programmkalender/ausstrahlung-2.html"><span class="time">10:05</span><span class="title">Notizbuch 22.</span></a></li>
  </ul></div>
</body></html>"#;
        let tu = TimeUrl {
            time: Berlin.with_ymd_and_hms(2015, 10, 22, 5, 0, 0).unwrap(),
            ..day_tu()
        };
        let fetch = StaticFetcher::new().page(DAY_URL, page);
        let ctx = ScrapeContext {
            fetch: &fetch,
            now: Berlin.with_ymd_and_hms(2015, 10, 21, 12, 0, 0).unwrap().to_utc(),
            anchors: &[],
        };
        let out = scrape_day(&tu, &ctx).await.unwrap();
        let got: Vec<(String, Option<String>)> = out
            .jobs
            .iter()
            .map(|j| match j {
                Job::Item(i) => (i.time_url.time.to_rfc3339(), i.title.clone()),
                other => panic!("unexpected {}", other),
            })
            .collect();
        assert_eq!(got, [("2015-10-22T10:05:00+02:00".to_string(), Some("Notizbuch 22.".to_string()))]);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_neighbouring_sections_do_not_report_drops() {
        let page = DAY.replace(
            "ausstrahlung-472400.html\"><span class=\"time\">23:05",
            "ausstrahlung-472400.html\"><span class=\"time\">spät",
        );
        assert_ne!(page, DAY);
        let (seeds, errors) = parse_day_page(&day_tu(), &Html::parse_document(&page), today()).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(seeds.len(), 5);
        // the next day's first entry still ends the last own one
        assert_eq!(seeds[4].dt_end.unwrap().to_rfc3339(), "2015-10-22T05:00:00+02:00");
    }

    #[test]
    fn test_listed_start_rollover() {
        let close = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let day = NaiveDate::from_ymd_opt(2015, 10, 22).unwrap();
        let t = listed_start(&Berlin, day, 4, 58, close).unwrap();
        assert_eq!(t.to_rfc3339(), "2015-10-23T04:58:00+02:00");
        let t = listed_start(&Berlin, day, 23, 5, close).unwrap();
        assert_eq!(t.to_rfc3339(), "2015-10-22T23:05:00+02:00");
        let t = listed_start(&Berlin, day, 24, 0, close).unwrap();
        assert_eq!(t.to_rfc3339(), "2015-10-23T00:00:00+02:00");
    }

    #[tokio::test]
    async fn test_scrape_day_emits_item_jobs() {
        let tu = day_tu();
        let fetch = StaticFetcher::new().page(DAY_URL, DAY);
        let ctx = ScrapeContext {
            fetch: &fetch,
            now: Berlin.with_ymd_and_hms(2015, 10, 21, 12, 0, 0).unwrap().to_utc(),
            anchors: &[],
        };
        let out = scrape_day(&tu, &ctx).await.unwrap();
        assert_eq!(out.jobs.len(), 5);
        assert!(out.jobs.iter().all(|j| j.variant() == "item"));
        assert!(out.results.is_empty());
    }
}
