//! Day table pages (`programmvorschau.281.de.html?drbm:date=19.11.2015`).
//!
//! One page lists a whole day as table rows:
//!
//! ```text
//! <tr>
//!   <td class="time"><a name="2305"></a>23:05</td>
//!   <td class="description"><h3><a href="...">Title</a><a class="psradio">aufnehmen</a></h3><p>...</p></td>
//! </tr>
//! ```
//!
//! Every row becomes a finished [`Broadcast`]; there is no detail page. A row
//! ends when the next one starts, the last one at the following midnight.

use super::{ScrapeContext, Scraped};
use crate::assemble::{BroadcastDraft, fill_end_times, midnight_after};
use crate::dates;
use crate::error::ScrapeError;
use crate::extract::{
    attr, find_all, find_single, has_ancestors, has_class, is_tag, own_text, parent, text, text_with_br,
};
use crate::fetch::Fetch;
use crate::models::{Broadcast, Station, TimeUrl};
use chrono::NaiveDate;
use scraper::{ElementRef, Html};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

/// Day page of `station` for `date`, anchored at the date's local midnight.
pub fn day_url_for_date(station: &Arc<Station>, date: NaiveDate) -> Result<TimeUrl, ScrapeError> {
    let template = station
        .day_url
        .as_deref()
        .ok_or_else(|| ScrapeError::config(format!("{}: no day_url", station.identifier)))?;
    let mut raw = String::new();
    write!(raw, "{}", date.format(template))
        .map_err(|_| ScrapeError::config(format!("{}: bad day_url template '{}'", station.identifier, template)))?;
    let source = Url::parse(&raw).map_err(|e| ScrapeError::config(format!("{}: {}", raw, e)))?;
    Ok(TimeUrl {
        time: dates::at(&station.time_zone, date, 0, 0)?,
        source,
        station: Arc::clone(station),
    })
}

#[instrument(level = "info", skip_all, fields(source = %tu.source))]
pub(crate) async fn scrape_day<F: Fetch>(tu: &TimeUrl, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
    let mut out = Scraped::default();
    let fetched = ctx.get(&tu.source, &mut out.bytes).await?;
    let doc = Html::parse_document(&fetched.body);
    let (results, errors) = parse_day_table(tu, &doc)?;
    info!(broadcasts = results.len(), dropped = errors.len(), "Parsed day table");
    out.results = results;
    out.errors = errors;
    Ok(out)
}

/// All broadcasts of a day table. Rows that cannot be read are returned as
/// errors next to the rest.
pub fn parse_day_table(tu: &TimeUrl, doc: &Html) -> Result<(Vec<Broadcast>, Vec<ScrapeError>), ScrapeError> {
    let anchors = find_all(doc.root_element(), |e| {
        is_tag(e, "a") && has_ancestors(e, &["td", "tr"]) && parent(e).is_some_and(|td| has_class(&td, "time"))
    });

    let mut drafts = Vec::with_capacity(anchors.len());
    let mut problems = Vec::with_capacity(anchors.len());
    let mut errors = Vec::new();
    for a in anchors {
        let name = attr(&a, "name");
        if name.is_empty() {
            warn!(source = %tu.source, "Dropping table row without anchor name");
            errors.push(ScrapeError::IncompleteBroadcast {
                field: "time",
                source_hint: format!("{} <td class='time'><a> without name", tu.source),
            });
            continue;
        }
        let mut draft = BroadcastDraft::new(Arc::clone(&tu.station));
        match row_start(tu, name) {
            Ok(time) => draft.time = Some(time),
            Err(e) => {
                errors.push(e);
                continue;
            }
        }
        let mut source = tu.source.clone();
        source.set_fragment(Some(name));
        draft.source = Some(source);

        // a > td > tr
        let problem = match parent(&a).and_then(|td| parent(&td)) {
            Some(tr) => parse_row(tu, tr, &mut draft).err(),
            None => None,
        };
        drafts.push(draft);
        problems.push(problem);
    }

    let midnight = midnight_after(&tu.time)?;
    fill_end_times(&mut drafts, Some(midnight));

    let mut results = Vec::with_capacity(drafts.len());
    for (draft, problem) in drafts.into_iter().zip(problems) {
        let finished = match problem {
            Some(e) => Err(e),
            None => draft.finish(),
        };
        match finished {
            Ok(bc) => results.push(bc),
            Err(e) => {
                warn!(error = %e, "Dropping table row");
                errors.push(e);
            }
        }
    }
    Ok((results, errors))
}

/// `name="HHMM"` on the day of `tu`.
fn row_start(tu: &TimeUrl, name: &str) -> Result<chrono::DateTime<chrono_tz::Tz>, ScrapeError> {
    let digits = name.get(0..4).filter(|d| d.bytes().all(|b| b.is_ascii_digit()));
    let digits = digits.ok_or_else(|| ScrapeError::date(name, "expected HHMM"))?;
    let (hour, minute) = dates::parse_time_of_day(&format!("{}:{}", &digits[0..2], &digits[2..4]))?;
    dates::at(&tu.station.time_zone, tu.time.date_naive(), hour, minute)
}

fn parse_row(tu: &TimeUrl, tr: ElementRef<'_>, draft: &mut BroadcastDraft) -> Result<(), ScrapeError> {
    let h3 = find_single(
        tr,
        |e| is_tag(e, "h3") && has_ancestors(e, &["td", "tr"]) && parent(e).is_some_and(|td| has_class(&td, "description")),
        "<tr><td class='description'><h3>",
    )?;
    let Some(h3) = h3 else {
        return Ok(());
    };

    // the "aufnehmen" link is not part of the title
    let link = find_single(
        h3,
        |e| is_tag(e, "a") && !has_class(e, "psradio"),
        "<tr><td class='description'><h3><a>",
    )?;
    let mut title = link.as_ref().map(text).unwrap_or_default();
    if let Some(a) = link {
        draft.subject = tu.source.join(attr(&a, "href")).ok();
    }
    if title.trim().is_empty() {
        title = own_text(&h3);
    }
    draft.title = Some(title);

    if let Some(td) = parent(&h3) {
        let description = text_with_br(&find_all(td, |e| is_tag(e, "p")));
        if !description.is_empty() {
            draft.description = Some(description);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StaticFetcher;
    use crate::models::{StationKind, fixtures};
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    const PAGE: &str = include_str!("../../testdata/2015-11-19-dlf-programmvorschau.html");

    fn dlf() -> Arc<Station> {
        let mut s = (*fixtures::station("dlf", StationKind::DayTable)).clone();
        s.close_down = "00:00".to_string();
        s.publisher = Some("http://www.deutschlandfunk.de/".to_string());
        Arc::new(s)
    }

    fn day() -> TimeUrl {
        day_url_for_date(&dlf(), NaiveDate::from_ymd_opt(2015, 11, 19).unwrap()).unwrap()
    }

    #[test]
    fn test_day_url_for_date() {
        let tu = day();
        assert_eq!(
            tu.source.as_str(),
            "http://www.deutschlandfunk.de/programmvorschau.281.de.html?drbm:date=19.11.2015"
        );
        assert_eq!(tu.time.to_rfc3339(), "2015-11-19T00:00:00+01:00");

        let mut broken = (*dlf()).clone();
        broken.day_url = None;
        let err = day_url_for_date(&Arc::new(broken), NaiveDate::from_ymd_opt(2015, 11, 19).unwrap()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_parse_day_table() {
        let tu = day();
        let (bcs, errors) = parse_day_table(&tu, &Html::parse_document(PAGE)).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(bcs.len(), 3);

        let first = &bcs[0];
        assert_eq!(first.title, "Kalenderblatt");
        assert_eq!(
            first.source.as_str(),
            "http://www.deutschlandfunk.de/programmvorschau.281.de.html?drbm:date=19.11.2015#0005"
        );
        assert_eq!(first.time.to_rfc3339(), "2015-11-19T00:05:00+01:00");
        assert_eq!(first.dt_end.unwrap().to_rfc3339(), "2015-11-19T00:10:00+01:00");
        assert_eq!(
            first.subject.as_ref().unwrap().as_str(),
            "http://www.deutschlandfunk.de/kalenderblatt.870.de.html"
        );
        assert_eq!(first.description.as_deref(), Some("Vor 100 Jahren: Einstein legt die Feldgleichungen vor"));
        assert_eq!(first.publisher.as_deref(), Some("http://www.deutschlandfunk.de/"));
        assert_eq!(first.language, "de");
        assert!(first.title_series.is_none());

        let second = &bcs[1];
        assert_eq!(second.title, "Nachrichten");
        assert!(second.subject.is_none());
        assert!(second.description.is_none());
        assert_eq!(second.dt_end.unwrap().to_rfc3339(), "2015-11-19T23:05:00+01:00");

        let last = &bcs[2];
        assert_eq!(last.title, "Das war der Tag");
        assert_eq!(last.description.as_deref(), Some("Journal vor Mitternacht\nMit Nachrichten"));
        assert_eq!(last.dt_end.unwrap().to_rfc3339(), "2015-11-20T00:00:00+01:00");
    }

    #[test]
    fn test_ambiguous_row_drops_only_that_row() {
        let page = PAGE.replace("<h3>Nachrichten", "<h3>Extra</h3><h3>Nachrichten");
        let (bcs, errors) = parse_day_table(&day(), &Html::parse_document(&page)).unwrap();
        assert_eq!(bcs.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ScrapeError::AmbiguousStructure { count: 2, .. }));
        // the dropped row still ends its predecessor
        assert_eq!(bcs[0].dt_end.unwrap().to_rfc3339(), "2015-11-19T00:10:00+01:00");
    }

    #[test]
    fn test_bad_anchor_name() {
        let page = PAGE.replace("name=\"0010\"", "name=\"xx10\"");
        let (bcs, errors) = parse_day_table(&day(), &Html::parse_document(&page)).unwrap();
        assert_eq!(bcs.len(), 2);
        assert_eq!(errors[0].kind(), "date_resolution");
        assert_eq!(bcs[0].dt_end.unwrap().to_rfc3339(), "2015-11-19T23:05:00+01:00");
    }

    #[test]
    fn test_anchor_without_name_is_reported() {
        let page = PAGE.replace("<a name=\"2305\"></a>", "<a></a>");
        assert_ne!(page, PAGE);
        let (bcs, errors) = parse_day_table(&day(), &Html::parse_document(&page)).unwrap();
        assert_eq!(bcs.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ScrapeError::IncompleteBroadcast { field: "time", .. }));
        assert_eq!(bcs[1].dt_end.unwrap().to_rfc3339(), "2015-11-20T00:00:00+01:00");
    }

    #[tokio::test]
    async fn test_scrape_day() {
        let tu = day();
        let fetch = StaticFetcher::new().page(tu.source.as_str(), PAGE);
        let ctx = ScrapeContext {
            fetch: &fetch,
            now: Berlin.with_ymd_and_hms(2015, 11, 19, 12, 0, 0).unwrap().to_utc(),
            anchors: &[],
        };
        let out = scrape_day(&tu, &ctx).await.unwrap();
        assert!(out.jobs.is_empty());
        assert_eq!(out.results.len(), 3);
        assert_eq!(out.bytes, PAGE.len());
    }
}
