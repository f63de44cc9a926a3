//! Broadcast detail pages.
//!
//! Both the JSON calendar feed and the schedule-index day pages only list
//! broadcasts; the full record lives on a detail page
//! (`.../ausstrahlung-866264.html`). [`ItemJob`] fetches that page and
//! re-scrapes everything, keeping the seeded time and falling back to the
//! seeded title, image and end time.
//!
//! Layout of the interesting part of a detail page:
//!
//! ```text
//! div.br-main-text
//!   div                      <- container, its direct <div> children are chrome
//!     div > p.br-time        "23:05 bis 00:00 Uhr"
//!     section > header > h2  "<em>Title</em> Series"
//!     section > h3           episode
//!     section > p, div       description
//!     div > h3 "Weitere Informationen" + a[href]   subject link
//! ```

use super::{ScrapeContext, Scraped, Scraper};
use crate::assemble::BroadcastDraft;
use crate::dates;
use crate::error::ScrapeError;
use crate::extract::{
    Pruning, attr, find_all, find_first, find_single, has_class, is_tag, parent, relocate, text, text_with_br,
};
use crate::fetch::Fetch;
use crate::models::{Broadcast, TimeUrl};
use chrono::DateTime;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, instrument, warn};
use url::Url;

static TIME_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}):(\d{2})\s+bis\s+(\d{2}):(\d{2})\s+Uhr").expect("static regex"));

const MORE_INFO: &str = "Weitere Informationen";

/// Whether `href` points at a broadcast detail page.
pub fn is_detail_link(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or("");
    path.ends_with(".html")
        && path
            .rsplit('/')
            .next()
            .is_some_and(|file| file.starts_with("ausstrahlung-"))
}

/// A broadcast known by time and detail page, plus whatever the listing said.
#[derive(Debug, Clone)]
pub struct ItemJob {
    pub time_url: TimeUrl,
    pub title: Option<String>,
    pub image: Option<Url>,
    pub dt_end: Option<DateTime<Tz>>,
}

impl Scraper for ItemJob {
    #[instrument(level = "debug", skip_all, fields(source = %self.time_url.source))]
    async fn scrape<F: Fetch>(&self, ctx: &ScrapeContext<'_, F>) -> Result<Scraped, ScrapeError> {
        let mut out = Scraped::default();
        let fetched = ctx.get(&self.time_url.source, &mut out.bytes).await?;
        let doc = Html::parse_document(&fetched.body);
        let bc = self.parse_broadcast(&doc)?;
        debug!(broadcast = %bc, "Parsed detail page");
        out.results.push(bc);
        Ok(out)
    }
}

impl ItemJob {
    /// Extract a [`Broadcast`] from a parsed detail page.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::AmbiguousStructure`] if a singleton node repeats
    /// - [`ScrapeError::DateResolution`] if the time range is unreadable
    /// - [`ScrapeError::IncompleteBroadcast`] if no title can be found
    pub fn parse_broadcast(&self, doc: &Html) -> Result<Broadcast, ScrapeError> {
        let root = doc.root_element();
        let source = &self.time_url.source;
        let mut draft = BroadcastDraft::from_time_url(&self.time_url);
        draft.title = self.title.clone();
        draft.image = self.image.clone();
        draft.dt_end = self.dt_end;

        let mut pruning = Pruning::new(doc);

        // Subject
        let more = find_single(
            root,
            |e| is_tag(e, "h3") && text(e) == MORE_INFO,
            "<h3>Weitere Informationen</h3>",
        )?;
        if let Some(block) = more.as_ref().and_then(parent) {
            draft.subject = find_first(block, |e| is_tag(e, "a") && !attr(e, "href").is_empty())
                .and_then(|a| source.join(attr(&a, "href")).ok());
            pruning.consume(block);
        }

        let main = find_single(
            root,
            |e| is_tag(e, "div") && has_class(e, "br-main-text"),
            "<div class='br-main-text'>",
        )?;
        if let Some(main) = main {
            self.parse_main(main, &mut pruning, &mut draft)?;
        }

        // DtEnd: every time range must read, the last one wins
        for p in find_all(root, |e| is_tag(e, "p") && has_class(e, "br-time")) {
            let t = text(&p);
            let caps = TIME_RANGE
                .captures(&t)
                .ok_or_else(|| ScrapeError::date(t.clone(), "expected 'HH:MM bis HH:MM Uhr'"))?;
            let start = draft.time.unwrap_or(self.time_url.time);
            let hour: u32 = caps[3].parse().map_err(|_| ScrapeError::date(t.clone(), "bad hour"))?;
            let minute: u32 = caps[4].parse().map_err(|_| ScrapeError::date(t.clone(), "bad minute"))?;
            draft.dt_end = Some(dates::end_after(&start, hour, minute)?);
        }

        // Modified
        let modified = find_single(
            root,
            |e| is_tag(e, "meta") && attr(e, "property") == "og:article:modified_time",
            "<meta property='og:article:modified_time'>",
        )?;
        if let Some(meta) = modified {
            let content = attr(&meta, "content");
            match DateTime::parse_from_rfc3339(content) {
                Ok(t) => draft.modified = Some(t.with_timezone(&self.time_url.station.time_zone)),
                Err(e) => warn!(%source, content, error = %e, "Ignoring unreadable modification time"),
            }
        }

        // Author
        let author = find_single(
            root,
            |e| is_tag(e, "meta") && attr(e, "name") == "author",
            "<meta name='author'>",
        )?;
        draft.author = author.map(|m| attr(&m, "content").trim().to_string()).filter(|s| !s.is_empty());

        // Image, unless the listing already had one
        if draft.image.is_none() {
            let og = find_single(
                root,
                |e| is_tag(e, "meta") && attr(e, "property") == "og:image",
                "<meta property='og:image'>",
            )?;
            draft.image = og.and_then(|m| source.join(attr(&m, "content")).ok());
        }

        draft.finish()
    }

    /// Title, series, episode and description from the main text block.
    fn parse_main<'a>(
        &self,
        main: ElementRef<'a>,
        pruning: &mut Pruning<'a>,
        draft: &mut BroadcastDraft,
    ) -> Result<(), ScrapeError> {
        let Some(h2) = find_single(main, |e| is_tag(e, "h2"), "<h2>")? else {
            return Ok(());
        };
        if let Some(em) = find_single(h2, |e| is_tag(e, "em"), "<h2><em>")? {
            let title = text(&em);
            if !title.is_empty() {
                draft.title = Some(title);
            }
            pruning.consume(em);
        }
        let episode = find_single(
            main,
            |e| is_tag(e, "h3") && !pruning.is_consumed(e),
            "<h3>",
        )?;
        if let Some(h3) = episode {
            draft.title_episode = Some(text(&h3));
            pruning.consume(h3);
        }

        // series is whatever remains of the heading
        let scratch = pruning.apply();
        draft.title_series = relocate(&scratch, &h2).map(|h| text(&h));

        let Some(inner) = parent(&h2).and_then(|p| parent(&p)).and_then(|p| parent(&p)) else {
            return Ok(());
        };
        pruning.consume(h2);
        for child in inner.children().filter_map(ElementRef::wrap) {
            if is_tag(&child, "div") {
                pruning.consume(child);
            }
        }
        let scratch = pruning.apply();
        if let Some(inner) = relocate(&scratch, &inner) {
            let rest: Vec<_> = inner
                .children()
                .filter_map(ElementRef::wrap)
                .flat_map(|c| find_all(c, |e| is_tag(e, "p") || is_tag(e, "div")))
                .collect();
            let description = text_with_br(&rest);
            if !description.is_empty() {
                draft.description = Some(description);
            }
        }
        Ok(())
    }
}
