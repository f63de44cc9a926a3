//! Date and time normalization.
//!
//! Program pages mostly print local wall-clock times ("23:05") and partial
//! dates ("Morgen, 31.12."). This module turns those into absolute instants in
//! the station's time zone. Daylight saving is left to the tz database:
//! ambiguous local times take the earlier mapping, non-existent ones fail.

use crate::error::ScrapeError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Format of JSON feed timestamps and range query parameters.
pub const LOCAL_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%S";

static DAY_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:([^\d,]+?)\s*,?\s*)?(?:(\d{1,2})\.(?:\s*(\d{1,2})\.)?)?\s*$")
        .expect("static regex")
});

static TIME_OF_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})[:.](\d{2})\s*$").expect("static regex"));

/// Map a local wall-clock time to an instant.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, ScrapeError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ScrapeError::date(naive.to_string(), format!("does not exist in {}", tz)))
}

/// Local instant for `date` at `hour:minute`.
pub fn at(tz: &Tz, date: NaiveDate, hour: u32, minute: u32) -> Result<DateTime<Tz>, ScrapeError> {
    if hour == 24 {
        // 24:MM is MM minutes past the following midnight
        let next = date
            .succ_opt()
            .ok_or_else(|| ScrapeError::date(date.to_string(), "no following day"))?;
        return at(tz, next, 0, minute);
    }
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| ScrapeError::date(format!("{:02}:{:02}", hour, minute), "no such time of day"))?;
    localize(tz, date.and_time(time))
}

/// The midnight that ends `date`, i.e. 00:00 of the next day.
pub fn following_midnight(tz: &Tz, date: NaiveDate) -> Result<DateTime<Tz>, ScrapeError> {
    let next = date
        .succ_opt()
        .ok_or_else(|| ScrapeError::date(date.to_string(), "no following day"))?;
    at(tz, next, 0, 0)
}

/// End instant for a broadcast starting at `start` whose end is only known as
/// a time of day. An end not after the start crosses midnight.
pub fn end_after(start: &DateTime<Tz>, hour: u32, minute: u32) -> Result<DateTime<Tz>, ScrapeError> {
    let tz = start.timezone();
    let mut end = at(&tz, start.date_naive(), hour, minute)?;
    if end <= *start {
        let next = start
            .date_naive()
            .succ_opt()
            .ok_or_else(|| ScrapeError::date(start.to_string(), "no following day"))?;
        end = at(&tz, next, hour, minute)?;
    }
    Ok(end)
}

/// Parse `HH:MM` (or `HH.MM`) into hour and minute.
pub fn parse_time_of_day(text: &str) -> Result<(u32, u32), ScrapeError> {
    let caps = TIME_OF_DAY
        .captures(text)
        .ok_or_else(|| ScrapeError::date(text, "expected HH:MM"))?;
    let hour: u32 = caps[1].parse().map_err(|_| ScrapeError::date(text, "bad hour"))?;
    let minute: u32 = caps[2].parse().map_err(|_| ScrapeError::date(text, "bad minute"))?;
    if hour > 24 || minute > 59 {
        return Err(ScrapeError::date(text, "out of range"));
    }
    Ok((hour, minute))
}

/// Date of the broadcast day a listed time belongs to. Times before the
/// station's close-down still belong to the previous listing day.
pub fn listing_date(day: NaiveDate, time: NaiveTime, close_down: NaiveTime) -> NaiveDate {
    if time < close_down {
        day.succ_opt().unwrap_or(day)
    } else {
        day
    }
}

/// Parse a feed timestamp `YYYY-MM-DDTHH:MM:SS` in the station zone.
pub fn parse_local_timestamp(tz: &Tz, text: &str) -> Result<DateTime<Tz>, ScrapeError> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), LOCAL_TIMESTAMP)
        .map_err(|e| ScrapeError::date(text, e.to_string()))?;
    localize(tz, naive)
}

/// Query-string timestamp: second precision, local, no offset.
pub fn format_local_timestamp(t: &DateTime<Tz>) -> String {
    t.format(LOCAL_TIMESTAMP).to_string()
}

/// Year in which `month` is nearest to `now`: within six months back or
/// forward, ties toward the future.
pub fn year_for_month(month: u32, now: NaiveDate) -> i32 {
    let current = now.month() as i32;
    let m = month as i32;
    if current - m >= 6 {
        now.year() + 1
    } else if m - current > 6 {
        now.year() - 1
    } else {
        now.year()
    }
}

/// Offset in days of a relative day token, if it is one.
fn relative_days(token: &str) -> Option<i64> {
    match token.trim().to_lowercase().as_str() {
        "vorgestern" => Some(-2),
        "gestern" | "yesterday" => Some(-1),
        "heute" | "today" => Some(0),
        "morgen" | "tomorrow" => Some(1),
        "übermorgen" => Some(2),
        _ => None,
    }
}

/// Nearest date with day-of-month `day` around `now`, ties toward the future.
fn nearest_day_of_month(day: u32, now: NaiveDate) -> Option<NaiveDate> {
    let first = now.with_day(1)?;
    let candidates = [
        first.checked_sub_months(chrono::Months::new(1)),
        Some(first),
        first.checked_add_months(chrono::Months::new(1)),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|m| m.with_day(day))
        .min_by_key(|d| {
            let diff = (*d - now).num_days();
            // future wins ties
            (diff.abs(), diff < 0)
        })
}

/// Resolve a day heading such as `"Morgen, 31.12."`, `"Gestern, 17.02."`,
/// `"Mittwoch, 21.10."`, `"17."` or `"heute"` against `now`.
///
/// An explicit day and month win over the relative token; the year comes from
/// [`year_for_month`]. A bare day-of-month takes the nearest month. A token on
/// its own shifts `now`.
pub fn resolve_day_heading(text: &str, now: NaiveDate) -> Result<NaiveDate, ScrapeError> {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let caps = DAY_HEADING
        .captures(&cleaned)
        .ok_or_else(|| ScrapeError::date(text, "unrecognized day heading"))?;
    let token = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let day = caps.get(2).map(|m| m.as_str().parse::<u32>());
    let month = caps.get(3).map(|m| m.as_str().parse::<u32>());

    match (day, month) {
        (Some(Ok(day)), Some(Ok(month))) => {
            let year = year_for_month(month, now);
            NaiveDate::from_ymd_opt(year, month, day)
                .ok_or_else(|| ScrapeError::date(text, "no such calendar date"))
        }
        (Some(Ok(day)), None) => nearest_day_of_month(day, now)
            .ok_or_else(|| ScrapeError::date(text, "no such day of month nearby")),
        (None, None) => {
            let offset = relative_days(token)
                .ok_or_else(|| ScrapeError::date(text, "neither a date nor a relative day"))?;
            now.checked_add_signed(Duration::days(offset))
                .ok_or_else(|| ScrapeError::date(text, "out of range"))
        }
        _ => Err(ScrapeError::date(text, "malformed day or month")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Berlin;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_year_for_month() {
        let now = d(2015, 11, 30);
        for m in 6..=12 {
            assert_eq!(year_for_month(m, now), 2015, "month {}", m);
        }
        for m in 1..=5 {
            assert_eq!(year_for_month(m, now), 2016, "month {}", m);
        }
        let feb = d(2016, 2, 10);
        assert_eq!(year_for_month(8, feb), 2016);
        assert_eq!(year_for_month(9, feb), 2015);
        assert_eq!(year_for_month(12, feb), 2015);
    }

    #[test]
    fn test_resolve_day_heading_with_date() {
        let now = d(2015, 11, 30);
        assert_eq!(resolve_day_heading("Morgen\n,\n31.12.", now).unwrap(), d(2015, 12, 31));
        assert_eq!(resolve_day_heading("Gestern, 17.02.", now).unwrap(), d(2016, 2, 17));
        assert_eq!(resolve_day_heading("tomorrow, 31.12.", now).unwrap(), d(2015, 12, 31));
        assert_eq!(resolve_day_heading("yesterday, 17.02.", now).unwrap(), d(2016, 2, 17));
        assert_eq!(resolve_day_heading("Mittwoch, 21.10.", now).unwrap(), d(2015, 10, 21));
    }

    #[test]
    fn test_resolve_day_heading_relative_and_bare() {
        let now = d(2015, 11, 30);
        assert_eq!(resolve_day_heading("Heute", now).unwrap(), now);
        assert_eq!(resolve_day_heading("gestern", now).unwrap(), d(2015, 11, 29));
        assert_eq!(resolve_day_heading("Morgen", now).unwrap(), d(2015, 12, 1));
        assert_eq!(resolve_day_heading("1.", now).unwrap(), d(2015, 12, 1));
        assert_eq!(resolve_day_heading("28.", now).unwrap(), d(2015, 11, 28));
    }

    #[test]
    fn test_resolve_day_heading_errors() {
        let now = d(2015, 11, 30);
        assert!(matches!(
            resolve_day_heading("Sonntag", now),
            Err(ScrapeError::DateResolution { .. })
        ));
        assert!(resolve_day_heading("30.02.", now).is_err());
        assert!(resolve_day_heading("", now).is_err());
        assert!(resolve_day_heading("Heute, 12:00 Uhr", now).is_err());
    }

    #[test]
    fn test_end_after_crosses_midnight() {
        let start = Berlin.with_ymd_and_hms(2016, 11, 27, 23, 5, 0).unwrap();
        let end = end_after(&start, 0, 0).unwrap();
        assert_eq!(end.to_rfc3339(), "2016-11-28T00:00:00+01:00");

        let start = Berlin.with_ymd_and_hms(2016, 11, 27, 20, 30, 0).unwrap();
        assert_eq!(end_after(&start, 21, 0).unwrap().to_rfc3339(), "2016-11-27T21:00:00+01:00");
        // equal wall clock time means a full day
        assert_eq!(end_after(&start, 20, 30).unwrap().to_rfc3339(), "2016-11-28T20:30:00+01:00");
    }

    #[test]
    fn test_following_midnight_and_dst() {
        let m = following_midnight(&Berlin, d(2015, 10, 24)).unwrap();
        assert_eq!(m.to_rfc3339(), "2015-10-25T00:00:00+02:00");
        // 02:30 happens twice on 2015-10-25, the earlier mapping is CEST
        let amb = at(&Berlin, d(2015, 10, 25), 2, 30).unwrap();
        assert_eq!(amb.to_rfc3339(), "2015-10-25T02:30:00+02:00");
        // 02:30 does not exist on 2015-03-29
        assert!(at(&Berlin, d(2015, 3, 29), 2, 30).is_err());
    }

    #[test]
    fn test_local_timestamps() {
        let t = parse_local_timestamp(&Berlin, "2015-11-30T05:02:03").unwrap();
        assert_eq!(t.to_rfc3339(), "2015-11-30T05:02:03+01:00");
        assert_eq!(format_local_timestamp(&t), "2015-11-30T05:02:03");
        assert!(parse_local_timestamp(&Berlin, "30.11.2015").is_err());
    }

    #[test]
    fn test_listing_date_and_time_of_day() {
        let close = NaiveTime::from_hms_opt(5, 0, 0).unwrap();
        let (h, m) = parse_time_of_day("04:58").unwrap();
        let t = NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(t.minute(), 58);
        assert_eq!(listing_date(d(2015, 10, 22), t, close), d(2015, 10, 23));
        assert_eq!(
            listing_date(d(2015, 10, 22), NaiveTime::from_hms_opt(5, 0, 0).unwrap(), close),
            d(2015, 10, 22)
        );
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("abc").is_err());
    }
}
