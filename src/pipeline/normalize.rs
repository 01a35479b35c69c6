use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::common::error::NormalizationError;
use crate::domain::{NormalizedEvent, RawListing};

/// Exact date formats tried, in order, before giving up on a string.
/// Day-first formats come before month-first: most covered sources are
/// European.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d.%m.%Y",
];

static TIME_12H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?\s*([AaPp])\.?[Mm]\.?$").unwrap());
static TIME_24H: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());

/// Convert one raw listing into the canonical shape. Fails only when the
/// title or the date cannot be resolved to a concrete value; a missing
/// time is "unknown", not an error.
pub fn normalize(
    listing: &RawListing,
    reference_date: NaiveDate,
) -> Result<NormalizedEvent, NormalizationError> {
    let title = listing.title.trim();
    if title.is_empty() {
        return Err(NormalizationError::MissingTitle);
    }

    let city = resolve_city(&listing.raw_location).ok_or(NormalizationError::MissingLocation)?;
    let date = resolve_date(&listing.raw_date, reference_date)?;
    let time = listing.raw_time.as_deref().and_then(normalize_time);

    Ok(NormalizedEvent {
        title: title.to_string(),
        city,
        date,
        time,
        url: listing.url.clone(),
        source_id: listing.source_id.clone(),
        description: listing
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
    })
}

/// Resolve a free-text date against the run's reference date.
///
/// "Today" and "Tomorrow" are relative to the reference date so results
/// do not drift between ingestion and display. Any "Next ..." phrase is a
/// flat one-week offset regardless of which day it names; coarse, but
/// kept deliberately (callers treat it as a documented approximation).
pub fn resolve_date(raw: &str, reference_date: NaiveDate) -> Result<NaiveDate, NormalizationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::UnresolvableDate(raw.to_string()));
    }

    if trimmed.eq_ignore_ascii_case("today") {
        return Ok(reference_date);
    }
    if trimmed.eq_ignore_ascii_case("tomorrow") {
        return Ok(reference_date + Duration::days(1));
    }
    if trimmed
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("next"))
    {
        return Ok(reference_date + Duration::days(7));
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }

    // Timestamp-shaped strings ("2025-06-01T19:00:00Z") carry their date
    // in the first ten characters.
    if trimmed.as_bytes().get(10) == Some(&b'T') {
        if let Some(prefix) = trimmed.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Ok(date);
            }
        }
    }

    Err(NormalizationError::UnresolvableDate(raw.to_string()))
}

/// Normalize a free-text time to 24-hour `HH:MM`. Accepts 12-hour strings
/// with an AM/PM suffix and already-24-hour strings; anything else is
/// "time unknown" rather than a failure.
pub fn normalize_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();

    if let Some(caps) = TIME_12H.captures(trimmed) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let meridiem = caps[3].to_ascii_uppercase();
        let hour24 = match (hour, meridiem.as_str()) {
            (12, "A") => 0,
            (12, "P") => 12,
            (h, "A") => h,
            (h, _) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour24, minute, 0);
    }

    if let Some(caps) = TIME_24H.captures(trimmed) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    None
}

/// City from a free-text location: the leading comma-delimited component,
/// title-cased. "rome, lazio" and "ROME" both resolve to "Rome".
pub fn resolve_city(raw_location: &str) -> Option<String> {
    let first = raw_location.split(',').next()?.trim();
    if first.is_empty() {
        return None;
    }
    let city = first
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Some(city)
}

/// Human-readable "1 June 2025, 15:00" composition for logs and reports.
/// Storage always keeps the structured date and time, never this string.
pub fn format_event_datetime(date: NaiveDate, time: Option<NaiveTime>) -> String {
    let day = date.day();
    let month = date.format("%B");
    let year = date.year();
    match time {
        Some(t) => format!("{day} {month} {year}, {}", t.format("%H:%M")),
        None => format!("{day} {month} {year}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn listing(title: &str, date: &str, time: Option<&str>, location: &str) -> RawListing {
        RawListing {
            source_id: "test-source".to_string(),
            external_id: None,
            title: title.to_string(),
            raw_date: date.to_string(),
            raw_time: time.map(str::to_string),
            raw_location: location.to_string(),
            description: None,
            url: None,
        }
    }

    #[test]
    fn today_and_tomorrow_resolve_against_reference() {
        assert_eq!(resolve_date("Today", reference()).unwrap(), reference());
        assert_eq!(resolve_date("today", reference()).unwrap(), reference());
        assert_eq!(
            resolve_date("Tomorrow", reference()).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
    }

    #[test]
    fn next_tokens_resolve_one_week_out() {
        // Documented limitation: every "Next ..." phrase is a flat +7
        // days, not day-of-week aware. "Next Sunday" on a Sunday
        // reference therefore lands exactly one week later.
        let expected = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        assert_eq!(resolve_date("Next Sunday", reference()).unwrap(), expected);
        assert_eq!(resolve_date("Next Week", reference()).unwrap(), expected);
        assert_eq!(resolve_date("next friday", reference()).unwrap(), expected);
    }

    #[test]
    fn exact_formats_parse() {
        let expected = NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();
        assert_eq!(resolve_date("2025-06-07", reference()).unwrap(), expected);
        assert_eq!(resolve_date("07/06/2025", reference()).unwrap(), expected);
        assert_eq!(resolve_date("7 June 2025", reference()).unwrap(), expected);
        assert_eq!(resolve_date("June 7, 2025", reference()).unwrap(), expected);
        assert_eq!(resolve_date("07.06.2025", reference()).unwrap(), expected);
        assert_eq!(
            resolve_date("2025-06-07T19:00:00Z", reference()).unwrap(),
            expected
        );
    }

    #[test]
    fn garbage_dates_fail() {
        assert!(resolve_date("soonish", reference()).is_err());
        assert!(resolve_date("", reference()).is_err());
        assert!(resolve_date("32/13/2025", reference()).is_err());
    }

    #[test]
    fn twelve_hour_times_convert() {
        assert_eq!(
            normalize_time("12:00 AM").unwrap(),
            NaiveTime::from_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_time("12:00 PM").unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_time("1:05 PM").unwrap(),
            NaiveTime::from_hms_opt(13, 5, 0).unwrap()
        );
        assert_eq!(
            normalize_time("9 am").unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_time("11:45 p.m.").unwrap(),
            NaiveTime::from_hms_opt(23, 45, 0).unwrap()
        );
    }

    #[test]
    fn twenty_four_hour_times_pass_through() {
        assert_eq!(
            normalize_time("15:00").unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap()
        );
        assert_eq!(
            normalize_time("7:05").unwrap(),
            NaiveTime::from_hms_opt(7, 5, 0).unwrap()
        );
    }

    #[test]
    fn unknown_times_are_none_not_errors() {
        assert_eq!(normalize_time("evening"), None);
        assert_eq!(normalize_time(""), None);
        assert_eq!(normalize_time("25:00"), None);
        assert_eq!(normalize_time("13:00 PM"), None);
    }

    #[test]
    fn city_takes_first_component_title_cased() {
        assert_eq!(resolve_city("Rome, Lazio, Italy").unwrap(), "Rome");
        assert_eq!(resolve_city("  MILAN ").unwrap(), "Milan");
        assert_eq!(resolve_city("new york").unwrap(), "New York");
        assert_eq!(resolve_city(""), None);
        assert_eq!(resolve_city("   ,  IT"), None);
    }

    #[test]
    fn normalize_requires_title_and_date() {
        let no_title = listing("   ", "Today", None, "Rome");
        assert!(matches!(
            normalize(&no_title, reference()),
            Err(NormalizationError::MissingTitle)
        ));

        let no_date = listing("Climate March", "whenever", None, "Rome");
        assert!(matches!(
            normalize(&no_date, reference()),
            Err(NormalizationError::UnresolvableDate(_))
        ));
    }

    #[test]
    fn normalize_happy_path() {
        let raw = listing("  Climate March ", "Today", Some("3:00 PM"), "Rome, Italy");
        let event = normalize(&raw, reference()).unwrap();
        assert_eq!(event.title, "Climate March");
        assert_eq!(event.city, "Rome");
        assert_eq!(event.date, reference());
        assert_eq!(event.time, NaiveTime::from_hms_opt(15, 0, 0));
    }

    #[test]
    fn display_composition_is_not_stored_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let time = NaiveTime::from_hms_opt(15, 0, 0);
        assert_eq!(format_event_datetime(date, time), "1 June 2025, 15:00");
        assert_eq!(format_event_datetime(date, None), "1 June 2025");
    }
}
