//! Show-date parsing and scheduled-event time windows.
//!
//! The tour page encodes dates as `YY-Mon-DD` (`25-Jun-06` means
//! 2025-06-06); display form is `06 June 2025`. Single-day shows get a
//! 19:00–23:00 event window; ranges run 08:00 on the first day to 23:00 on
//! the last.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

const SHOW_START_HOUR: u32 = 19;
const RANGE_START_HOUR: u32 = 8;
const SHOW_END_HOUR: u32 = 23;
const FALLBACK_WINDOW_HOURS: i64 = 4;

/// Parses the tour page's raw `YY-Mon-DD` form.
pub fn parse_raw_date(raw: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = raw.trim().split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let composed = format!("20{} {} {}", parts[0].trim(), parts[1].trim(), parts[2].trim());
    NaiveDate::parse_from_str(&composed, "%Y %b %d").ok()
}

/// Display form used for thread titles and event names: `06 June 2025`.
pub fn display_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

/// Converts a raw date into display form, falling back to the raw text when
/// the site changes format under us (the raw text still yields a stable
/// identity key).
pub fn display_from_raw(raw: &str) -> String {
    match parse_raw_date(raw) {
        Some(date) => display_date(date),
        None => raw.trim().to_string(),
    }
}

/// Resolves a display-form date (or ` - `-separated range) into the
/// scheduled event's start and end instants in `tz`. Unparseable input
/// falls back to a window starting now.
pub fn event_window(display: &str, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    if let Some((start_raw, end_raw)) = display.split_once(" - ") {
        let start = parse_display_date(start_raw);
        let end = parse_display_date(end_raw);
        if let (Some(start), Some(end)) = (start, end) {
            if let (Some(start), Some(end)) = (
                local_instant(start, RANGE_START_HOUR, tz),
                local_instant(end, SHOW_END_HOUR, tz),
            ) {
                return (start, end);
            }
        }
    } else if let Some(date) = parse_display_date(display) {
        if let (Some(start), Some(end)) = (
            local_instant(date, SHOW_START_HOUR, tz),
            local_instant(date, SHOW_END_HOUR, tz),
        ) {
            return (start, end);
        }
    }

    let now = Utc::now();
    (now, now + chrono::Duration::hours(FALLBACK_WINDOW_HOURS))
}

fn parse_display_date(display: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(display.trim(), "%d %B %Y").ok()
}

fn local_instant(date: NaiveDate, hour: u32, tz: Tz) -> Option<DateTime<Utc>> {
    tz.with_ymd_and_hms(date.year(), date.month(), date.day(), hour, 0, 0)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
