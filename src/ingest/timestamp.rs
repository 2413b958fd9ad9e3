//! Timestamp normalization for scanner-reported times.
//!
//! The external scanner reports timestamps as `M/d/yy h:mm tt` local time
//! (e.g. `"1/3/26 12:09 AM"`). These are normalized to ISO 8601 UTC instants
//! for storage and range queries. The conversion treats the wall-clock value
//! as local time without exact DST modeling; a timestamp falling inside a DST
//! gap is treated as UTC.

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// ISO 8601 with millisecond precision, matching the stored `*_iso` columns.
const ISO_MILLIS: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_iso(dt: DateTime<Utc>) -> String {
    dt.format(ISO_MILLIS).to_string()
}

pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// Parse `M/d/yy h:mm tt` into a naive local wall-clock time.
///
/// Two-digit years map to 2000+yy. On the 12-hour clock, 12 AM is hour 0 and
/// 12 PM stays 12. Returns `None` for anything that does not match.
pub fn parse_scan_time(s: &str) -> Option<NaiveDateTime> {
    let mut parts = s.split_whitespace();
    let date = parts.next()?;
    let time = parts.next()?;
    let meridiem = parts.next()?;
    if parts.next().is_some() {
        return None;
    }

    let mut date_parts = date.split('/');
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    let year_part = date_parts.next()?;
    if date_parts.next().is_some() || year_part.len() != 2 {
        return None;
    }
    let year: i32 = 2000 + year_part.parse::<i32>().ok()?;

    let mut time_parts = time.split(':');
    let hour12: u32 = time_parts.next()?.parse().ok()?;
    let minute: u32 = time_parts.next()?.parse().ok()?;
    if time_parts.next().is_some() || !(1..=12).contains(&hour12) {
        return None;
    }

    let hour = if meridiem.eq_ignore_ascii_case("PM") {
        if hour12 == 12 {
            12
        } else {
            hour12 + 12
        }
    } else if meridiem.eq_ignore_ascii_case("AM") {
        if hour12 == 12 {
            0
        } else {
            hour12
        }
    } else {
        return None;
    };

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
}

/// Normalize a scanner timestamp string to an ISO 8601 UTC instant.
pub fn normalize_scan_time(s: &str) -> Option<String> {
    let naive = parse_scan_time(s)?;
    let instant = match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // DST fall-back: take the earlier of the two instants
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        // DST spring-forward gap: the wall-clock time never existed locally
        LocalResult::None => naive.and_utc(),
    };
    Some(format_iso(instant))
}

/// Normalize, falling back to the current instant when the string does not
/// match the scanner format. Callers that need a hard failure instead use
/// [`normalize_scan_time`].
pub fn normalize_or_now(s: &str) -> String {
    normalize_scan_time(s).unwrap_or_else(now_iso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn midnight_is_hour_zero() {
        let dt = parse_scan_time("1/3/26 12:09 AM").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2026, 1, 3).unwrap());
        assert_eq!(dt.hour(), 0);
        assert_eq!(dt.minute(), 9);
    }

    #[test]
    fn noon_stays_twelve() {
        let dt = parse_scan_time("12/31/25 12:00 PM").unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert_eq!(dt.hour(), 12);
        assert_eq!(dt.minute(), 0);
    }

    #[test]
    fn pm_hours_shift_by_twelve() {
        let dt = parse_scan_time("6/15/25 3:45 PM").unwrap();
        assert_eq!(dt.hour(), 15);
        assert_eq!(dt.minute(), 45);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_scan_time("").is_none());
        assert!(parse_scan_time("not a date").is_none());
        assert!(parse_scan_time("2026-01-03T00:09:00Z").is_none());
        assert!(parse_scan_time("1/3/2026 12:09 AM").is_none());
        assert!(parse_scan_time("13/3/26 1:09 AM").is_none());
        assert!(parse_scan_time("1/3/26 0:09 AM").is_none());
        assert!(parse_scan_time("1/3/26 1:09 XM").is_none());
        assert!(parse_scan_time("1/3/26 1:09 AM extra").is_none());
    }

    #[test]
    fn fallback_uses_current_instant() {
        let before = now_iso();
        let normalized = normalize_or_now("garbage");
        let after = now_iso();
        assert!(normalized >= before && normalized <= after);
    }

    #[test]
    fn iso_format_has_millis_and_zulu() {
        let dt = Utc.with_ymd_and_hms(2025, 6, 1, 10, 15, 0).unwrap();
        assert_eq!(format_iso(dt), "2025-06-01T10:15:00.000Z");
    }
}
