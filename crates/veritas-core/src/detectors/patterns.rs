//! Shared detection patterns for detectors.
//!
//! Timestamp recognition is used by both the schema detector (declared
//! temporal fields) and the feature detector (any timestamp-shaped string),
//! so both read the same definitions from here.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Anything that looks like an ISO-8601 date or date-time.
    ///
    /// Deliberately looser than the parser so malformed timestamps
    /// ("2024-13-45T99:00:00Z") are recognized and reported as unparsable.
    pub static ref TIMESTAMP_SHAPE: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?(?:Z|[+-]\d{2}:?\d{2})?$"
    ).unwrap();

    /// Filler vocabulary typical of fabricated or templated text.
    pub static ref PLACEHOLDER_PATTERN: Regex = Regex::new(
        r"(?i)\b(lorem|ipsum|dolor sit amet|foo\s?bar|foo\s?baz|placeholder|dummy|asdf|qwerty|john doe|jane doe|sample text|xxx+)\b"
    ).unwrap();
}

/// Zoned layouts RFC 3339 parsing rejects: offsets without a colon and
/// minute precision.
const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%#z"];

/// Naive date-time layouts accepted after RFC 3339, all read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Check if a string looks like a timestamp (whether or not it parses).
pub fn is_timestamp_shaped(value: &str) -> bool {
    TIMESTAMP_SHAPE.is_match(value.trim())
}

/// Parse the timestamp layouts integration APIs commonly emit.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    // chrono's %z does not take a literal `Z`.
    let zoned = match raw.strip_suffix(['Z', 'z']) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => raw.to_string(),
    };
    for format in ZONED_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(&zoned, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Latest instant not yet considered future, or `None` when `tolerance_secs`
/// pushes it out of range.
pub fn future_horizon(now: DateTime<Utc>, tolerance_secs: i64) -> Option<DateTime<Utc>> {
    TimeDelta::try_seconds(tolerance_secs.max(0)).and_then(|skew| now.checked_add_signed(skew))
}

/// Check if text contains placeholder vocabulary.
pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER_PATTERN.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_timestamp_shape() {
        assert!(is_timestamp_shaped("2024-05-01T12:30:00Z"));
        assert!(is_timestamp_shaped("2024-05-01T12:30:00.123+02:00"));
        assert!(is_timestamp_shaped("2024-05-01 12:30:00"));
        assert!(is_timestamp_shaped("2024-05-01"));
        assert!(is_timestamp_shaped("2024-13-45T99:00:00Z"));
        assert!(!is_timestamp_shaped("CI Pipeline"));
        assert!(!is_timestamp_shaped("123456789"));
        assert!(!is_timestamp_shaped("v2024-05-01"));
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2024-05-01T12:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.day(), 1);
    }

    #[test]
    fn test_parse_naive_forms() {
        assert!(parse_timestamp("2024-05-01T12:30:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00.250").is_some());
        assert!(parse_timestamp("2024-05-01 12:30:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30").is_some());
        let date = parse_timestamp("2024-05-01").unwrap();
        assert_eq!(date.hour(), 0);
        assert_eq!(date.year(), 2024);
    }

    #[test]
    fn test_parse_zoned_forms() {
        let compact = parse_timestamp("2025-06-01T10:00:00+0000").unwrap();
        assert_eq!(compact.hour(), 10);
        let shifted = parse_timestamp("2025-06-01T10:00:00.5-0230").unwrap();
        assert_eq!(shifted.hour(), 12);
        assert_eq!(shifted.minute(), 30);
        let minutes = parse_timestamp("2025-06-01T10:00Z").unwrap();
        assert_eq!(minutes.hour(), 10);
        assert_eq!(parse_timestamp("2025-06-01T10:00+02:00").unwrap().hour(), 8);
        assert_eq!(parse_timestamp("2025-06-01T10:00+0200").unwrap().hour(), 8);
    }

    #[test]
    fn test_every_accepted_shape_parses() {
        for raw in [
            "2025-06-01T10:00:00Z",
            "2025-06-01T10:00:00+0000",
            "2025-06-01T10:00:00.123+02:00",
            "2025-06-01T10:00Z",
            "2025-06-01T10:00+0530",
            "2025-06-01 10:00:00",
            "2025-06-01",
        ] {
            assert!(is_timestamp_shaped(raw), "{}", raw);
            assert!(parse_timestamp(raw).is_some(), "{}", raw);
        }
    }

    #[test]
    fn test_future_horizon() {
        let now = parse_timestamp("2025-06-01T12:00:00Z").unwrap();
        assert_eq!(future_horizon(now, 300).unwrap().minute(), 5);
        assert_eq!(future_horizon(now, -10), Some(now));
        assert!(future_horizon(now, 10_000_000_000_000).is_none());
        assert!(future_horizon(now, i64::MAX).is_none());
    }

    #[test]
    fn test_parse_rejects_impossible_dates() {
        assert!(parse_timestamp("2024-13-45T99:00:00Z").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(contains_placeholder("lorem ipsum test test test"));
        assert!(contains_placeholder("Dummy data for now"));
        assert!(contains_placeholder("John Doe"));
        assert!(!contains_placeholder("CI Pipeline"));
        assert!(!contains_placeholder("test"));
        assert!(!contains_placeholder("not_a_number"));
    }
}
