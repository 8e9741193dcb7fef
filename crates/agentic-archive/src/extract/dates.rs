//! Date parsing against a fixed, ordered list of formats.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

#[derive(Debug, Clone, Copy)]
enum DateFormat {
    /// No offset in the string; read as UTC.
    Naive(&'static str),
    /// Offset carried in the string.
    Offset(&'static str),
    /// Date only; midnight UTC.
    DateOnly(&'static str),
    Rfc3339,
}

/// Tried in order; the first that parses wins.
const DATE_FORMATS: &[DateFormat] = &[
    DateFormat::Naive("%Y-%m-%dT%H:%M:%S%.fZ"),
    DateFormat::Naive("%Y-%m-%dT%H:%M:%SZ"),
    DateFormat::Offset("%a %b %d %H:%M:%S %z %Y"),
    DateFormat::Offset("%Y-%m-%d %H:%M:%S %z"),
    DateFormat::Rfc3339,
    DateFormat::DateOnly("%d %b %Y"),
];

/// Parse `raw` with the first matching format, normalized to UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|format| parse_with(raw, *format))
}

fn parse_with(raw: &str, format: DateFormat) -> Option<DateTime<Utc>> {
    match format {
        DateFormat::Naive(fmt) => NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|naive| naive.and_utc()),
        DateFormat::Offset(fmt) => DateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        DateFormat::DateOnly(fmt) => NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc()),
        DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}
