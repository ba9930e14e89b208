use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Earliest year a MySQL `DATE` or `DATETIME` stores.
const MIN_YEAR: i32 = 1000;
/// Latest year a MySQL `DATE` or `DATETIME` stores.
const MAX_YEAR: i32 = 9999;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Parses a timestamp and normalizes it to UTC.
///
/// Accepts RFC 3339, ISO 8601 with a `+hhmm` offset, naive date-times (taken as UTC) and bare
/// dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> SinkResult<DateTime<Utc>> {
    let value = value.trim();

    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            OFFSET_DATETIME_FORMATS.iter().find_map(|format| {
                DateTime::parse_from_str(value, format)
                    .ok()
                    .map(|timestamp| timestamp.with_timezone(&Utc))
            })
        })
        .or_else(|| {
            NAIVE_DATETIME_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|timestamp| timestamp.and_utc())
            })
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|timestamp| timestamp.and_utc())
        });

    let Some(timestamp) = parsed else {
        bail!(
            ErrorKind::ConversionError,
            "Invalid timestamp value",
            format!("`{value}` is not an ISO 8601 timestamp")
        );
    };

    check_year(timestamp.year(), value)?;

    Ok(timestamp)
}

/// Parses a `YYYY-MM-DD` date, or the date part of a timestamp.
pub fn parse_date(value: &str) -> SinkResult<NaiveDate> {
    let trimmed = value.trim();

    let date = match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => parse_timestamp(trimmed)?.date_naive(),
    };

    check_year(date.year(), trimmed)?;

    Ok(date)
}

/// Parses a time of day with optional fractional seconds.
pub fn parse_time(value: &str) -> SinkResult<NaiveTime> {
    let value = value.trim();

    match TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
    {
        Some(time) => Ok(time),
        None => bail!(
            ErrorKind::ConversionError,
            "Invalid time value",
            format!("`{value}` is not a time of day")
        ),
    }
}

fn check_year(year: i32, value: &str) -> SinkResult<()> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        bail!(
            ErrorKind::ConversionError,
            "Date is outside the range MySQL stores",
            format!("`{value}` is not between years {MIN_YEAR} and {MAX_YEAR}")
        );
    }

    Ok(())
}
