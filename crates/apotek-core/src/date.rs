//! # Date Parsing
//!
//! The client sends dates as `YYYY-MM-DD ±HHMMTZ`, for example
//! `"2024-06-03 +0700WIB"`. The zone abbreviation is informational; the
//! numeric offset decides the calendar day.
//!
//! ## Day Windows
//! ```text
//! "2024-06-03 +0700WIB"
//!      │
//!      ▼
//! 2024-06-03T00:00:00+07:00                  (parse_date)
//!      │
//!      ├── start_of_day → 2024-06-03T00:00:00.000000000+07:00
//!      └── end_of_day   → 2024-06-03T23:59:59.999999999+07:00
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::error::{CoreError, CoreResult};

/// Parses a `YYYY-MM-DD ±HHMMTZ` string into midnight at that offset.
///
/// ## Example
/// ```rust
/// use apotek_core::date::parse_date;
///
/// let date = parse_date("2024-06-03 +0700WIB").unwrap();
/// assert_eq!(date.to_rfc3339(), "2024-06-03T00:00:00+07:00");
/// ```
pub fn parse_date(input: &str) -> CoreResult<DateTime<FixedOffset>> {
    let invalid = |reason: &str| CoreError::InvalidDate {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let (date_part, zone_part) = input
        .trim()
        .split_once(' ')
        .ok_or_else(|| invalid("expected 'YYYY-MM-DD ±HHMMTZ'"))?;

    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| invalid(&e.to_string()))?;

    let zone_part = zone_part.trim();
    if zone_part.len() < 5 || !zone_part.is_char_boundary(5) {
        return Err(invalid("missing UTC offset"));
    }
    let (offset_part, abbreviation) = zone_part.split_at(5);

    if !abbreviation.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid("zone abbreviation must be letters"));
    }

    let offset = parse_offset(offset_part).ok_or_else(|| invalid("bad UTC offset"))?;

    offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| invalid("ambiguous local time"))
}

/// Parses `±HHMM` into a fixed offset.
fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let sign = match raw.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };

    let digits = raw.get(1..)?;
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Midnight of the calendar day of `date`, in its own offset.
pub fn start_of_day(date: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    date - (date.time() - NaiveTime::MIN)
}

/// Last representable instant of the calendar day of `date`.
pub fn end_of_day(date: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    start_of_day(date) + Duration::days(1) - Duration::nanoseconds(1)
}

/// `YYYY-MM-DD` key of the local calendar day, used for per-day uniqueness.
pub fn day_key(date: DateTime<FixedOffset>) -> String {
    date.format("%Y-%m-%d").to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
