//! Parsers that turn the human-readable labels rendered by the platform into
//! canonical values.
//!
//! None of these functions fail: a label that cannot be understood degrades
//! to `None` (or to the zero duration) so a single malformed field never
//! aborts the record it belongs to.

use std::sync::LazyLock;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Output format shared by every timestamp in the response.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Duration returned for anything `parse_duration` cannot read.
pub const ZERO_DURATION: &str = "PT0S";

static MAGNITUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([\d,.]+)([KMB])?").expect("magnitude regex"));

static RELATIVE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago")
        .expect("relative time regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parses `"3.1K subscribers"`, `"234,567 views"` or `"2M"` into an integer.
///
/// Only the uppercase suffixes `K`, `M` and `B` scale the number. A lowercase
/// `k` is not a suffix, so `"3.1k"` reads as `3`.
pub fn parse_magnitude(text: &str) -> Option<u64> {
    let captures = MAGNITUDE.captures(text.trim())?;
    let digits = captures.get(1)?.as_str().replace(',', "");
    let multiplier: u64 = match captures.get(2).map(|m| m.as_str()) {
        Some("K") => 1_000,
        Some("M") => 1_000_000,
        Some("B") => 1_000_000_000,
        _ => 1,
    };
    scale_decimal(&digits, multiplier)
}

/// Multiplies a plain decimal string by `multiplier` in integer arithmetic and
/// truncates the result, so `"3.1"` x 1000 is exactly 3100.
fn scale_decimal(digits: &str, multiplier: u64) -> Option<u64> {
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole_value = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().ok()?
    };
    let mut total = whole_value.checked_mul(multiplier)?;

    // Digits past the multiplier's precision cannot contribute after truncation.
    let mut scale = multiplier;
    for digit in fraction.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        total = total.checked_add(u64::from(digit - b'0') * scale)?;
    }
    Some(total)
}

/// Converts `"3 days ago"` into an absolute local timestamp relative to now.
pub fn parse_relative_time(text: &str) -> Option<String> {
    parse_relative_time_at(text, Local::now().naive_local())
}

/// Same as [`parse_relative_time`] but against a fixed reference time.
///
/// Months count as 30 days and years as 365 days.
pub fn parse_relative_time_at(text: &str, now: NaiveDateTime) -> Option<String> {
    let captures = RELATIVE_TIME.captures(text)?;
    let amount: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();

    let offset = match unit.as_str() {
        "second" => Duration::try_seconds(amount),
        "minute" => Duration::try_minutes(amount),
        "hour" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        "month" => amount.checked_mul(30).and_then(Duration::try_days),
        "year" => amount.checked_mul(365).and_then(Duration::try_days),
        _ => None,
    }?;

    let published = now.checked_sub_signed(offset)?;
    Some(published.format(TIMESTAMP_FORMAT).to_string())
}

/// Converts `SS`, `MM:SS` or `HH:MM:SS` into `PT[<H>H][<M>M]<S>S`.
pub fn parse_duration(text: &str) -> String {
    let parts: Option<Vec<u64>> = text
        .trim()
        .split(':')
        .map(|part| {
            let part = part.trim();
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                None
            } else {
                part.parse::<u64>().ok()
            }
        })
        .collect();

    match parts.as_deref() {
        Some([seconds]) => format!("PT{seconds}S"),
        Some([minutes, seconds]) => format!("PT{minutes}M{seconds}S"),
        Some([hours, minutes, seconds]) => format!("PT{hours}H{minutes}M{seconds}S"),
        _ => ZERO_DURATION.to_string(),
    }
}

/// Parses `"Joined Jan 1, 2022"` (or just `"Jan 1, 2022"`) into a midnight
/// timestamp.
pub fn parse_joined_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix("Joined").unwrap_or(trimmed).trim();

    let (month_part, rest) = trimmed.split_once(char::is_whitespace)?;
    let (day_part, year_part) = rest.trim().split_once(',')?;

    let month_key = month_part.get(..3)?.to_ascii_lowercase();
    let month = MONTHS.iter().position(|candidate| *candidate == month_key)? as u32 + 1;
    let day: u32 = day_part.trim().parse().ok()?;
    let year: i32 = year_part.trim().parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.and_hms_opt(0, 0, 0)?.format(TIMESTAMP_FORMAT).to_string())
}
