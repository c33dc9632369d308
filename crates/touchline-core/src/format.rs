// Display helpers for match dates and statuses.

use std::fmt::Write;

use chrono::{DateTime, NaiveDate, Utc};

/// Placeholder for a match without a date.
pub const TBD: &str = "TBD";

pub const DEFAULT_DATE_FORMAT: &str = "%b %-d, %Y";
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";

/// Render `value` with a strftime pattern. An invalid pattern yields the
/// RFC 3339 form instead of panicking.
fn render(formatted: impl std::fmt::Display, fallback: impl FnOnce() -> String) -> String {
    let mut out = String::new();
    match write!(out, "{formatted}") {
        Ok(()) => out,
        Err(_) => fallback(),
    }
}

pub fn format_date(date: Option<&DateTime<Utc>>, fmt: &str) -> String {
    match date {
        Some(d) => render(d.format(fmt), || d.to_rfc3339()),
        None => TBD.to_string(),
    }
}

pub fn format_time(date: Option<&DateTime<Utc>>, fmt: &str) -> String {
    match date {
        Some(d) => render(d.format(fmt), || d.to_rfc3339()),
        None => TBD.to_string(),
    }
}

/// League start/end dates carry no time of day.
pub fn format_day(day: Option<&NaiveDate>, fmt: &str) -> String {
    match day {
        Some(d) => render(d.format(fmt), || d.to_string()),
        None => "-".to_string(),
    }
}

/// "ongoing" -> "Ongoing".
pub fn status_label(status: &str) -> String {
    let mut chars = status.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
