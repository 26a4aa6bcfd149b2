//! Date, duration and period normalization shared by the text extractors.

use chrono::{Datelike, Days, NaiveDate};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Month number (1-12) from a name or abbreviation.
pub fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    MONTHS.iter().position(|m| *m == prefix).map(|i| i as u32 + 1)
}

/// Interpret `m/d/y` numerals. Falls back to `d/m/y` when the first part cannot be a month.
pub fn slash_date(first: u32, second: u32, year: i32) -> Option<NaiveDate> {
    let year = if year < 100 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(year, first, second).or_else(|| NaiveDate::from_ymd_opt(year, second, first))
}

/// Resolve a relative start term against the submission's receipt date.
pub fn resolve_relative(term: &str, reference: NaiveDate) -> Option<NaiveDate> {
    match term.to_ascii_lowercase().trim() {
        "asap" | "as soon as possible" | "immediately" | "today" => Some(reference),
        "tomorrow" => reference.checked_add_days(Days::new(1)),
        "next week" => reference.checked_add_days(Days::new(7)),
        "next month" => {
            let (year, month) = if reference.month() == 12 {
                (reference.year() + 1, 1)
            } else {
                (reference.year(), reference.month() + 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1)
        }
        _ => None,
    }
}

/// Convert a work duration into calendar days. Hours count against an 8-hour working day.
pub fn duration_in_days(amount: u32, unit: &str) -> Option<u32> {
    let unit = unit.to_ascii_lowercase();
    let days = if unit.starts_with('h') {
        amount.div_ceil(8)
    } else if unit.starts_with('d') {
        amount
    } else if unit.starts_with('w') {
        amount.checked_mul(7)?
    } else if unit.starts_with("mo") {
        amount.checked_mul(30)?
    } else {
        return None;
    };
    (days > 0).then_some(days)
}

/// Normalized warranty period text: "1 year", "6 months", "90 days".
pub fn format_period(amount: u32, unit: &str) -> Option<String> {
    let unit = unit.to_ascii_lowercase();
    let base = if unit.starts_with('y') {
        "year"
    } else if unit.starts_with("mo") {
        "month"
    } else if unit.starts_with('d') {
        "day"
    } else {
        return None;
    };
    let plural = if amount == 1 { "" } else { "s" };
    Some(format!("{amount} {base}{plural}"))
}

/// Warranty months as period text, preferring whole years.
pub fn months_as_period(months: u32) -> String {
    if months > 0 && months % 12 == 0 {
        let years = months / 12;
        format!("{years} year{}", if years == 1 { "" } else { "s" })
    } else {
        format!("{months} month{}", if months == 1 { "" } else { "s" })
    }
}
