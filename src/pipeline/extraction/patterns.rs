//! Regex baseline extractor: prices, dates, durations and warranty periods.
//!
//! Always available and deterministic. Other extractors refine what it finds;
//! the mapper keeps every proposal.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};

use super::dates::{duration_in_days, format_period, month_number, resolve_relative, slash_date};
use super::{dedupe_candidates, Candidate, CandidateExtractor, ExtractionError, ExtractionInput};
use crate::models::fields::{self, parse_money};
use crate::models::ExtractionMethod;

/// Numeric amount with optional thousands separators and cents.
pub(crate) const AMOUNT: &str = r"(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)";

/// Pattern confidences
pub mod weights {
    pub const ANCHORED_CURRENCY_PRICE: f64 = 0.95;
    pub const ANCHORED_BARE_PRICE: f64 = 0.80;
    pub const CURRENCY_ONLY_PRICE: f64 = 0.60;
    pub const CONTEXTUAL_DURATION: f64 = 0.95;
    pub const BARE_DURATION: f64 = 0.75;
    pub const CONTEXTUAL_DATE: f64 = 0.85;
    pub const BARE_DATE: f64 = 0.55;
    pub const RELATIVE_DATE: f64 = 0.70;
    pub const WARRANTY_PERIOD: f64 = 0.95;
    pub const WARRANTY_AFTER_KEYWORD: f64 = 0.85;
}

static ANCHORED_PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:total|quoted?|estimated?)\b[^\d$€£#\n]{{0,25}}?([$€£])?\s?{AMOUNT}"
    ))
    .unwrap()
});

static CURRENCY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"([$€£])\s?{AMOUNT}")).unwrap());

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})\s*-?\s*(hours?|hrs?|days?|weeks?|wks?|months?)\b").unwrap()
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})\b").unwrap());

static MONTH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
    .unwrap()
});

static RELATIVE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(tomorrow|next week|next month|asap|as soon as possible|immediately)\b").unwrap()
});

static WARRANTY_PERIOD_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,3})[\s-]*(years?|yrs?|months?|days?)\b[\s\w-]{0,25}?\b(?:warranty|guarantee)")
        .unwrap()
});

static WARRANTY_PERIOD_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:warranty|warrantied|guaranteed?)\b[^\d\n]{0,20}?(\d{1,3})[\s-]*(years?|yrs?|months?|days?)\b")
        .unwrap()
});

/// Clause words that mean a duration is not about the work itself.
const NON_WORK_DURATION_WORDS: &[&str] = &["warrant", "guarant", "valid", "expire", "payment", "invoice", "due"];
const WORK_DURATION_WORDS: &[&str] = &[
    "complet", "finish", "take", "duration", "within", "job", "work", "done", "approx", "about", "estimated",
    " in ",
];
const START_WORDS: &[&str] = &["start", "begin", "commence", "available", "mobiliz"];
const COMPLETION_WORDS: &[&str] = &["complet", "finish", "done", "deadline", "by "];

/// Regex baseline over recognized text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternExtractor;

impl CandidateExtractor for PatternExtractor {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Pattern
    }

    fn applies_to(&self, input: &ExtractionInput) -> bool {
        input.text_str().is_some()
    }

    fn extract(&self, input: &ExtractionInput) -> Result<Vec<Candidate>, ExtractionError> {
        let Some(text) = input.text.as_ref() else {
            return Ok(Vec::new());
        };
        let scale = text.candidate_scale();
        let candidates = scan(&text.text, input.reference_date)
            .into_iter()
            .map(|mut c| {
                c.confidence *= scale;
                c
            })
            .collect();
        Ok(candidates)
    }
}

/// Run every baseline pattern over `text`.
pub fn scan(text: &str, reference: NaiveDate) -> Vec<Candidate> {
    let mut out = Vec::new();

    for (amount, confidence) in price_matches(text) {
        out.push(pattern(fields::PRICING_TOTAL, format!("{amount:.2}"), confidence));
    }
    scan_durations(text, &mut out);
    scan_dates(text, reference, &mut out);
    scan_warranty(text, &mut out);

    dedupe_candidates(out)
}

/// Best single total for the fast pass: the most confident price, largest on ties.
pub fn quick_total(text: &str) -> Option<f64> {
    price_matches(text)
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)))
        .map(|(amount, _)| amount)
}

fn pattern(field: &str, value: String, confidence: f64) -> Candidate {
    Candidate::new(field, value, confidence, ExtractionMethod::Pattern)
}

/// (amount, confidence) for each price-like match. Anchored phrases win;
/// without any, the largest currency amount is offered at low confidence.
fn price_matches(text: &str) -> Vec<(f64, f64)> {
    let mut found = Vec::new();
    for caps in ANCHORED_PRICE.captures_iter(text) {
        let Some(end) = caps.get(0).map(|m| m.end()) else { continue };
        if continues_as_non_price(&text[end..]) {
            continue;
        }
        let Some(amount) = caps.get(2).and_then(|m| parse_money(m.as_str())) else { continue };
        let confidence = if caps.get(1).is_some() {
            weights::ANCHORED_CURRENCY_PRICE
        } else {
            weights::ANCHORED_BARE_PRICE
        };
        found.push((amount, confidence));
    }

    if found.is_empty() {
        let largest = CURRENCY_AMOUNT
            .captures_iter(text)
            .filter(|caps| caps.get(0).is_some_and(|m| !continues_as_non_price(&text[m.end()..])))
            .filter_map(|caps| caps.get(2).and_then(|m| parse_money(m.as_str())))
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))));
        if let Some(amount) = largest {
            found.push((amount, weights::CURRENCY_ONLY_PRICE));
        }
    }
    found
}

/// True when the text right after a number shows it is a date, rate, or duration.
fn continues_as_non_price(rest: &str) -> bool {
    if rest.starts_with(['-', '/']) || rest.starts_with(|c: char| c.is_ascii_digit()) {
        return true;
    }
    let trimmed = rest.trim_start();
    if trimmed.starts_with('%') || trimmed.starts_with('/') {
        return true;
    }
    let word = next_word(trimmed);
    ["hour", "hr", "day", "week", "wk", "month", "year", "yr", "per"]
        .iter()
        .any(|unit| word.starts_with(unit))
}

fn next_word(text: &str) -> String {
    text.split(|c: char| !c.is_alphabetic())
        .next()
        .unwrap_or("")
        .to_lowercase()
}

/// Lowercased text of the clause preceding byte offset `start`, at most `max_chars` long.
fn clause_before(text: &str, start: usize, max_chars: usize) -> String {
    let head = &text[..start];
    let window_start = head
        .char_indices()
        .rev()
        .nth(max_chars.saturating_sub(1))
        .map_or(0, |(i, _)| i);
    let window = &head[window_start..];
    let clause = match window.rfind([',', ';', '.', '\n', '!', '?']) {
        Some(i) => &window[i + 1..],
        None => window,
    };
    format!(" {}", clause.to_lowercase())
}

fn scan_durations(text: &str, out: &mut Vec<Candidate>) {
    for caps in DURATION.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let following = next_word(text[whole.end()..].trim_start());
        if following.starts_with("warrant") || following.starts_with("guarant") {
            continue;
        }
        let clause = clause_before(text, whole.start(), 40);
        if NON_WORK_DURATION_WORDS.iter().any(|w| clause.contains(w))
            || clause.split_whitespace().any(|w| w == "net")
        {
            continue;
        }
        let Some(days) = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .zip(caps.get(2))
            .and_then(|(n, unit)| duration_in_days(n, unit.as_str()))
        else {
            continue;
        };
        let confidence = if WORK_DURATION_WORDS.iter().any(|w| clause.contains(w)) {
            weights::CONTEXTUAL_DURATION
        } else {
            weights::BARE_DURATION
        };
        out.push(pattern(fields::TIMELINE_DURATION_DAYS, days.to_string(), confidence));
    }
}

fn scan_dates(text: &str, reference: NaiveDate, out: &mut Vec<Candidate>) {
    let mut push = |start: usize, date: Option<NaiveDate>| {
        if let Some(date) = date {
            let (field, confidence) = date_role(&clause_before(text, start, 40));
            out.push(pattern(field, date.to_string(), confidence));
        }
    };

    for caps in ISO_DATE.captures_iter(text) {
        let date = (|| {
            NaiveDate::from_ymd_opt(num(&caps, 1)? as i32, num(&caps, 2)?, num(&caps, 3)?)
        })();
        push(start_of(&caps), date);
    }
    for caps in SLASH_DATE.captures_iter(text) {
        let date = (|| slash_date(num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)? as i32))();
        push(start_of(&caps), date);
    }
    for caps in MONTH_DATE.captures_iter(text) {
        let date = (|| {
            let month = month_number(caps.get(1)?.as_str())?;
            NaiveDate::from_ymd_opt(num(&caps, 3)? as i32, month, num(&caps, 2)?)
        })();
        push(start_of(&caps), date);
    }

    for caps in RELATIVE_START.captures_iter(text) {
        if let Some(date) = caps.get(1).and_then(|m| resolve_relative(m.as_str(), reference)) {
            out.push(pattern(fields::TIMELINE_START_DATE, date.to_string(), weights::RELATIVE_DATE));
        }
    }
}

fn num(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn start_of(caps: &Captures<'_>) -> usize {
    caps.get(0).map_or(0, |m| m.start())
}

/// Decide whether a date is a start or a completion date from the closest keyword before it.
fn date_role(clause: &str) -> (&'static str, f64) {
    let last_of = |words: &[&str]| words.iter().filter_map(|w| clause.rfind(w)).max();
    match (last_of(START_WORDS), last_of(COMPLETION_WORDS)) {
        (Some(s), Some(c)) if c > s => (fields::TIMELINE_COMPLETION_DATE, weights::CONTEXTUAL_DATE),
        (Some(_), _) => (fields::TIMELINE_START_DATE, weights::CONTEXTUAL_DATE),
        (None, Some(_)) => (fields::TIMELINE_COMPLETION_DATE, weights::CONTEXTUAL_DATE),
        (None, None) => (fields::TIMELINE_START_DATE, weights::BARE_DATE),
    }
}

fn scan_warranty(text: &str, out: &mut Vec<Candidate>) {
    let rules: [(&Regex, f64); 2] = [
        (&*WARRANTY_PERIOD_FIRST, weights::WARRANTY_PERIOD),
        (&*WARRANTY_PERIOD_AFTER, weights::WARRANTY_AFTER_KEYWORD),
    ];
    for (regex, confidence) in rules {
        for caps in regex.captures_iter(text) {
            let period = num(&caps, 1).zip(caps.get(2)).and_then(|(n, unit)| format_period(n, unit.as_str()));
            if let Some(period) = period {
                out.push(pattern(fields::TERMS_WARRANTY, period, confidence));
            }
        }
    }
}
