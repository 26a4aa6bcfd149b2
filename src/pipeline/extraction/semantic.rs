//! Rule-based semantic parser: reads the layout of a quote (sections,
//! labelled lines, itemized rows) rather than isolated tokens.
//!
//! This is the default implementation of the semantic-parse method. A
//! model-backed parser can replace it by implementing [`CandidateExtractor`]
//! with [`ExtractionMethod::SemanticParse`].

use std::sync::LazyLock;

use regex::Regex;

use super::dates::format_period;
use super::patterns::AMOUNT;
use super::{dedupe_candidates, Candidate, CandidateExtractor, ExtractionError, ExtractionInput};
use crate::models::fields::{self, join_list, parse_money, round_cents, LineItemCandidate};
use crate::models::{ExtractionMethod, LineItemType};

const SECTION_CONFIDENCE: f64 = 0.85;
const LABELLED_TERM_CONFIDENCE: f64 = 0.85;
const KEYWORD_TERM_CONFIDENCE: f64 = 0.70;
const TOTAL_LINE_CONFIDENCE: f64 = 0.90;
const BREAKDOWN_CONFIDENCE: f64 = 0.85;
const ITEMIZED_CONFIDENCE: f64 = 0.80;
const PRICED_LINE_CONFIDENCE: f64 = 0.70;
const EMAIL_CONFIDENCE: f64 = 0.90;
const PHONE_CONFIDENCE: f64 = 0.80;
const NAME_CONFIDENCE: f64 = 0.70;

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(scope of work|description of work|job description|work includes|not included|exclusions|excluded|excludes|inclusions|included|includes|materials provided|materials supplied|we provide|we supply|materials required|owner to provide|owner provides|customer to provide|customer provides|customer supplies|assumptions|assuming|assumes|description|job|work|project)\s*[:\-]\s*(.*)$",
    )
    .unwrap()
});

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+?)\s*$").unwrap());

static TERMS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(warranty|guarantee|insurance|license|licence|licensing|cancellation policy|cancellation|payment terms|payment)\s*[:\-]\s*(.+?)\s*$",
    )
    .unwrap()
});

static TOTAL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:grand total|total due|amount due|total price|total cost|balance due|total)\s*[:\-=]?\s*[$€£]?\s*{AMOUNT}\s*$"
    ))
    .unwrap()
});

static BREAKDOWN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:[-*•]\s*)?(labou?r|materials?|parts|sales tax|tax|permits?|disposal|misc(?:ellaneous)?|other)(?:\s+(?:costs?|charges?|fees?|total))?\s*[:\-=]\s*[$€£]?\s*{AMOUNT}\s*$"
    ))
    .unwrap()
});

static QUANTITY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:[-*•]\s*)?(.+?)[\s:\-]+(\d+(?:\.\d+)?)\s*([a-z]{{1,6}}\.?)?\s*(?:x|×|@)\s*[$€£]?\s*{AMOUNT}(?:\s*[=:\-]\s*[$€£]?\s*{AMOUNT})?\s*$"
    ))
    .unwrap()
});

static PRICED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*(?:[-*•]\s*)?([a-z][^$€£\n]*?)\s*[:\-.]*\s*[$€£]\s*{AMOUNT}\s*$"
    ))
    .unwrap()
});

static PAYMENT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:net\s*\d+|due (?:upon|on|at) (?:completion|receipt)|\d{1,3}\s*%\s*(?:deposit|down|upfront|up front)|deposit of)\b",
    )
    .unwrap()
});

static PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,3})[\s-]*(years?|yrs?|months?|days?)\b").unwrap());

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b").unwrap()
});

static NAME_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:contact|name|from|prepared by|submitted by)\s*[:\-]\s*(.+?)\s*$").unwrap()
});

/// Words that mark a priced line as a summary rather than an item.
const SUMMARY_WORDS: &[&str] = &[
    "total", "subtotal", "tax", "deposit", "balance", "due", "quote", "estimate", "discount",
];

/// Default semantic-parse extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedSemanticParser;

impl CandidateExtractor for RuleBasedSemanticParser {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::SemanticParse
    }

    fn applies_to(&self, input: &ExtractionInput) -> bool {
        input.text_str().is_some()
    }

    fn extract(&self, input: &ExtractionInput) -> Result<Vec<Candidate>, ExtractionError> {
        let Some(text) = input.text.as_ref() else {
            return Ok(Vec::new());
        };
        let scale = text.candidate_scale();
        Ok(parse(&text.text)
            .into_iter()
            .map(|mut c| {
                c.confidence *= scale;
                c
            })
            .collect())
    }
}

/// Accumulates the parser's findings across lines.
#[derive(Default)]
struct Findings {
    sections: Vec<(&'static str, Vec<String>)>,
    terms: Vec<(&'static str, String, f64)>,
    totals: Vec<f64>,
    breakdown: Vec<(&'static str, f64)>,
    breakdown_items: Vec<LineItemCandidate>,
    items: Vec<(LineItemCandidate, f64)>,
    contact: Vec<(&'static str, String, f64)>,
}

impl Findings {
    fn add_section_entry(&mut self, field: &'static str, entry: &str) {
        let entry = entry.trim().trim_end_matches('.').trim();
        if entry.is_empty() {
            return;
        }
        match self.sections.iter_mut().find(|(f, _)| *f == field) {
            Some((_, entries)) => entries.push(entry.to_string()),
            None => self.sections.push((field, vec![entry.to_string()])),
        }
    }

    /// Keep the most confident value per term field; the first one wins ties.
    fn add_term(&mut self, field: &'static str, value: String, confidence: f64) {
        match self.terms.iter_mut().find(|(f, _, _)| *f == field) {
            Some(existing) if confidence > existing.2 => *existing = (field, value, confidence),
            Some(_) => {}
            None => self.terms.push((field, value, confidence)),
        }
    }

    fn add_contact(&mut self, field: &'static str, value: String, confidence: f64) {
        if !self.contact.iter().any(|(f, _, _)| *f == field) {
            self.contact.push((field, value, confidence));
        }
    }

    fn into_candidates(self) -> Vec<Candidate> {
        let semantic = |field: &str, value: String, confidence: f64| {
            Candidate::new(field, value, confidence, ExtractionMethod::SemanticParse)
        };
        let mut out = Vec::new();

        for (field, entries) in self.sections {
            out.push(semantic(field, join_list(&entries), SECTION_CONFIDENCE));
        }
        for (field, value, confidence) in self.terms {
            out.push(semantic(field, value, confidence));
        }
        for total in self.totals {
            out.push(semantic(fields::PRICING_TOTAL, format!("{total:.2}"), TOTAL_LINE_CONFIDENCE));
        }

        let mut sums: Vec<(&'static str, f64)> = Vec::new();
        for (field, amount) in self.breakdown {
            match sums.iter_mut().find(|(f, _)| *f == field) {
                Some((_, sum)) => *sum += amount,
                None => sums.push((field, amount)),
            }
        }
        for (field, sum) in sums {
            out.push(semantic(field, format!("{:.2}", round_cents(sum)), BREAKDOWN_CONFIDENCE));
        }

        // Itemized rows describe the work in detail; breakdown rows only stand in when there are none.
        let items: Vec<(LineItemCandidate, f64)> = if self.items.is_empty() {
            self.breakdown_items
                .into_iter()
                .map(|item| (item, ITEMIZED_CONFIDENCE))
                .collect()
        } else {
            self.items
        };
        for (item, confidence) in items {
            if let Ok(json) = serde_json::to_string(&item) {
                out.push(semantic(fields::LINE_ITEM, json, confidence));
            }
        }

        for (field, value, confidence) in self.contact {
            out.push(semantic(field, value, confidence));
        }
        dedupe_candidates(out)
    }
}

/// Parse quote text into semantic-parse candidates.
pub fn parse(text: &str) -> Vec<Candidate> {
    let mut findings = Findings::default();
    let mut current_section: Option<&'static str> = None;

    for line in text.lines() {
        if line.trim().is_empty() {
            current_section = None;
            continue;
        }

        scan_contact(line, &mut findings);

        if let Some(caps) = SECTION_HEADER.captures(line) {
            let field = section_field(caps.get(1).map_or("", |m| m.as_str()));
            current_section = Some(field);
            for entry in split_entries(caps.get(2).map_or("", |m| m.as_str())) {
                findings.add_section_entry(field, entry);
            }
            continue;
        }

        if let Some(field) = current_section {
            if let Some(entry) = BULLET.captures(line).and_then(|c| c.get(1)) {
                findings.add_section_entry(field, entry.as_str());
                continue;
            }
            current_section = None;
        }

        if scan_terms(line, &mut findings) {
            continue;
        }
        scan_pricing(line, &mut findings);
    }

    findings.into_candidates()
}

fn section_field(header: &str) -> &'static str {
    let header = header.to_lowercase();
    if header.starts_with("not included") || header.starts_with("exclu") {
        fields::SCOPE_EXCLUDED
    } else if header.starts_with("materials provided")
        || header.starts_with("materials supplied")
        || header.starts_with("we ")
    {
        fields::SCOPE_MATERIALS_PROVIDED
    } else if header.starts_with("materials required") || header.starts_with("owner") || header.starts_with("customer") {
        fields::SCOPE_MATERIALS_REQUIRED
    } else if header.starts_with("assum") {
        fields::SCOPE_ASSUMPTIONS
    } else {
        fields::SCOPE_INCLUDED
    }
}

fn split_entries(rest: &str) -> impl Iterator<Item = &str> {
    rest.split([',', ';']).map(str::trim).filter(|e| !e.is_empty())
}

/// Returns true when the line was a labelled terms line.
fn scan_terms(line: &str, findings: &mut Findings) -> bool {
    if let Some(caps) = TERMS_HEADER.captures(line) {
        let label = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let value = caps.get(2).map_or("", |m| m.as_str()).to_string();
        let field = if label.starts_with("warrant") || label.starts_with("guarant") {
            fields::TERMS_WARRANTY
        } else if label.starts_with("insur") {
            fields::TERMS_INSURANCE
        } else if label.starts_with("licen") {
            fields::TERMS_LICENSE
        } else if label.starts_with("cancel") {
            fields::TERMS_CANCELLATION
        } else {
            fields::TERMS_PAYMENT
        };
        let value = if field == fields::TERMS_WARRANTY {
            normalized_period(&value).unwrap_or(value)
        } else {
            value
        };
        findings.add_term(field, value, LABELLED_TERM_CONFIDENCE);
        return true;
    }

    let lower = line.to_lowercase();
    let sentence = line.trim().to_string();
    if lower.contains("insured") || lower.contains("insurance") {
        findings.add_term(fields::TERMS_INSURANCE, sentence.clone(), KEYWORD_TERM_CONFIDENCE);
    }
    if lower.contains("licensed") || lower.contains("license #") || lower.contains("lic #") || lower.contains("lic.") {
        findings.add_term(fields::TERMS_LICENSE, sentence.clone(), KEYWORD_TERM_CONFIDENCE);
    }
    if lower.contains("cancel") {
        findings.add_term(fields::TERMS_CANCELLATION, sentence.clone(), KEYWORD_TERM_CONFIDENCE);
    }
    if PAYMENT_PHRASE.is_match(line) {
        findings.add_term(fields::TERMS_PAYMENT, sentence, KEYWORD_TERM_CONFIDENCE);
    }
    false
}

fn normalized_period(text: &str) -> Option<String> {
    let caps = PERIOD.captures(text)?;
    let amount: u32 = caps.get(1)?.as_str().parse().ok()?;
    format_period(amount, caps.get(2)?.as_str())
}

fn scan_pricing(line: &str, findings: &mut Findings) {
    if let Some(amount) = TOTAL_LINE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_money(m.as_str()))
    {
        findings.totals.push(amount);
        return;
    }

    if let Some(caps) = BREAKDOWN_LINE.captures(line) {
        let label = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let Some(amount) = caps.get(2).and_then(|m| parse_money(m.as_str())) else { return };
        let (field, item_type) = if label.starts_with("lab") {
            (fields::PRICING_LABOR, Some(LineItemType::Labor))
        } else if label.starts_with("material") || label == "parts" {
            (fields::PRICING_MATERIALS, Some(LineItemType::Material))
        } else if label.contains("tax") {
            (fields::PRICING_TAX, None)
        } else {
            (fields::PRICING_OTHER, Some(LineItemType::Other))
        };
        findings.breakdown.push((field, amount));
        if let Some(item_type) = item_type {
            findings.breakdown_items.push(LineItemCandidate {
                item_type,
                description: capitalize(&label),
                quantity: None,
                unit_of_measure: None,
                unit_price: None,
                total_price: amount,
                is_included: true,
            });
        }
        return;
    }

    if let Some(caps) = QUANTITY_LINE.captures(line) {
        let description = caps.get(1).map_or("", |m| m.as_str()).trim();
        let quantity: Option<f64> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let unit_price = caps.get(4).and_then(|m| parse_money(m.as_str()));
        if let (Some(quantity), Some(unit_price)) = (quantity, unit_price) {
            if !description.is_empty() && !is_summary(description) {
                let total = caps
                    .get(5)
                    .and_then(|m| parse_money(m.as_str()))
                    .unwrap_or_else(|| round_cents(quantity * unit_price));
                findings.items.push((
                    LineItemCandidate {
                        item_type: classify_item(description),
                        description: description.to_string(),
                        quantity: Some(quantity),
                        unit_of_measure: caps.get(3).map(|m| m.as_str().trim_end_matches('.').to_lowercase()),
                        unit_price: Some(unit_price),
                        total_price: total,
                        is_included: true,
                    },
                    ITEMIZED_CONFIDENCE,
                ));
                return;
            }
        }
    }

    if let Some(caps) = PRICED_LINE.captures(line) {
        let description = caps.get(1).map_or("", |m| m.as_str()).trim();
        if description.is_empty() || is_summary(description) {
            return;
        }
        if let Some(amount) = caps.get(2).and_then(|m| parse_money(m.as_str())) {
            findings.items.push((
                LineItemCandidate {
                    item_type: classify_item(description),
                    description: description.to_string(),
                    quantity: None,
                    unit_of_measure: None,
                    unit_price: None,
                    total_price: amount,
                    is_included: true,
                },
                PRICED_LINE_CONFIDENCE,
            ));
        }
    }
}

fn is_summary(description: &str) -> bool {
    let lower = description.to_lowercase();
    SUMMARY_WORDS.iter().any(|w| lower.contains(w))
}

/// Line item type from its description.
pub fn classify_item(description: &str) -> LineItemType {
    let lower = description.to_lowercase();
    const LABOR: &[&str] = &["labor", "labour", "install", "hour", "hrs", "service call", "removal", "repair"];
    const MATERIAL: &[&str] = &[
        "material", "parts", "part ", "supplies", "fixture", "pipe", "wire", "tile", "shingle", "lumber",
        "paint", "unit", "heater", "valve",
    ];
    if LABOR.iter().any(|w| lower.contains(w)) {
        LineItemType::Labor
    } else if MATERIAL.iter().any(|w| lower.contains(w)) {
        LineItemType::Material
    } else {
        LineItemType::Other
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn scan_contact(line: &str, findings: &mut Findings) {
    if let Some(m) = EMAIL.find(line) {
        findings.add_contact(fields::CONTACT_EMAIL, m.as_str().to_lowercase(), EMAIL_CONFIDENCE);
    }
    if let Some(m) = PHONE.find(line) {
        findings.add_contact(fields::CONTACT_PHONE, m.as_str().trim().to_string(), PHONE_CONFIDENCE);
    }
    if let Some(raw) = NAME_LINE.captures(line).and_then(|c| c.get(1)) {
        let name = raw
            .as_str()
            .split(['<', '('])
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"');
        if !name.is_empty() && !name.contains('@') && !name.chars().any(|c| c.is_ascii_digit()) {
            findings.add_contact(fields::CONTACT_NAME, name.to_string(), NAME_CONFIDENCE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fields::{parse_field_value, FieldValue};

    fn value_of(candidates: &[Candidate], field: &str) -> Option<String> {
        candidates.iter().find(|c| c.field_name == field).map(|c| c.value.clone())
    }

    fn line_items(candidates: &[Candidate]) -> Vec<LineItemCandidate> {
        candidates
            .iter()
            .filter(|c| c.field_name == fields::LINE_ITEM)
            .filter_map(|c| match parse_field_value(fields::LINE_ITEM, &c.value) {
                Some(FieldValue::LineItem(item)) => Some(item),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sections_with_bullets() {
        let text = "Scope of work:\n- Remove old water heater\n- Install 50 gal unit\n\nNot included: drywall repair, permits\nAssumptions: existing gas line is to code";
        let found = parse(text);
        assert_eq!(
            value_of(&found, fields::SCOPE_INCLUDED).as_deref(),
            Some("Remove old water heater\nInstall 50 gal unit")
        );
        assert_eq!(
            value_of(&found, fields::SCOPE_EXCLUDED).as_deref(),
            Some("drywall repair\npermits")
        );
        assert_eq!(
            value_of(&found, fields::SCOPE_ASSUMPTIONS).as_deref(),
            Some("existing gas line is to code")
        );
    }

    #[test]
    fn labelled_terms() {
        let text = "Warranty: 2 years parts and labor\nPayment terms: 50% deposit, balance on completion\nFully licensed and insured";
        let found = parse(text);
        assert_eq!(value_of(&found, fields::TERMS_WARRANTY).as_deref(), Some("2 years"));
        assert_eq!(
            value_of(&found, fields::TERMS_PAYMENT).as_deref(),
            Some("50% deposit, balance on completion")
        );
        assert_eq!(
            value_of(&found, fields::TERMS_INSURANCE).as_deref(),
            Some("Fully licensed and insured")
        );
        assert_eq!(
            value_of(&found, fields::TERMS_LICENSE).as_deref(),
            Some("Fully licensed and insured")
        );
    }

    #[test]
    fn breakdown_lines_become_pricing_and_items() {
        let text = "Labor: $600\nMaterials: $300.50\nTax: $49.50\nTotal: $950.00";
        let found = parse(text);
        assert_eq!(value_of(&found, fields::PRICING_LABOR).as_deref(), Some("600.00"));
        assert_eq!(value_of(&found, fields::PRICING_MATERIALS).as_deref(), Some("300.50"));
        assert_eq!(value_of(&found, fields::PRICING_TAX).as_deref(), Some("49.50"));
        assert_eq!(value_of(&found, fields::PRICING_TOTAL).as_deref(), Some("950.00"));

        let items = line_items(&found);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type, LineItemType::Labor);
        assert_eq!(items[1].item_type, LineItemType::Material);
    }

    #[test]
    fn itemized_rows_replace_breakdown_items() {
        let text = "Tile 120 sqft @ $4.50 = $540.00\n- Install labor $400\nMaterials: $540\nTotal $940";
        let items = line_items(&parse(text));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].description, "Tile");
        assert_eq!(items[0].quantity, Some(120.0));
        assert_eq!(items[0].unit_of_measure.as_deref(), Some("sqft"));
        assert_eq!(items[0].total_price, 540.0);
        assert_eq!(items[0].item_type, LineItemType::Material);
        assert_eq!(items[1].description, "Install labor");
        assert_eq!(items[1].item_type, LineItemType::Labor);
    }

    #[test]
    fn quantity_without_total_is_multiplied() {
        let items = line_items(&parse("Service call 2 x $75"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_price, 150.0);
    }

    #[test]
    fn summary_lines_are_not_items() {
        let items = line_items(&parse("Subtotal: $900\nDeposit required $100"));
        assert!(items.is_empty());
    }

    #[test]
    fn contact_details() {
        let found = parse("From: Dana Reyes <dana@reyesplumbing.com>\nCall (555) 123-4567");
        assert_eq!(value_of(&found, fields::CONTACT_NAME).as_deref(), Some("Dana Reyes"));
        assert_eq!(value_of(&found, fields::CONTACT_EMAIL).as_deref(), Some("dana@reyesplumbing.com"));
        assert_eq!(value_of(&found, fields::CONTACT_PHONE).as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn single_sentence_yields_nothing_structural() {
        let found = parse("Total: $1,250.00, completion in 3 days, 1 year warranty");
        assert!(found.is_empty(), "unexpected {found:?}");
    }

    #[test]
    fn all_candidates_are_semantic() {
        let found = parse("Labor: $100\nWarranty: 1 year");
        assert!(found.iter().all(|c| c.method == ExtractionMethod::SemanticParse));
    }
}
