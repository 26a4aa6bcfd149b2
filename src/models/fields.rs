//! Canonical field names shared by every extractor and the mapper.
//!
//! Extractors emit raw string values keyed by these names; the mapper parses
//! them with [`parse_field_value`] before selecting a winner per field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{Component, LineItemType};

pub const PRICING_TOTAL: &str = "pricing.total";
pub const PRICING_LABOR: &str = "pricing.labor";
pub const PRICING_MATERIALS: &str = "pricing.materials";
pub const PRICING_OTHER: &str = "pricing.other";
pub const PRICING_TAX: &str = "pricing.tax";
pub const TIMELINE_START_DATE: &str = "timeline.start_date";
pub const TIMELINE_DURATION_DAYS: &str = "timeline.duration_days";
pub const TIMELINE_COMPLETION_DATE: &str = "timeline.completion_date";
pub const SCOPE_INCLUDED: &str = "scope.included";
pub const SCOPE_EXCLUDED: &str = "scope.excluded";
pub const SCOPE_MATERIALS_PROVIDED: &str = "scope.materials_provided";
pub const SCOPE_MATERIALS_REQUIRED: &str = "scope.materials_required";
pub const SCOPE_ASSUMPTIONS: &str = "scope.assumptions";
pub const TERMS_WARRANTY: &str = "terms.warranty";
pub const TERMS_INSURANCE: &str = "terms.insurance";
pub const TERMS_LICENSE: &str = "terms.license";
pub const TERMS_CANCELLATION: &str = "terms.cancellation";
pub const TERMS_PAYMENT: &str = "terms.payment_terms";
pub const CONTACT_NAME: &str = "contact.name";
pub const CONTACT_EMAIL: &str = "contact.email";
pub const CONTACT_PHONE: &str = "contact.phone";
/// One itemized row; the value is a JSON-encoded [`LineItemCandidate`].
pub const LINE_ITEM: &str = "line_item";

/// How a field's raw string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Money,
    Date,
    Days,
    Text,
    /// Newline-separated entries.
    List,
    LineItem,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub component: Option<Component>,
    pub kind: FieldKind,
}

pub const FIELDS: &[FieldSpec] = &[
    FieldSpec { name: PRICING_TOTAL, component: Some(Component::Pricing), kind: FieldKind::Money },
    FieldSpec { name: PRICING_LABOR, component: Some(Component::Pricing), kind: FieldKind::Money },
    FieldSpec { name: PRICING_MATERIALS, component: Some(Component::Pricing), kind: FieldKind::Money },
    FieldSpec { name: PRICING_OTHER, component: Some(Component::Pricing), kind: FieldKind::Money },
    FieldSpec { name: PRICING_TAX, component: Some(Component::Pricing), kind: FieldKind::Money },
    FieldSpec { name: TIMELINE_START_DATE, component: Some(Component::Timeline), kind: FieldKind::Date },
    FieldSpec { name: TIMELINE_DURATION_DAYS, component: Some(Component::Timeline), kind: FieldKind::Days },
    FieldSpec { name: TIMELINE_COMPLETION_DATE, component: Some(Component::Timeline), kind: FieldKind::Date },
    FieldSpec { name: SCOPE_INCLUDED, component: Some(Component::Scope), kind: FieldKind::List },
    FieldSpec { name: SCOPE_EXCLUDED, component: Some(Component::Scope), kind: FieldKind::List },
    FieldSpec { name: SCOPE_MATERIALS_PROVIDED, component: Some(Component::Scope), kind: FieldKind::List },
    FieldSpec { name: SCOPE_MATERIALS_REQUIRED, component: Some(Component::Scope), kind: FieldKind::List },
    FieldSpec { name: SCOPE_ASSUMPTIONS, component: Some(Component::Scope), kind: FieldKind::List },
    FieldSpec { name: TERMS_WARRANTY, component: Some(Component::Terms), kind: FieldKind::Text },
    FieldSpec { name: TERMS_INSURANCE, component: Some(Component::Terms), kind: FieldKind::Text },
    FieldSpec { name: TERMS_LICENSE, component: Some(Component::Terms), kind: FieldKind::Text },
    FieldSpec { name: TERMS_CANCELLATION, component: Some(Component::Terms), kind: FieldKind::Text },
    FieldSpec { name: TERMS_PAYMENT, component: Some(Component::Terms), kind: FieldKind::Text },
    FieldSpec { name: CONTACT_NAME, component: None, kind: FieldKind::Text },
    FieldSpec { name: CONTACT_EMAIL, component: None, kind: FieldKind::Text },
    FieldSpec { name: CONTACT_PHONE, component: None, kind: FieldKind::Text },
    FieldSpec { name: LINE_ITEM, component: Some(Component::Pricing), kind: FieldKind::LineItem },
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Itemized row as proposed by an extractor, before ids and ordering are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemCandidate {
    pub item_type: LineItemType,
    pub description: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    pub total_price: f64,
    #[serde(default = "default_included")]
    pub is_included: bool,
}

fn default_included() -> bool {
    true
}

/// A parsed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Money(f64),
    Date(NaiveDate),
    Days(u32),
    Text(String),
    List(Vec<String>),
    LineItem(LineItemCandidate),
}

/// Parse `raw` according to the kind of field `name`.
/// Returns `None` for unknown fields and values that do not parse.
pub fn parse_field_value(name: &str, raw: &str) -> Option<FieldValue> {
    let spec = field_spec(name)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match spec.kind {
        FieldKind::Money => parse_money(trimmed).map(FieldValue::Money),
        FieldKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok().map(FieldValue::Date),
        FieldKind::Days => trimmed.parse::<u32>().ok().map(FieldValue::Days),
        FieldKind::Text => Some(FieldValue::Text(trimmed.to_string())),
        FieldKind::List => {
            let entries = split_list(trimmed);
            (!entries.is_empty()).then_some(FieldValue::List(entries))
        }
        FieldKind::LineItem => serde_json::from_str::<LineItemCandidate>(trimmed)
            .ok()
            .filter(|item| item.total_price.is_finite() && !item.description.trim().is_empty())
            .map(FieldValue::LineItem),
    }
}

/// Parse a currency amount such as `$1,250.00`, `1250` or `€ 99.5`.
/// Negative and non-finite amounts are rejected.
pub fn parse_money(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| !matches!(c, ',' | ' '))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(round_cents(value))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Encode list entries as a newline-separated value.
pub fn join_list<S: AsRef<str>>(entries: &[S]) -> String {
    entries
        .iter()
        .map(|e| e.as_ref().trim())
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_accepts_symbols_and_separators() {
        assert_eq!(parse_money("$1,250.00"), Some(1250.0));
        assert_eq!(parse_money("€ 99.5"), Some(99.5));
        assert_eq!(parse_money("12.345"), Some(12.35));
        assert_eq!(parse_money("-5"), None);
        assert_eq!(parse_money("abc"), None);
    }

    #[test]
    fn unknown_field_does_not_parse() {
        assert_eq!(parse_field_value("pricing.discount", "10"), None);
    }

    #[test]
    fn date_fields_require_iso_format() {
        assert_eq!(
            parse_field_value(TIMELINE_START_DATE, "2024-05-01"),
            Some(FieldValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        );
        assert_eq!(parse_field_value(TIMELINE_START_DATE, "May 1"), None);
    }

    #[test]
    fn list_fields_split_on_newlines() {
        let value = parse_field_value(SCOPE_INCLUDED, "demolition\n\n new fixtures ").unwrap();
        assert_eq!(
            value,
            FieldValue::List(vec!["demolition".into(), "new fixtures".into()])
        );
    }

    #[test]
    fn line_item_parses_from_json() {
        let raw = r#"{"item_type":"labor","description":"Install","total_price":600.0}"#;
        match parse_field_value(LINE_ITEM, raw) {
            Some(FieldValue::LineItem(item)) => {
                assert_eq!(item.item_type, LineItemType::Labor);
                assert!(item.is_included);
                assert_eq!(item.quantity, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_component_has_fields() {
        for component in Component::all() {
            assert!(FIELDS.iter().any(|f| f.component == Some(*component)));
        }
    }
}
