//! Structured-form extractor: every form field maps straight onto a canonical field.

use super::dates::months_as_period;
use super::{Candidate, CandidateExtractor, ExtractionError, ExtractionInput};
use crate::models::fields::{self, join_list, round_cents, LineItemCandidate};
use crate::models::{Channel, ExtractionMethod, LineItemType};
use crate::pipeline::intake::form::QuoteForm;

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredFormExtractor;

impl CandidateExtractor for StructuredFormExtractor {
    fn name(&self) -> &'static str {
        "structured_form"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::StructuredForm
    }

    fn applies_to(&self, input: &ExtractionInput) -> bool {
        input.channel == Channel::StructuredForm
    }

    fn extract(&self, input: &ExtractionInput) -> Result<Vec<Candidate>, ExtractionError> {
        let form = QuoteForm::parse(&input.payload)
            .map_err(|e| ExtractionError::MalformedPayload(e.to_string()))?;
        Ok(form_candidates(&form))
    }
}

/// Candidates for every populated form field, all at the form's confidence.
pub fn form_candidates(form: &QuoteForm) -> Vec<Candidate> {
    let confidence = form.confidence();
    let mut out = Vec::new();
    let mut push = |field: &str, value: String| {
        if !value.trim().is_empty() {
            out.push(Candidate::new(field, value, confidence, ExtractionMethod::StructuredForm));
        }
    };

    let money = [
        (fields::PRICING_TOTAL, form.total_amount),
        (fields::PRICING_LABOR, form.labor_cost),
        (fields::PRICING_MATERIALS, form.materials_cost),
        (fields::PRICING_OTHER, form.other_costs),
        (fields::PRICING_TAX, form.tax_amount),
    ];
    for (field, amount) in money {
        if let Some(amount) = amount {
            push(field, format!("{:.2}", round_cents(amount)));
        }
    }

    if let Some(date) = form.can_start_date {
        push(fields::TIMELINE_START_DATE, date.to_string());
    }
    if let Some(days) = form.estimated_duration_days.filter(|d| *d > 0) {
        push(fields::TIMELINE_DURATION_DAYS, days.to_string());
    }
    if let Some(date) = form.completion_date {
        push(fields::TIMELINE_COMPLETION_DATE, date.to_string());
    }

    push(fields::SCOPE_INCLUDED, join_list(&form.scope_included));
    push(fields::SCOPE_EXCLUDED, join_list(&form.scope_excluded));
    push(fields::SCOPE_MATERIALS_PROVIDED, join_list(&form.materials_provided));
    push(fields::SCOPE_MATERIALS_REQUIRED, join_list(&form.materials_required));
    push(fields::SCOPE_ASSUMPTIONS, join_list(&form.assumptions));

    if let Some(months) = form.warranty_period_months {
        push(fields::TERMS_WARRANTY, months_as_period(months));
    }
    let text_fields = [
        (fields::TERMS_PAYMENT, &form.payment_terms),
        (fields::TERMS_INSURANCE, &form.insurance),
        (fields::TERMS_LICENSE, &form.license),
        (fields::TERMS_CANCELLATION, &form.cancellation_policy),
        (fields::CONTACT_NAME, &form.contact_name),
        (fields::CONTACT_EMAIL, &form.contact_email),
        (fields::CONTACT_PHONE, &form.contact_phone),
    ];
    for (field, value) in text_fields {
        if let Some(value) = value {
            push(field, value.trim().to_string());
        }
    }

    for item in &form.line_items {
        let Some(total) = item.resolved_total() else { continue };
        let candidate = LineItemCandidate {
            item_type: item_type_for(item.category.as_deref()),
            description: item.description.trim().to_string(),
            quantity: Some(item.quantity),
            unit_of_measure: item.unit_of_measure.clone(),
            unit_price: item.unit_price,
            total_price: round_cents(total),
            is_included: item.is_included,
        };
        if let Ok(json) = serde_json::to_string(&candidate) {
            push(fields::LINE_ITEM, json);
        }
    }

    out
}

fn item_type_for(category: Option<&str>) -> LineItemType {
    match category.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
        Some("labor" | "labour") => LineItemType::Labor,
        Some("material" | "materials" | "parts") => LineItemType::Material,
        _ => LineItemType::Other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::models::fields::{parse_field_value, FieldValue};

    fn input(json: &str) -> ExtractionInput {
        ExtractionInput {
            submission_id: Uuid::new_v4(),
            channel: Channel::StructuredForm,
            mime: "application/json".into(),
            payload: json.as_bytes().to_vec(),
            reference_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            text: None,
        }
    }

    fn find<'a>(candidates: &'a [Candidate], field: &str) -> Option<&'a Candidate> {
        candidates.iter().find(|c| c.field_name == field)
    }

    #[test]
    fn form_fields_map_to_canonical_names() {
        let json = r#"{
            "total_amount": 1200,
            "labor_cost": 800,
            "materials_cost": 400,
            "can_start_date": "2024-03-10",
            "estimated_duration_days": 5,
            "scope_included": ["Replace panel", "Label circuits"],
            "warranty_period_months": 24,
            "payment_terms": "Net 30",
            "contact_email": "ops@sparkco.test",
            "line_items": [
                {"description": "Panel install", "category": "labor", "line_total": 800},
                {"description": "200A panel", "category": "material", "quantity": 1, "unit_price": 400}
            ]
        }"#;
        let found = StructuredFormExtractor.extract(&input(json)).unwrap();

        assert_eq!(find(&found, fields::PRICING_TOTAL).unwrap().value, "1200.00");
        assert_eq!(find(&found, fields::TIMELINE_START_DATE).unwrap().value, "2024-03-10");
        assert_eq!(find(&found, fields::TIMELINE_DURATION_DAYS).unwrap().value, "5");
        assert_eq!(find(&found, fields::SCOPE_INCLUDED).unwrap().value, "Replace panel\nLabel circuits");
        assert_eq!(find(&found, fields::TERMS_WARRANTY).unwrap().value, "2 years");
        assert_eq!(find(&found, fields::TERMS_PAYMENT).unwrap().value, "Net 30");

        let items: Vec<_> = found
            .iter()
            .filter(|c| c.field_name == fields::LINE_ITEM)
            .filter_map(|c| match parse_field_value(fields::LINE_ITEM, &c.value) {
                Some(FieldValue::LineItem(item)) => Some(item),
                _ => None,
            })
            .collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type, LineItemType::Labor);
        assert_eq!(items[1].item_type, LineItemType::Material);
        assert_eq!(items[1].total_price, 400.0);
    }

    #[test]
    fn confidence_reflects_form_detail() {
        let found = StructuredFormExtractor
            .extract(&input(r#"{"total_amount": 500, "contact_email": "a@b.test"}"#))
            .unwrap();
        assert!(found.iter().all(|c| (c.confidence - 0.92).abs() < 1e-9));
        assert!(found.iter().all(|c| c.method == ExtractionMethod::StructuredForm));
    }

    #[test]
    fn empty_lists_and_blank_text_are_skipped() {
        let found = StructuredFormExtractor
            .extract(&input(r#"{"total_amount": 10, "scope_included": [], "insurance": "  "}"#))
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn only_applies_to_forms() {
        let mut message = input("{}");
        message.channel = Channel::InboundMessage;
        assert!(!StructuredFormExtractor.applies_to(&message));
        assert!(StructuredFormExtractor.applies_to(&input("{}")));
    }

    #[test]
    fn malformed_json_is_malformed_payload() {
        let err = StructuredFormExtractor.extract(&input("not json")).unwrap_err();
        assert!(matches!(err, ExtractionError::MalformedPayload(_)));
    }
}
