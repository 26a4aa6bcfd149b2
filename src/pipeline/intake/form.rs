//! Wire schema for structured-form submissions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::IntakeError;

/// Longest warranty a form may declare, in months.
pub const MAX_WARRANTY_MONTHS: u32 = 120;

/// A quote entered through the structured web form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteForm {
    pub total_amount: Option<f64>,
    pub labor_cost: Option<f64>,
    pub materials_cost: Option<f64>,
    pub other_costs: Option<f64>,
    pub tax_amount: Option<f64>,
    pub can_start_date: Option<NaiveDate>,
    pub estimated_duration_days: Option<u32>,
    pub completion_date: Option<NaiveDate>,
    pub scope_included: Vec<String>,
    pub scope_excluded: Vec<String>,
    pub materials_provided: Vec<String>,
    pub materials_required: Vec<String>,
    pub assumptions: Vec<String>,
    pub payment_terms: Option<String>,
    pub warranty_period_months: Option<u32>,
    pub insurance: Option<String>,
    pub license: Option<String>,
    pub cancellation_policy: Option<String>,
    pub notes: Option<String>,
    pub line_items: Vec<FormLineItem>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormLineItem {
    pub description: String,
    /// labor, material or other; anything else maps to other.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_of_measure: Option<String>,
    #[serde(default)]
    pub unit_price: Option<f64>,
    #[serde(default)]
    pub line_total: Option<f64>,
    #[serde(default = "default_included")]
    pub is_included: bool,
}

fn default_quantity() -> f64 {
    1.0
}

fn default_included() -> bool {
    true
}

impl FormLineItem {
    /// Explicit line total, or quantity × unit price.
    pub fn resolved_total(&self) -> Option<f64> {
        self.line_total
            .or_else(|| self.unit_price.map(|price| price * self.quantity))
    }
}

impl QuoteForm {
    pub fn parse(bytes: &[u8]) -> Result<Self, IntakeError> {
        serde_json::from_slice(bytes)
            .map_err(|e| IntakeError::InvalidFormat(format!("structured form is not valid JSON: {e}")))
    }

    /// True when the form carries no quote content at all.
    pub fn is_empty(&self) -> bool {
        self.total_amount.is_none()
            && self.labor_cost.is_none()
            && self.materials_cost.is_none()
            && self.other_costs.is_none()
            && self.tax_amount.is_none()
            && self.can_start_date.is_none()
            && self.estimated_duration_days.is_none()
            && self.completion_date.is_none()
            && self.scope_included.is_empty()
            && self.scope_excluded.is_empty()
            && self.materials_provided.is_empty()
            && self.materials_required.is_empty()
            && self.assumptions.is_empty()
            && self.payment_terms.is_none()
            && self.warranty_period_months.is_none()
            && self.insurance.is_none()
            && self.license.is_none()
            && self.cancellation_policy.is_none()
            && self.notes.as_deref().map_or(true, |n| n.trim().is_empty())
            && self.line_items.is_empty()
    }

    pub fn validate(&self, max_line_items: usize) -> Result<(), IntakeError> {
        if self.is_empty() {
            return Err(IntakeError::EmptySubmission("structured form has no quote content".into()));
        }
        if self.line_items.len() > max_line_items {
            return Err(IntakeError::InvalidFormat(format!(
                "structured form has {} line items, limit is {max_line_items}",
                self.line_items.len()
            )));
        }

        let amounts = [
            ("total_amount", self.total_amount),
            ("labor_cost", self.labor_cost),
            ("materials_cost", self.materials_cost),
            ("other_costs", self.other_costs),
            ("tax_amount", self.tax_amount),
        ];
        for (name, value) in amounts {
            check_amount(name, value)?;
        }

        if let Some(months) = self.warranty_period_months {
            if months > MAX_WARRANTY_MONTHS {
                return Err(IntakeError::InvalidFormat(format!(
                    "warranty_period_months {months} exceeds {MAX_WARRANTY_MONTHS}"
                )));
            }
        }

        if let (Some(start), Some(end)) = (self.can_start_date, self.completion_date) {
            if end < start {
                return Err(IntakeError::InvalidFormat(
                    "completion_date is before can_start_date".into(),
                ));
            }
        }

        for (idx, item) in self.line_items.iter().enumerate() {
            if item.description.trim().is_empty() {
                return Err(IntakeError::InvalidFormat(format!("line item {idx} has no description")));
            }
            if !item.quantity.is_finite() || item.quantity <= 0.0 {
                return Err(IntakeError::InvalidFormat(format!("line item {idx} has invalid quantity")));
            }
            check_amount("line item unit_price", item.unit_price)?;
            check_amount("line item line_total", item.line_total)?;
            if item.resolved_total().is_none() {
                return Err(IntakeError::InvalidFormat(format!(
                    "line item {idx} needs a line_total or unit_price"
                )));
            }
        }

        Ok(())
    }

    /// Form-level confidence: structured entry starts high and gains a little
    /// for itemization and a reachable contact.
    pub fn confidence(&self) -> f64 {
        let mut confidence = 0.9 + (self.line_items.len() as f64 * 0.005).min(0.05);
        if self.contact_email.as_deref().is_some_and(|e| !e.trim().is_empty()) {
            confidence += 0.02;
        }
        confidence.min(0.99)
    }
}

fn check_amount(name: &str, value: Option<f64>) -> Result<(), IntakeError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(IntakeError::InvalidFormat(format!(
            "{name} must be a non-negative amount"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with_total(total: f64) -> QuoteForm {
        QuoteForm {
            total_amount: Some(total),
            ..Default::default()
        }
    }

    fn line(description: &str, total: f64) -> FormLineItem {
        FormLineItem {
            description: description.into(),
            category: Some("labor".into()),
            quantity: 1.0,
            unit_of_measure: None,
            unit_price: None,
            line_total: Some(total),
            is_included: true,
        }
    }

    #[test]
    fn parse_minimal_form() {
        let form = QuoteForm::parse(br#"{"total_amount": 1250.0, "estimated_duration_days": 3}"#).unwrap();
        assert_eq!(form.total_amount, Some(1250.0));
        assert_eq!(form.estimated_duration_days, Some(3));
        assert!(form.validate(100).is_ok());
    }

    #[test]
    fn malformed_json_is_invalid_format() {
        let err = QuoteForm::parse(b"{\"total_amount\": }").unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFormat(_)));
    }

    #[test]
    fn empty_form_is_empty_submission() {
        let err = QuoteForm::parse(b"{}").unwrap().validate(100).unwrap_err();
        assert!(matches!(err, IntakeError::EmptySubmission(_)));
    }

    #[test]
    fn too_many_line_items_rejected() {
        let mut form = form_with_total(10.0);
        form.line_items = (0..3).map(|i| line(&format!("item {i}"), 1.0)).collect();
        assert!(form.validate(3).is_ok());
        form.line_items.push(line("one more", 1.0));
        assert!(matches!(form.validate(3), Err(IntakeError::InvalidFormat(_))));
    }

    #[test]
    fn negative_amount_rejected() {
        assert!(form_with_total(-1.0).validate(100).is_err());
    }

    #[test]
    fn warranty_capped() {
        let mut form = form_with_total(10.0);
        form.warranty_period_months = Some(121);
        assert!(form.validate(100).is_err());
    }

    #[test]
    fn line_total_falls_back_to_quantity_times_price() {
        let item = FormLineItem {
            line_total: None,
            unit_price: Some(12.5),
            quantity: 4.0,
            ..line("tiles", 0.0)
        };
        assert_eq!(item.resolved_total(), Some(50.0));
    }

    #[test]
    fn confidence_rewards_itemization_and_contact() {
        let mut form = form_with_total(10.0);
        assert!((form.confidence() - 0.9).abs() < 1e-9);
        form.line_items = (0..4).map(|i| line(&format!("item {i}"), 1.0)).collect();
        form.contact_email = Some("pro@example.com".into());
        assert!((form.confidence() - 0.94).abs() < 1e-9);
        form.line_items = (0..40).map(|i| line(&format!("item {i}"), 1.0)).collect();
        assert!((form.confidence() - 0.97).abs() < 1e-9);
    }
}
