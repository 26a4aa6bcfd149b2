use serde::{Deserialize, Serialize};

use crate::models::fields::{round_cents, LineItemCandidate};

/// Outcome of checking itemized lines against the quoted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub line_sum: f64,
    pub total: f64,
    pub tolerance: f64,
    pub matches: bool,
}

/// Compare the sum of included line items with the total.
///
/// Items may exclude tax, so a sum that only reaches the total once tax is
/// added also reconciles. Returns `None` when there is nothing to compare.
pub fn reconcile(
    total: Option<f64>,
    tax: Option<f64>,
    items: &[LineItemCandidate],
    tolerance: impl Fn(f64) -> f64,
) -> Option<Reconciliation> {
    let total = total?;
    if items.is_empty() {
        return None;
    }
    let line_sum = round_cents(items.iter().filter(|i| i.is_included).map(|i| i.total_price).sum());
    let tolerance = tolerance(total);
    let matches = (line_sum - total).abs() <= tolerance
        || tax.is_some_and(|tax| (line_sum + tax - total).abs() <= tolerance);
    Some(Reconciliation {
        line_sum,
        total,
        tolerance,
        matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntakeConfig;
    use crate::models::LineItemType;

    fn item(total: f64, included: bool) -> LineItemCandidate {
        LineItemCandidate {
            item_type: LineItemType::Other,
            description: "Work".into(),
            quantity: None,
            unit_of_measure: None,
            unit_price: None,
            total_price: total,
            is_included: included,
        }
    }

    fn tolerance(total: f64) -> f64 {
        IntakeConfig::default().reconciliation_tolerance(total)
    }

    #[test]
    fn within_one_percent_matches() {
        let result = reconcile(Some(1000.0), None, &[item(600.0, true), item(395.0, true)], tolerance).unwrap();
        assert!(result.matches);
        assert_eq!(result.tolerance, 10.0);
    }

    #[test]
    fn excluded_items_do_not_count() {
        let result = reconcile(Some(500.0), None, &[item(500.0, true), item(200.0, false)], tolerance).unwrap();
        assert!(result.matches);
        assert_eq!(result.line_sum, 500.0);
    }

    #[test]
    fn tax_on_top_of_items_matches() {
        let result = reconcile(Some(1080.0), Some(80.0), &[item(1000.0, true)], tolerance).unwrap();
        assert!(result.matches);
    }

    #[test]
    fn large_gap_is_mismatch() {
        let result = reconcile(Some(1000.0), None, &[item(700.0, true)], tolerance).unwrap();
        assert!(!result.matches);
    }

    #[test]
    fn small_totals_use_floor() {
        let result = reconcile(Some(50.0), None, &[item(49.2, true)], tolerance).unwrap();
        assert!(result.matches);
    }

    #[test]
    fn nothing_to_compare() {
        assert!(reconcile(None, None, &[item(10.0, true)], tolerance).is_none());
        assert!(reconcile(Some(10.0), None, &[], tolerance).is_none());
    }
}
