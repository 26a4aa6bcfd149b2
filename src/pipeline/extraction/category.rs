//! Trade category detection by keyword.

use crate::models::TradeCategory;

const KEYWORDS: &[(TradeCategory, &[&str])] = &[
    (
        TradeCategory::Plumbing,
        &["plumb", "pipe", "faucet", "toilet", "drain", "water heater", "sewer", "leak", "valve"],
    ),
    (
        TradeCategory::Electrical,
        &["electric", "wiring", "outlet", "breaker", "panel", "circuit", "light fixture", "gfci"],
    ),
    (
        TradeCategory::Hvac,
        &["hvac", "furnace", "air condition", "a/c", "heat pump", "duct", "thermostat", "condenser"],
    ),
    (TradeCategory::Roofing, &["roof", "shingle", "gutter", "flashing", "soffit"]),
    (
        TradeCategory::Flooring,
        &["floor", "tile", "carpet", "hardwood", "laminate", "vinyl plank", "grout"],
    ),
    (
        TradeCategory::Appliances,
        &["appliance", "dishwasher", "refrigerator", "fridge", "washer", "dryer", "oven", "range hood"],
    ),
];

/// Category with the most keyword hits. Text with no trade keywords is
/// general maintenance; blank text has no category.
pub fn detect_category(text: &str) -> Option<TradeCategory> {
    if text.trim().is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    let mut best: Option<(TradeCategory, usize)> = None;
    for (category, words) in KEYWORDS {
        let hits: usize = words.iter().map(|w| lower.matches(w).count()).sum();
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((*category, hits));
        }
    }
    Some(best.map_or(TradeCategory::GeneralMaintenance, |(c, _)| c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongest_trade_wins() {
        assert_eq!(
            detect_category("Replace water heater, new drain pipe and shutoff valve"),
            Some(TradeCategory::Plumbing)
        );
        assert_eq!(
            detect_category("Tear off and re-shingle roof, new gutters"),
            Some(TradeCategory::Roofing)
        );
    }

    #[test]
    fn unmatched_text_is_general() {
        assert_eq!(
            detect_category("Patch drywall and paint hallway"),
            Some(TradeCategory::GeneralMaintenance)
        );
    }

    #[test]
    fn blank_text_has_no_category() {
        assert_eq!(detect_category("   "), None);
    }
}
