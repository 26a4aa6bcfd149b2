use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LineItemType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub item_type: LineItemType,
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_of_measure: Option<String>,
    pub unit_price: Option<f64>,
    pub total_price: f64,
    pub is_included: bool,
    pub display_order: u32,
    pub confidence: f64,
}
