use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ExtractionMethod;

/// Audit entry for one candidate value proposed for a quote field.
/// Every candidate is kept; `selected` marks the one the mapper used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: Uuid,
    pub quote_id: Uuid,
    pub field_name: String,
    pub extracted_value: String,
    pub confidence: f64,
    pub extraction_method: ExtractionMethod,
    pub selected: bool,
}
