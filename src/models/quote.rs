use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Component, QuoteStatus};

/// Identifies one submitter's sequence of quote versions within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageKey {
    pub project_id: Uuid,
    pub submitter_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub labor: Option<f64>,
    pub materials: Option<f64>,
    pub other: Option<f64>,
    pub tax: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub total: Option<f64>,
    pub breakdown: PriceBreakdown,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub start_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    pub completion_date: Option<NaiveDate>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
    pub materials_provided: Vec<String>,
    pub materials_required: Vec<String>,
    pub assumptions: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Terms {
    pub warranty: Option<String>,
    pub insurance: Option<String>,
    pub license: Option<String>,
    pub cancellation: Option<String>,
    pub payment_terms: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One version of a submitter's quote, normalized into the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedQuote {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub project_id: Uuid,
    pub submitter_id: Uuid,
    pub version: u32,
    pub previous_version_id: Option<Uuid>,
    pub pricing: Pricing,
    pub timeline: Timeline,
    pub scope: Scope,
    pub terms: Terms,
    pub contact: Contact,
    pub overall_confidence: f64,
    pub status: QuoteStatus,
    pub flags_for_review: Vec<String>,
    /// Fast-pass estimate, available before the deep pass finishes.
    pub provisional_total: Option<f64>,
    pub primary_category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StandardizedQuote {
    /// A fresh, unextracted version in `status`.
    pub fn pending(
        id: Uuid,
        submission_id: Uuid,
        lineage: LineageKey,
        version: u32,
        previous_version_id: Option<Uuid>,
        status: QuoteStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            submission_id,
            project_id: lineage.project_id,
            submitter_id: lineage.submitter_id,
            version,
            previous_version_id,
            pricing: Pricing::default(),
            timeline: Timeline::default(),
            scope: Scope::default(),
            terms: Terms::default(),
            contact: Contact::default(),
            overall_confidence: 0.0,
            status,
            flags_for_review: Vec::new(),
            provisional_total: None,
            primary_category: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lineage_key(&self) -> LineageKey {
        LineageKey {
            project_id: self.project_id,
            submitter_id: self.submitter_id,
        }
    }

    pub fn component_confidence(&self, component: Component) -> f64 {
        match component {
            Component::Pricing => self.pricing.confidence,
            Component::Timeline => self.timeline.confidence,
            Component::Scope => self.scope.confidence,
            Component::Terms => self.terms.confidence,
        }
    }
}
