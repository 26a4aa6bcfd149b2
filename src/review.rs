//! Review queue: quotes waiting on a person, one entry per (quote, reason).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Component;

pub const FLAG_EXTRACTION_FAILED: &str = "extraction_failed";
pub const FLAG_EXTRACTION_TIMEOUT: &str = "extraction_timeout";

/// Why a quote needs a person to look at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    ExtractionFailed,
    ExtractionTimeout,
    LowConfidence(Component),
    ReconciliationMismatch,
    /// A reviewer asked the submitter about these fields.
    ClarificationRequested(String),
}

impl ReviewReason {
    /// Parse a review flag as stored on a quote.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            FLAG_EXTRACTION_FAILED => Some(Self::ExtractionFailed),
            FLAG_EXTRACTION_TIMEOUT => Some(Self::ExtractionTimeout),
            "reconciliation_mismatch" => Some(Self::ReconciliationMismatch),
            _ => {
                if let Some(component) = flag.strip_prefix("low_confidence:") {
                    return component.parse().ok().map(Self::LowConfidence);
                }
                flag.strip_prefix("clarification_requested:")
                    .map(|fields| Self::ClarificationRequested(fields.to_string()))
            }
        }
    }
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtractionFailed => f.write_str(FLAG_EXTRACTION_FAILED),
            Self::ExtractionTimeout => f.write_str(FLAG_EXTRACTION_TIMEOUT),
            Self::LowConfidence(component) => write!(f, "low_confidence:{component}"),
            Self::ReconciliationMismatch => f.write_str("reconciliation_mismatch"),
            Self::ClarificationRequested(fields) => write!(f, "clarification_requested:{fields}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub quote_id: Uuid,
    pub reason: ReviewReason,
    pub enqueued_at: DateTime<Utc>,
}

/// In-memory review queue, ordered by quote then reason.
#[derive(Debug, Default)]
pub struct ReviewQueue {
    entries: Mutex<BTreeMap<(Uuid, ReviewReason), DateTime<Utc>>>,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(Uuid, ReviewReason), DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an entry. Returns false if the same (quote, reason) is already queued.
    pub fn enqueue(&self, quote_id: Uuid, reason: ReviewReason) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&(quote_id, reason.clone())) {
            return false;
        }
        tracing::info!(quote_id = %quote_id, reason = %reason, "Quote queued for review");
        entries.insert((quote_id, reason), Utc::now());
        true
    }

    /// Remove every entry for a quote, returning what was removed.
    pub fn resolve(&self, quote_id: &Uuid) -> Vec<ReviewEntry> {
        let mut entries = self.lock();
        let keys: Vec<(Uuid, ReviewReason)> = entries
            .keys()
            .filter(|(id, _)| id == quote_id)
            .cloned()
            .collect();
        keys.into_iter()
            .filter_map(|key| {
                entries.remove(&key).map(|enqueued_at| ReviewEntry {
                    quote_id: key.0,
                    reason: key.1,
                    enqueued_at,
                })
            })
            .collect()
    }

    pub fn entries_for(&self, quote_id: &Uuid) -> Vec<ReviewEntry> {
        self.lock()
            .iter()
            .filter(|((id, _), _)| id == quote_id)
            .map(|((id, reason), at)| ReviewEntry {
                quote_id: *id,
                reason: reason.clone(),
                enqueued_at: *at,
            })
            .collect()
    }

    /// Every pending entry, oldest first.
    pub fn pending(&self) -> Vec<ReviewEntry> {
        let mut all: Vec<ReviewEntry> = self
            .lock()
            .iter()
            .map(|((id, reason), at)| ReviewEntry {
                quote_id: *id,
                reason: reason.clone(),
                enqueued_at: *at,
            })
            .collect();
        all.sort_by_key(|e| e.enqueued_at);
        all
    }

    pub fn contains(&self, quote_id: &Uuid, reason: &ReviewReason) -> bool {
        self.lock().contains_key(&(*quote_id, reason.clone()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent_per_reason() {
        let queue = ReviewQueue::new();
        let id = Uuid::new_v4();
        assert!(queue.enqueue(id, ReviewReason::ExtractionFailed));
        assert!(!queue.enqueue(id, ReviewReason::ExtractionFailed));
        assert!(queue.enqueue(id, ReviewReason::LowConfidence(Component::Scope)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn resolve_removes_only_that_quote() {
        let queue = ReviewQueue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.enqueue(a, ReviewReason::ExtractionFailed);
        queue.enqueue(a, ReviewReason::ExtractionTimeout);
        queue.enqueue(b, ReviewReason::ReconciliationMismatch);

        let removed = queue.resolve(&a);
        assert_eq!(removed.len(), 2);
        assert!(queue.entries_for(&a).is_empty());
        assert!(queue.contains(&b, &ReviewReason::ReconciliationMismatch));
    }

    #[test]
    fn reasons_display_as_flags_and_parse_back() {
        let reasons = [
            ReviewReason::ExtractionFailed,
            ReviewReason::ExtractionTimeout,
            ReviewReason::LowConfidence(Component::Pricing),
            ReviewReason::ReconciliationMismatch,
            ReviewReason::ClarificationRequested("pricing.total".into()),
        ];
        for reason in reasons {
            assert_eq!(ReviewReason::from_flag(&reason.to_string()), Some(reason));
        }
        assert_eq!(ReviewReason::LowConfidence(Component::Terms).to_string(), "low_confidence:terms");
        assert_eq!(ReviewReason::from_flag("something_else"), None);
    }
}
