use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::confidence::{score_components, ComponentScores};
use super::reconcile::{reconcile, Reconciliation};
use crate::config::{ComponentWeights, IntakeConfig};
use crate::models::fields::{self, field_spec, parse_field_value, FieldValue, LineItemCandidate};
use crate::models::{
    Component, Contact, ExtractionMethod, ExtractionRecord, LineItem, LineItemType, PriceBreakdown, Pricing,
    QuoteStatus, Scope, StandardizedQuote, Terms, Timeline,
};
use crate::pipeline::extraction::Candidate;

pub const FLAG_RECONCILIATION_MISMATCH: &str = "reconciliation_mismatch";
const SYNTHETIC_ITEM_DESCRIPTION: &str = "Quoted total";

/// A line item chosen by the mapper, with the confidence of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedLineItem {
    pub item: LineItemCandidate,
    pub confidence: f64,
    /// Stands in for a quote that was not itemized.
    pub synthetic: bool,
}

/// One candidate with the mapper's verdict on it.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub candidate: Candidate,
    pub selected: bool,
}

/// Result of standardizing one candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedQuote {
    pub pricing: Pricing,
    pub timeline: Timeline,
    pub scope: Scope,
    pub terms: Terms,
    pub contact: Contact,
    pub scores: ComponentScores,
    pub overall_confidence: f64,
    pub status: QuoteStatus,
    pub flags: Vec<String>,
    pub low_confidence: Vec<Component>,
    pub reconciliation: Option<Reconciliation>,
    pub line_items: Vec<MappedLineItem>,
    pub records: Vec<MappedRecord>,
}

impl MappedQuote {
    pub fn reconciliation_mismatch(&self) -> bool {
        self.reconciliation.is_some_and(|r| !r.matches)
    }

    pub fn selected(&self) -> impl Iterator<Item = &Candidate> {
        self.records.iter().filter(|r| r.selected).map(|r| &r.candidate)
    }

    /// Write the mapped fields onto `quote` and build its child rows.
    ///
    /// Status is not touched; the caller moves it through the state machine.
    pub fn apply_to(&self, quote: &mut StandardizedQuote, now: DateTime<Utc>) -> (Vec<LineItem>, Vec<ExtractionRecord>) {
        quote.pricing = self.pricing.clone();
        quote.timeline = self.timeline.clone();
        quote.scope = self.scope.clone();
        quote.terms = self.terms.clone();
        quote.contact = self.contact.clone();
        quote.overall_confidence = self.overall_confidence;
        quote.flags_for_review = self.flags.clone();
        quote.updated_at = now;

        let line_items = self
            .line_items
            .iter()
            .enumerate()
            .map(|(order, mapped)| LineItem {
                id: Uuid::new_v4(),
                quote_id: quote.id,
                item_type: mapped.item.item_type,
                description: mapped.item.description.clone(),
                quantity: mapped.item.quantity,
                unit_of_measure: mapped.item.unit_of_measure.clone(),
                unit_price: mapped.item.unit_price,
                total_price: mapped.item.total_price,
                is_included: mapped.item.is_included,
                display_order: order as u32,
                confidence: mapped.confidence,
            })
            .collect();

        let records = self
            .records
            .iter()
            .map(|record| ExtractionRecord {
                id: Uuid::new_v4(),
                quote_id: quote.id,
                field_name: record.candidate.field_name.clone(),
                extracted_value: record.candidate.value.clone(),
                confidence: record.candidate.confidence,
                extraction_method: record.candidate.method,
                selected: record.selected,
            })
            .collect();

        (line_items, records)
    }
}

/// Ranking used everywhere a single candidate must win: confidence, then
/// method precedence, then the smaller value text.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.method.precedence().cmp(&a.method.precedence()))
        .then_with(|| a.value.cmp(&b.value))
}

#[derive(Debug, Clone)]
pub struct StandardizationMapper {
    threshold: f64,
    weights: ComponentWeights,
    tolerance_ratio: f64,
    tolerance_min: f64,
}

impl StandardizationMapper {
    pub fn from_config(config: &IntakeConfig) -> Self {
        Self {
            threshold: config.confidence_threshold,
            weights: config.component_weights.normalized(),
            tolerance_ratio: config.reconciliation_tolerance_ratio,
            tolerance_min: config.reconciliation_tolerance_min,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Standardize a candidate set. The result depends only on the set, not its order.
    pub fn map(&self, candidates: &[Candidate]) -> MappedQuote {
        let mut by_field: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
        for candidate in candidates {
            by_field.entry(candidate.field_name.as_str()).or_default().push(candidate);
        }

        let mut records: Vec<MappedRecord> = Vec::with_capacity(candidates.len());
        let mut values: BTreeMap<&str, (FieldValue, f64)> = BTreeMap::new();
        let mut line_item_pool: Vec<(&Candidate, LineItemCandidate)> = Vec::new();

        for (field, mut group) in by_field {
            group.sort_by(|a, b| rank(a, b));
            let Some(spec) = field_spec(field) else {
                tracing::debug!(field, count = group.len(), "Keeping candidates for unknown field as audit only");
                records.extend(group.into_iter().map(unselected));
                continue;
            };

            if field == fields::LINE_ITEM {
                for candidate in &group {
                    if let Some(FieldValue::LineItem(item)) = parse_field_value(field, &candidate.value) {
                        line_item_pool.push((*candidate, item));
                    }
                }
                continue;
            }

            let mut chosen = false;
            for candidate in group {
                if !chosen {
                    if let Some(value) = parse_field_value(spec.name, &candidate.value) {
                        values.insert(spec.name, (value, candidate.confidence));
                        records.push(MappedRecord {
                            candidate: candidate.clone(),
                            selected: true,
                        });
                        chosen = true;
                        continue;
                    }
                }
                records.push(unselected(candidate));
            }
        }

        let (chosen_method, itemized) = choose_line_items(&line_item_pool);
        for candidate in candidates.iter().filter(|c| c.field_name == fields::LINE_ITEM) {
            let selected = chosen_method.is_some_and(|m| m == candidate.method)
                && line_item_pool.iter().any(|(c, _)| std::ptr::eq(*c, candidate));
            records.push(MappedRecord {
                candidate: candidate.clone(),
                selected,
            });
        }
        records.sort_by(|a, b| {
            a.candidate
                .field_name
                .cmp(&b.candidate.field_name)
                .then_with(|| b.selected.cmp(&a.selected))
                .then_with(|| rank(&a.candidate, &b.candidate))
        });

        let pricing = Pricing {
            total: money(&values, fields::PRICING_TOTAL),
            breakdown: PriceBreakdown {
                labor: money(&values, fields::PRICING_LABOR),
                materials: money(&values, fields::PRICING_MATERIALS),
                other: money(&values, fields::PRICING_OTHER),
                tax: money(&values, fields::PRICING_TAX),
            },
            confidence: 0.0,
        };
        let timeline = Timeline {
            start_date: date(&values, fields::TIMELINE_START_DATE),
            duration_days: match values.get(fields::TIMELINE_DURATION_DAYS) {
                Some((FieldValue::Days(days), _)) => Some(*days),
                _ => None,
            },
            completion_date: date(&values, fields::TIMELINE_COMPLETION_DATE),
            confidence: 0.0,
        };
        let scope = Scope {
            included: list(&values, fields::SCOPE_INCLUDED),
            excluded: list(&values, fields::SCOPE_EXCLUDED),
            materials_provided: list(&values, fields::SCOPE_MATERIALS_PROVIDED),
            materials_required: list(&values, fields::SCOPE_MATERIALS_REQUIRED),
            assumptions: list(&values, fields::SCOPE_ASSUMPTIONS),
            confidence: 0.0,
        };
        let terms = Terms {
            warranty: text(&values, fields::TERMS_WARRANTY),
            insurance: text(&values, fields::TERMS_INSURANCE),
            license: text(&values, fields::TERMS_LICENSE),
            cancellation: text(&values, fields::TERMS_CANCELLATION),
            payment_terms: text(&values, fields::TERMS_PAYMENT),
            confidence: 0.0,
        };
        let contact = Contact {
            name: text(&values, fields::CONTACT_NAME),
            email: text(&values, fields::CONTACT_EMAIL),
            phone: text(&values, fields::CONTACT_PHONE),
        };

        let selected: Vec<(Component, &str, f64)> = values
            .iter()
            .filter_map(|(name, (_, confidence))| {
                field_spec(name)
                    .and_then(|spec| spec.component)
                    .map(|component| (component, *name, *confidence))
            })
            .collect();
        let scores = score_components(&selected, pricing.total.is_some());
        let overall_confidence = scores.overall(&self.weights);

        let itemized_lines: Vec<LineItemCandidate> = itemized.iter().map(|(item, _)| item.clone()).collect();
        let reconciliation = reconcile(pricing.total, pricing.breakdown.tax, &itemized_lines, |total| {
            (total.abs() * self.tolerance_ratio).max(self.tolerance_min)
        });

        let mut line_items: Vec<MappedLineItem> = itemized
            .into_iter()
            .map(|(item, confidence)| MappedLineItem {
                item,
                confidence,
                synthetic: false,
            })
            .collect();
        if line_items.is_empty() {
            if let Some(total) = pricing.total {
                let confidence = values.get(fields::PRICING_TOTAL).map_or(0.0, |(_, c)| *c);
                line_items.push(MappedLineItem {
                    item: LineItemCandidate {
                        item_type: LineItemType::Other,
                        description: SYNTHETIC_ITEM_DESCRIPTION.into(),
                        quantity: None,
                        unit_of_measure: None,
                        unit_price: None,
                        total_price: total,
                        is_included: true,
                    },
                    confidence,
                    synthetic: true,
                });
            }
        }

        let status = if overall_confidence >= self.threshold {
            QuoteStatus::Standardized
        } else {
            QuoteStatus::NeedsClarification
        };
        let low_confidence = if status == QuoteStatus::NeedsClarification {
            scores.below(self.threshold)
        } else {
            Vec::new()
        };
        let mut flags: Vec<String> = low_confidence.iter().map(|c| format!("low_confidence:{c}")).collect();
        if reconciliation.is_some_and(|r| !r.matches) {
            flags.push(FLAG_RECONCILIATION_MISMATCH.into());
        }

        tracing::debug!(
            candidates = candidates.len(),
            overall = overall_confidence,
            status = %status,
            flags = flags.len(),
            "Candidates mapped"
        );

        MappedQuote {
            pricing: Pricing {
                confidence: scores.pricing,
                ..pricing
            },
            timeline: Timeline {
                confidence: scores.timeline,
                ..timeline
            },
            scope: Scope {
                confidence: scores.scope,
                ..scope
            },
            terms: Terms {
                confidence: scores.terms,
                ..terms
            },
            contact,
            scores,
            overall_confidence,
            status,
            flags,
            low_confidence,
            reconciliation,
            line_items,
            records,
        }
    }
}

fn unselected(candidate: &Candidate) -> MappedRecord {
    MappedRecord {
        candidate: candidate.clone(),
        selected: false,
    }
}

/// Itemization comes from a single method so lines from different readings
/// of the same document are never mixed. The method whose items carry the
/// best mean confidence wins; precedence breaks ties.
fn choose_line_items(
    pool: &[(&Candidate, LineItemCandidate)],
) -> (Option<ExtractionMethod>, Vec<(LineItemCandidate, f64)>) {
    let mut by_method: BTreeMap<u8, (ExtractionMethod, Vec<&(&Candidate, LineItemCandidate)>)> = BTreeMap::new();
    for entry in pool {
        let method = entry.0.method;
        by_method
            .entry(method.precedence())
            .or_insert_with(|| (method, Vec::new()))
            .1
            .push(entry);
    }

    let best = by_method
        .into_values()
        .map(|(method, entries)| {
            let mean = entries.iter().map(|(c, _)| c.confidence).sum::<f64>() / entries.len() as f64;
            (method, mean, entries)
        })
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.0.precedence().cmp(&b.0.precedence())));

    match best {
        Some((method, _, entries)) => {
            let mut items: Vec<(LineItemCandidate, f64)> =
                entries.into_iter().map(|(c, item)| (item.clone(), c.confidence)).collect();
            // Input order varies with scheduling; order lines by content for a stable layout.
            items.sort_by(|a, b| {
                a.0.description
                    .cmp(&b.0.description)
                    .then(a.0.total_price.total_cmp(&b.0.total_price))
                    .then(b.1.total_cmp(&a.1))
            });
            (Some(method), items)
        }
        None => (None, Vec::new()),
    }
}

fn money(values: &BTreeMap<&str, (FieldValue, f64)>, field: &str) -> Option<f64> {
    match values.get(field) {
        Some((FieldValue::Money(amount), _)) => Some(*amount),
        _ => None,
    }
}

fn date(values: &BTreeMap<&str, (FieldValue, f64)>, field: &str) -> Option<chrono::NaiveDate> {
    match values.get(field) {
        Some((FieldValue::Date(date), _)) => Some(*date),
        _ => None,
    }
}

fn text(values: &BTreeMap<&str, (FieldValue, f64)>, field: &str) -> Option<String> {
    match values.get(field) {
        Some((FieldValue::Text(text), _)) => Some(text.clone()),
        _ => None,
    }
}

fn list(values: &BTreeMap<&str, (FieldValue, f64)>, field: &str) -> Vec<String> {
    match values.get(field) {
        Some((FieldValue::List(entries), _)) => entries.clone(),
        _ => Vec::new(),
    }
}
