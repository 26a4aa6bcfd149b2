//! Side-by-side comparison of the current quote from each submitter in a project.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PriceBreakdown, QuoteStatus, StandardizedQuote};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Lowest total first; quotes without a total last.
    #[default]
    Price,
    /// Highest overall confidence first.
    Confidence,
    /// Most recently submitted first.
    Recency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonOptions {
    /// Also show quotes still waiting on clarification.
    pub include_incomplete: bool,
    pub sort_by: SortKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub submitter_id: Uuid,
    pub quote_id: Uuid,
    pub version: u32,
    pub status: QuoteStatus,
    pub total: Option<f64>,
    pub breakdown: PriceBreakdown,
    pub pricing_confidence: f64,
    pub start_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    pub completion_date: Option<NaiveDate>,
    pub timeline_confidence: f64,
    pub included: Vec<String>,
    pub excluded: Vec<String>,
    pub scope_confidence: f64,
    pub warranty: Option<String>,
    pub insurance: Option<String>,
    pub license: Option<String>,
    pub payment_terms: Option<String>,
    pub terms_confidence: f64,
    pub overall_confidence: f64,
    pub flags_for_review: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<&StandardizedQuote> for ComparisonRow {
    fn from(quote: &StandardizedQuote) -> Self {
        Self {
            submitter_id: quote.submitter_id,
            quote_id: quote.id,
            version: quote.version,
            status: quote.status,
            total: quote.pricing.total,
            breakdown: quote.pricing.breakdown.clone(),
            pricing_confidence: quote.pricing.confidence,
            start_date: quote.timeline.start_date,
            duration_days: quote.timeline.duration_days,
            completion_date: quote.timeline.completion_date,
            timeline_confidence: quote.timeline.confidence,
            included: quote.scope.included.clone(),
            excluded: quote.scope.excluded.clone(),
            scope_confidence: quote.scope.confidence,
            warranty: quote.terms.warranty.clone(),
            insurance: quote.terms.insurance.clone(),
            license: quote.terms.license.clone(),
            payment_terms: quote.terms.payment_terms.clone(),
            terms_confidence: quote.terms.confidence,
            overall_confidence: quote.overall_confidence,
            flags_for_review: quote.flags_for_review.clone(),
            submitted_at: quote.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub quote_count: usize,
    pub priced_count: usize,
    pub lowest_total: Option<f64>,
    pub highest_total: Option<f64>,
    pub mean_total: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMatrix {
    pub project_id: Uuid,
    pub options: ComparisonOptions,
    pub rows: Vec<ComparisonRow>,
    pub summary: ComparisonSummary,
}

/// Statuses shown in a comparison.
pub fn is_comparable(status: QuoteStatus, include_incomplete: bool) -> bool {
    match status {
        QuoteStatus::Standardized | QuoteStatus::Reviewed | QuoteStatus::Accepted => true,
        QuoteStatus::NeedsClarification => include_incomplete,
        _ => false,
    }
}

/// Build the matrix from every stored version in a project.
///
/// Each submitter contributes their newest version that has finished
/// processing; a version still being extracted does not hide the one
/// before it. Pure: reads only `quotes`.
pub fn build_comparison(project_id: Uuid, quotes: &[StandardizedQuote], options: ComparisonOptions) -> ComparisonMatrix {
    let mut heads: BTreeMap<Uuid, &StandardizedQuote> = BTreeMap::new();
    for quote in quotes
        .iter()
        .filter(|q| q.project_id == project_id && !q.status.is_in_flight())
    {
        match heads.get(&quote.submitter_id) {
            Some(current) if current.version >= quote.version => {}
            _ => {
                heads.insert(quote.submitter_id, quote);
            }
        }
    }

    let mut rows: Vec<ComparisonRow> = heads
        .into_values()
        .filter(|q| is_comparable(q.status, options.include_incomplete))
        .map(ComparisonRow::from)
        .collect();
    rows.sort_by(|a, b| compare_rows(a, b, options.sort_by));

    let summary = summarize(&rows);
    ComparisonMatrix {
        project_id,
        options,
        rows,
        summary,
    }
}

fn compare_rows(a: &ComparisonRow, b: &ComparisonRow, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::Price => match (a.total, b.total) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortKey::Confidence => b.overall_confidence.total_cmp(&a.overall_confidence),
        SortKey::Recency => b.submitted_at.cmp(&a.submitted_at),
    };
    primary.then_with(|| a.submitter_id.cmp(&b.submitter_id))
}

fn summarize(rows: &[ComparisonRow]) -> ComparisonSummary {
    let totals: Vec<f64> = rows.iter().filter_map(|r| r.total).collect();
    let mean_total = if totals.is_empty() {
        None
    } else {
        Some(totals.iter().sum::<f64>() / totals.len() as f64)
    };
    ComparisonSummary {
        quote_count: rows.len(),
        priced_count: totals.len(),
        lowest_total: totals.iter().copied().reduce(f64::min),
        highest_total: totals.iter().copied().reduce(f64::max),
        mean_total,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration;
    use proptest::prelude::*;

    use super::*;
    use crate::models::LineageKey;

    fn quote(project: Uuid, submitter: Uuid, version: u32, status: QuoteStatus, total: Option<f64>) -> StandardizedQuote {
        let lineage = LineageKey {
            project_id: project,
            submitter_id: submitter,
        };
        let created = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(version as i64);
        let mut q = StandardizedQuote::pending(Uuid::new_v4(), Uuid::new_v4(), lineage, version, None, status, created);
        q.pricing.total = total;
        q
    }

    #[test]
    fn heads_only_sorted_by_price() {
        let project = Uuid::new_v4();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let quotes = vec![
            quote(project, a, 1, QuoteStatus::Standardized, Some(900.0)),
            quote(project, a, 2, QuoteStatus::Standardized, Some(800.0)),
            quote(project, b, 1, QuoteStatus::Reviewed, Some(750.0)),
            quote(project, c, 1, QuoteStatus::Standardized, None),
        ];
        let matrix = build_comparison(project, &quotes, ComparisonOptions::default());
        let totals: Vec<Option<f64>> = matrix.rows.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![Some(750.0), Some(800.0), None]);
        assert_eq!(matrix.rows[1].version, 2);
        assert_eq!(matrix.summary.lowest_total, Some(750.0));
        assert_eq!(matrix.summary.highest_total, Some(800.0));
        assert_eq!(matrix.summary.mean_total, Some(775.0));
        assert_eq!(matrix.summary.priced_count, 2);
    }

    #[test]
    fn in_flight_version_does_not_hide_previous() {
        let project = Uuid::new_v4();
        let a = Uuid::new_v4();
        let quotes = vec![
            quote(project, a, 1, QuoteStatus::Standardized, Some(500.0)),
            quote(project, a, 2, QuoteStatus::Processing, None),
        ];
        let matrix = build_comparison(project, &quotes, ComparisonOptions::default());
        assert_eq!(matrix.rows.len(), 1);
        assert_eq!(matrix.rows[0].version, 1);
    }

    #[test]
    fn withdrawn_and_rejected_never_shown() {
        let project = Uuid::new_v4();
        let quotes = vec![
            quote(project, Uuid::new_v4(), 1, QuoteStatus::Withdrawn, Some(1.0)),
            quote(project, Uuid::new_v4(), 1, QuoteStatus::Rejected, Some(2.0)),
            quote(project, Uuid::new_v4(), 1, QuoteStatus::NeedsClarification, Some(3.0)),
        ];
        let strict = build_comparison(project, &quotes, ComparisonOptions::default());
        assert!(strict.rows.is_empty());
        assert_eq!(strict.summary.lowest_total, None);

        let loose = build_comparison(
            project,
            &quotes,
            ComparisonOptions {
                include_incomplete: true,
                sort_by: SortKey::Price,
            },
        );
        assert_eq!(loose.rows.len(), 1);
        assert_eq!(loose.rows[0].status, QuoteStatus::NeedsClarification);
    }

    #[test]
    fn confidence_and_recency_orders() {
        let project = Uuid::new_v4();
        let mut low = quote(project, Uuid::new_v4(), 1, QuoteStatus::Standardized, Some(1.0));
        low.overall_confidence = 0.72;
        let mut high = quote(project, Uuid::new_v4(), 3, QuoteStatus::Standardized, Some(2.0));
        high.overall_confidence = 0.95;
        let quotes = vec![low.clone(), high.clone()];

        let by_confidence = build_comparison(
            project,
            &quotes,
            ComparisonOptions {
                include_incomplete: false,
                sort_by: SortKey::Confidence,
            },
        );
        assert_eq!(by_confidence.rows[0].quote_id, high.id);

        let by_recency = build_comparison(
            project,
            &quotes,
            ComparisonOptions {
                include_incomplete: false,
                sort_by: SortKey::Recency,
            },
        );
        assert_eq!(by_recency.rows[0].quote_id, high.id);
    }

    #[test]
    fn other_projects_ignored() {
        let project = Uuid::new_v4();
        let quotes = vec![quote(Uuid::new_v4(), Uuid::new_v4(), 1, QuoteStatus::Standardized, Some(5.0))];
        assert!(build_comparison(project, &quotes, ComparisonOptions::default()).rows.is_empty());
    }

    fn status_strategy() -> impl Strategy<Value = QuoteStatus> {
        prop::sample::select(QuoteStatus::all())
    }

    proptest! {
        /// Every submitter whose newest settled version is comparable appears exactly once.
        #[test]
        fn prop_comparison_is_complete(
            lineages in prop::collection::vec(prop::collection::vec(status_strategy(), 1..5), 0..8),
            include_incomplete in any::<bool>(),
        ) {
            let project = Uuid::new_v4();
            let mut quotes = Vec::new();
            let mut expected = BTreeSet::new();
            for statuses in &lineages {
                let submitter = Uuid::new_v4();
                for (i, status) in statuses.iter().enumerate() {
                    quotes.push(quote(project, submitter, i as u32 + 1, *status, Some(100.0 + i as f64)));
                }
                let settled = statuses.iter().rev().find(|s| !s.is_in_flight());
                if settled.is_some_and(|s| is_comparable(*s, include_incomplete)) {
                    expected.insert(submitter);
                }
            }

            let matrix = build_comparison(
                project,
                &quotes,
                ComparisonOptions { include_incomplete, sort_by: SortKey::Price },
            );
            let shown: BTreeSet<Uuid> = matrix.rows.iter().map(|r| r.submitter_id).collect();
            prop_assert_eq!(shown.len(), matrix.rows.len());
            prop_assert_eq!(shown, expected);
            for row in &matrix.rows {
                prop_assert!(!matches!(row.status, QuoteStatus::Withdrawn | QuoteStatus::Rejected));
            }
            for pair in matrix.rows.windows(2) {
                prop_assert!(pair[0].total <= pair[1].total);
            }
        }
    }
}
