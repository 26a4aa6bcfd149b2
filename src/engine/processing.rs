//! Background processing of one quote version: fast pass, deep pass,
//! mapping, then the state transition that records the outcome.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{load_quote, EngineError, Shared};
use crate::db;
use crate::events::QuoteEvent;
use crate::lifecycle::transition;
use crate::models::{QuoteStatus, Submission};
use crate::pipeline::extraction::{
    dedupe_candidates, read_text_layer, run_fast_pass, Candidate, ExtractionInput, ProvisionalSketch,
};
use crate::review::{ReviewReason, FLAG_EXTRACTION_FAILED, FLAG_EXTRACTION_TIMEOUT};

pub(crate) enum Work {
    /// Run both extraction passes over the stored payload.
    Extract,
    /// Re-map a known candidate set after a clarification.
    Remap(Vec<Candidate>),
}

struct Extracted {
    candidates: Vec<Candidate>,
    timed_out: bool,
}

impl Shared {
    /// Worker entry point, run on the lineage's FIFO worker so versions of one
    /// lineage never overlap. Errors are logged here and never reach the
    /// caller of `submit`.
    pub(super) async fn process(self: Arc<Self>, quote_id: Uuid, work: Work) {
        if let Err(e) = self.advance(&quote_id, QuoteStatus::Processing) {
            log_discarded(&quote_id, &e);
            return;
        }

        let extracted = match work {
            Work::Extract => self.extract(&quote_id).await,
            Work::Remap(candidates) => Ok(Extracted {
                candidates,
                timed_out: false,
            }),
        };

        match extracted.and_then(|extracted| self.settle(&quote_id, extracted)) {
            Ok(status) => {
                tracing::info!(quote_id = %quote_id, status = %status, "Quote processed");
            }
            Err(e) => log_discarded(&quote_id, &e),
        }
    }

    async fn extract(&self, quote_id: &Uuid) -> Result<Extracted, EngineError> {
        let submission = self.submission_for(quote_id)?;
        let payload = self.payloads.get(&submission.raw_payload_ref)?;

        let text = read_text_layer(submission.channel, &submission.detected_mime, &payload).unwrap_or_else(|e| {
            tracing::warn!(quote_id = %quote_id, error = %e, "Text layer unreadable");
            None
        });
        let input = ExtractionInput {
            submission_id: submission.id,
            channel: submission.channel,
            mime: submission.detected_mime.clone(),
            payload,
            reference_date: submission.received_at.date_naive(),
            text,
        };

        let sketch = run_fast_pass(Arc::new(input.clone()), self.config.fast_pass_timeout()).await;
        self.record_sketch(quote_id, &sketch)?;

        let outcome = self.deep_pass.run(input).await;
        Ok(Extracted {
            candidates: dedupe_candidates(outcome.candidates),
            timed_out: !outcome.timed_out.is_empty(),
        })
    }

    fn submission_for(&self, quote_id: &Uuid) -> Result<Submission, EngineError> {
        let conn = self.conn()?;
        let quote = load_quote(&conn, quote_id)?;
        db::get_submission(&conn, &quote.submission_id)?.ok_or(EngineError::SubmissionNotFound(quote.submission_id))
    }

    fn record_sketch(&self, quote_id: &Uuid, sketch: &ProvisionalSketch) -> Result<(), EngineError> {
        if sketch.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            quote_id = %quote_id,
            provisional_total = ?sketch.total,
            category = ?sketch.category,
            "Provisional sketch ready"
        );
        let conn = self.conn()?;
        if !db::update_provisional(&conn, quote_id, sketch.total, sketch.category.map(|c| c.as_str()))? {
            tracing::debug!(quote_id = %quote_id, "Quote left processing, sketch dropped");
        }
        Ok(())
    }

    /// Map the candidates and persist the quote with its children in one write.
    ///
    /// The status is re-read under the connection lock, so a quote withdrawn
    /// while extraction ran fails the transition and nothing is written.
    fn settle(&self, quote_id: &Uuid, extracted: Extracted) -> Result<QuoteStatus, EngineError> {
        let mapped = (!extracted.candidates.is_empty()).then(|| self.mapper.map(&extracted.candidates));
        let now = Utc::now();

        let conn = self.conn()?;
        let mut quote = load_quote(&conn, quote_id)?;
        let from = quote.status;

        let (line_items, records) = match &mapped {
            Some(mapped) => {
                quote.status = transition(from, mapped.status)?;
                mapped.apply_to(&mut quote, now)
            }
            None => {
                quote.status = transition(from, QuoteStatus::NeedsClarification)?;
                quote.overall_confidence = 0.0;
                quote.flags_for_review = vec![FLAG_EXTRACTION_FAILED.to_string()];
                quote.updated_at = now;
                (Vec::new(), Vec::new())
            }
        };
        if extracted.timed_out {
            quote.flags_for_review.push(FLAG_EXTRACTION_TIMEOUT.to_string());
        }
        db::save_mapped_quote(&conn, &quote, &line_items, &records)?;

        self.events.publish(QuoteEvent::QuoteStateChanged {
            quote_id: quote.id,
            from,
            to: quote.status,
        });
        match quote.status {
            QuoteStatus::Standardized => self.events.publish(QuoteEvent::QuoteStandardized {
                quote_id: quote.id,
                overall_confidence: quote.overall_confidence,
            }),
            _ => self.events.publish(QuoteEvent::QuoteNeedsClarification {
                quote_id: quote.id,
                flags: quote.flags_for_review.clone(),
            }),
        }
        drop(conn);

        tracing::info!(
            quote_id = %quote.id,
            candidates = extracted.candidates.len(),
            records = records.len(),
            line_items = line_items.len(),
            overall = quote.overall_confidence,
            flags = ?quote.flags_for_review,
            "Quote mapped"
        );

        if quote.status == QuoteStatus::NeedsClarification {
            for reason in quote.flags_for_review.iter().filter_map(|f| ReviewReason::from_flag(f)) {
                self.review.enqueue(quote.id, reason);
            }
        } else if extracted.timed_out {
            self.review.enqueue(quote.id, ReviewReason::ExtractionTimeout);
        }
        Ok(quote.status)
    }
}

fn log_discarded(quote_id: &Uuid, error: &EngineError) {
    match error {
        EngineError::Lifecycle(e) => {
            tracing::info!(quote_id = %quote_id, reason = %e, "Quote changed state during processing, result discarded");
        }
        other => {
            tracing::error!(quote_id = %quote_id, error = %other, "Quote processing failed");
        }
    }
}
