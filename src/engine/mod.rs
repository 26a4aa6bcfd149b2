//! Engine facade: synchronous intake and lifecycle actions, with extraction
//! running on per-lineage background workers.

mod processing;


use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::comparison::{self, ComparisonMatrix, ComparisonOptions};
use crate::config::{ConfigError, IntakeConfig};
use crate::db::{self, DatabaseError};
use crate::events::{EventBus, QuoteEvent};
use crate::lifecycle::{accepts_new_version, transition, LifecycleError, LineageWorkers};
use crate::models::fields::{field_spec, parse_field_value};
use crate::models::{
    Channel, ExtractionMethod, ExtractionRecord, LineItem, LineageKey, QuoteStatus, StandardizedQuote, Submission,
    SubmissionMetadata,
};
use crate::pipeline::extraction::{
    Candidate, CandidateExtractor, DeepPass, NoVisionBackend, RetryPolicy, VisionTextRecognizer,
};
use crate::pipeline::intake::{
    sanitize_filename, validate_submission, IntakeError, MemoryPayloadStore, PayloadStore,
};
use crate::pipeline::standardize::StandardizationMapper;
use crate::review::{ReviewQueue, ReviewReason};

use processing::Work;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Quote not found: {0}")]
    QuoteNotFound(Uuid),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(Uuid),

    #[error("Quote {0} has been superseded by a newer version")]
    NotLineageHead(Uuid),

    #[error("Invalid correction for {field}: {reason}")]
    InvalidCorrection { field: String, reason: String },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("No tokio runtime available for background extraction")]
    RuntimeUnavailable,
}

/// A raw submission as it arrives from any channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub project_id: Uuid,
    pub submitter_id: Uuid,
    pub channel: Channel,
    pub payload: Vec<u8>,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
}

impl SubmissionRequest {
    pub fn lineage(&self) -> LineageKey {
        LineageKey {
            project_id: self.project_id,
            submitter_id: self.submitter_id,
        }
    }
}

/// Returned as soon as a submission is stored; extraction has not run yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionAck {
    pub submission_id: Uuid,
    pub quote_id: Uuid,
    pub version: u32,
    pub status: QuoteStatus,
}

enum Storage {
    Memory,
    File(PathBuf),
}

pub struct QuoteEngineBuilder {
    config: IntakeConfig,
    storage: Storage,
    payloads: Option<Arc<dyn PayloadStore>>,
    recognizer: Option<Arc<dyn VisionTextRecognizer>>,
    extractors: Vec<Arc<dyn CandidateExtractor>>,
}

impl Default for QuoteEngineBuilder {
    fn default() -> Self {
        Self::new(IntakeConfig::default())
    }
}

impl QuoteEngineBuilder {
    pub fn new(config: IntakeConfig) -> Self {
        Self {
            config,
            storage: Storage::Memory,
            payloads: None,
            recognizer: None,
            extractors: Vec::new(),
        }
    }

    /// Persist to a SQLite file instead of memory.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = Storage::File(path.into());
        self
    }

    pub fn payload_store(mut self, store: Arc<dyn PayloadStore>) -> Self {
        self.payloads = Some(store);
        self
    }

    pub fn vision_recognizer(mut self, recognizer: Arc<dyn VisionTextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Register an extractor alongside the built-in ones.
    pub fn extractor(mut self, extractor: Arc<dyn CandidateExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn build(self) -> Result<QuoteEngine, EngineError> {
        self.config.validate()?;

        let conn = match &self.storage {
            Storage::Memory => db::open_memory_database()?,
            Storage::File(path) => db::open_database(path)?,
        };
        let payloads = self
            .payloads
            .unwrap_or_else(|| Arc::new(MemoryPayloadStore::new()));
        let recognizer = self.recognizer.unwrap_or_else(|| Arc::new(NoVisionBackend));

        let mut extractors = crate::pipeline::extraction::default_extractors();
        extractors.extend(self.extractors);
        let deep_pass = DeepPass::with_extractors(
            extractors,
            recognizer,
            RetryPolicy::from_config(&self.config),
            self.config.deep_pass_timeout(),
        );

        tracing::info!(
            extractors = ?deep_pass.extractor_names(),
            threshold = self.config.confidence_threshold,
            "Quote engine ready"
        );

        Ok(QuoteEngine {
            shared: Arc::new(Shared {
                mapper: StandardizationMapper::from_config(&self.config),
                events: EventBus::new(self.config.event_capacity),
                config: self.config,
                conn: Mutex::new(conn),
                payloads,
                deep_pass,
                review: ReviewQueue::new(),
                workers: Arc::new(LineageWorkers::new()),
            }),
        })
    }
}

/// State shared between the facade and background workers.
pub(crate) struct Shared {
    config: IntakeConfig,
    conn: Mutex<Connection>,
    payloads: Arc<dyn PayloadStore>,
    mapper: StandardizationMapper,
    deep_pass: DeepPass,
    events: EventBus,
    review: ReviewQueue,
    workers: Arc<LineageWorkers>,
}

impl Shared {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, EngineError> {
        self.conn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn dispatch(self: &Arc<Self>, lineage: LineageKey, quote_id: Uuid, work: Work, runtime: &Handle) {
        let shared = Arc::clone(self);
        self.workers
            .dispatch(lineage, Box::pin(shared.process(quote_id, work)), runtime);
    }

    /// Move a quote along one edge of the status graph and publish the change.
    fn advance(&self, quote_id: &Uuid, to: QuoteStatus) -> Result<StandardizedQuote, EngineError> {
        let conn = self.conn()?;
        let quote = load_quote(&conn, quote_id)?;
        self.record_transition(&conn, quote, to)
    }

    /// [`advance`](Self::advance) for caller-driven actions, which only apply
    /// to the newest version of a lineage.
    fn advance_head(&self, quote_id: &Uuid, to: QuoteStatus) -> Result<StandardizedQuote, EngineError> {
        let conn = self.conn()?;
        let quote = load_quote(&conn, quote_id)?;
        ensure_head(&conn, &quote)?;
        self.record_transition(&conn, quote, to)
    }

    fn record_transition(
        &self,
        conn: &Connection,
        mut quote: StandardizedQuote,
        to: QuoteStatus,
    ) -> Result<StandardizedQuote, EngineError> {
        let quote_id = quote.id;
        let from = quote.status;
        quote.status = transition(from, to)?;
        quote.updated_at = Utc::now();
        db::update_quote_status(conn, &quote_id, quote.status, quote.updated_at)?;

        tracing::info!(quote_id = %quote_id, from = %from, to = %to, "Quote status changed");
        self.events.publish(QuoteEvent::QuoteStateChanged {
            quote_id,
            from,
            to,
        });
        Ok(quote)
    }
}

fn load_quote(conn: &Connection, quote_id: &Uuid) -> Result<StandardizedQuote, EngineError> {
    db::get_quote(conn, quote_id)?.ok_or(EngineError::QuoteNotFound(*quote_id))
}

/// Superseded versions are history; only the lineage head may change.
fn ensure_head(conn: &Connection, quote: &StandardizedQuote) -> Result<(), EngineError> {
    let head = db::get_lineage_head(conn, &quote.lineage_key())?;
    if head.map(|h| h.id) != Some(quote.id) {
        return Err(EngineError::NotLineageHead(quote.id));
    }
    Ok(())
}

/// The quote intake engine. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct QuoteEngine {
    shared: Arc<Shared>,
}

impl QuoteEngine {
    pub fn builder(config: IntakeConfig) -> QuoteEngineBuilder {
        QuoteEngineBuilder::new(config)
    }

    /// In-memory engine with default configuration and no vision backend.
    pub fn in_memory() -> Result<Self, EngineError> {
        QuoteEngineBuilder::default().build()
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.shared.config
    }

    /// Validate, store and acknowledge a submission, then queue it for
    /// extraction on the current tokio runtime.
    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmissionAck, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::RuntimeUnavailable)?;
        self.submit_on(&runtime, request)
    }

    /// [`submit`](Self::submit) with an explicit runtime, for callers on non-runtime threads.
    pub fn submit_on(&self, runtime: &Handle, request: SubmissionRequest) -> Result<SubmissionAck, EngineError> {
        let shared = &self.shared;
        let lineage = request.lineage();

        let validated = validate_submission(&shared.config, request.channel, &request.payload, &request.metadata)
            .inspect_err(|e| {
                tracing::warn!(
                    project_id = %request.project_id,
                    channel = %request.channel,
                    error = %e,
                    "Submission rejected"
                );
            })?;
        let raw_payload_ref = shared.payloads.put(&request.payload)?;

        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            project_id: request.project_id,
            submitter_id: request.submitter_id,
            channel: request.channel,
            raw_payload_ref,
            received_at: now,
            size: validated.size,
            mime_hint: request.metadata.mime_hint.clone(),
            detected_mime: validated.detected_mime,
            filename: request.metadata.filename.as_deref().map(sanitize_filename),
            clarification_of: None,
        };

        // Version allocation, insert and dispatch all happen under the
        // connection lock so workers see versions in allocation order.
        let conn = shared.conn()?;
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
        let head = db::get_lineage_head(&tx, &lineage)?;
        if let Some(head) = &head {
            if !accepts_new_version(head.status) {
                return Err(LifecycleError::ImmutableState {
                    current: head.status,
                    attempted: QuoteStatus::Received,
                }
                .into());
            }
        }
        let version = db::next_version(&tx, &lineage)?;
        let quote = StandardizedQuote::pending(
            Uuid::new_v4(),
            submission.id,
            lineage,
            version,
            head.as_ref().map(|h| h.id),
            QuoteStatus::Received,
            now,
        );
        db::insert_submission(&tx, &submission)?;
        db::insert_quote(&tx, &quote)?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            submission_id = %submission.id,
            quote_id = %quote.id,
            project_id = %lineage.project_id,
            submitter_id = %lineage.submitter_id,
            channel = %submission.channel,
            version,
            size = submission.size,
            "Submission received"
        );
        shared.events.publish(QuoteEvent::SubmissionReceived {
            submission_id: submission.id,
            project_id: submission.project_id,
            submitter_id: submission.submitter_id,
            channel: submission.channel,
        });
        shared.events.publish(QuoteEvent::QuoteVersionCreated {
            quote_id: quote.id,
            version,
            previous_version_id: quote.previous_version_id,
        });
        shared.dispatch(lineage, quote.id, Work::Extract, runtime);
        drop(conn);

        Ok(SubmissionAck {
            submission_id: submission.id,
            quote_id: quote.id,
            version,
            status: quote.status,
        })
    }

    /// Ask the submitter to revisit `fields` on a standardized or reviewed quote.
    pub fn request_clarification(&self, quote_id: &Uuid, fields: &[&str]) -> Result<StandardizedQuote, EngineError> {
        if fields.is_empty() {
            return Err(EngineError::InvalidCorrection {
                field: String::new(),
                reason: "at least one field is required".into(),
            });
        }
        for field in fields {
            if field_spec(field).is_none() {
                return Err(EngineError::InvalidCorrection {
                    field: field.to_string(),
                    reason: "unknown field".into(),
                });
            }
        }
        let requested = fields.join(",");
        let reason = ReviewReason::ClarificationRequested(requested);

        let shared = &self.shared;
        let conn = shared.conn()?;
        let mut quote = load_quote(&conn, quote_id)?;
        ensure_head(&conn, &quote)?;
        let from = quote.status;
        quote.status = transition(from, QuoteStatus::NeedsClarification)?;
        let flag = reason.to_string();
        if !quote.flags_for_review.contains(&flag) {
            quote.flags_for_review.push(flag);
        }
        quote.updated_at = Utc::now();
        db::update_quote(&conn, &quote)?;

        tracing::info!(quote_id = %quote_id, fields = %fields.join(","), "Clarification requested");
        shared.events.publish(QuoteEvent::QuoteStateChanged {
            quote_id: *quote_id,
            from,
            to: quote.status,
        });
        shared.events.publish(QuoteEvent::QuoteNeedsClarification {
            quote_id: *quote_id,
            flags: quote.flags_for_review.clone(),
        });
        shared.review.enqueue(*quote_id, reason);
        Ok(quote)
    }

    /// Answer a clarification with corrected field values.
    ///
    /// Creates the next version of the lineage in `updated`, carrying the
    /// previous version's candidates plus one `manual` candidate per
    /// correction, and queues it for re-mapping. The previous version moves
    /// to `updated` as well and its review entries are resolved.
    pub fn submit_clarification(
        &self,
        quote_id: &Uuid,
        corrections: &BTreeMap<String, String>,
    ) -> Result<SubmissionAck, EngineError> {
        let runtime = Handle::try_current().map_err(|_| EngineError::RuntimeUnavailable)?;
        let manual = manual_candidates(corrections)?;
        let shared = &self.shared;

        let payload = serde_json::to_vec(corrections).map_err(DatabaseError::from)?;
        let raw_payload_ref = shared.payloads.put(&payload)?;

        let conn = shared.conn()?;
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
        let previous = load_quote(&tx, quote_id)?;
        let lineage = previous.lineage_key();
        ensure_head(&tx, &previous)?;
        let superseded = transition(previous.status, QuoteStatus::Updated)?;

        let mut base = carried_candidates(&db::get_extraction_records(&tx, &previous.id)?, corrections);
        base.extend(manual);

        let now = Utc::now();
        db::update_quote_status(&tx, &previous.id, superseded, now)?;
        let submission = Submission {
            id: Uuid::new_v4(),
            project_id: lineage.project_id,
            submitter_id: lineage.submitter_id,
            channel: Channel::StructuredForm,
            raw_payload_ref,
            received_at: now,
            size: payload.len() as u64,
            mime_hint: None,
            detected_mime: "application/json".into(),
            filename: None,
            clarification_of: Some(previous.id),
        };
        let version = db::next_version(&tx, &lineage)?;
        let quote = StandardizedQuote::pending(
            Uuid::new_v4(),
            submission.id,
            lineage,
            version,
            Some(previous.id),
            QuoteStatus::Updated,
            now,
        );
        db::insert_submission(&tx, &submission)?;
        db::insert_quote(&tx, &quote)?;
        tx.commit().map_err(DatabaseError::from)?;

        tracing::info!(
            quote_id = %quote.id,
            previous_version_id = %previous.id,
            version,
            corrections = corrections.len(),
            "Clarification received"
        );
        shared.events.publish(QuoteEvent::QuoteStateChanged {
            quote_id: previous.id,
            from: previous.status,
            to: superseded,
        });
        shared.events.publish(QuoteEvent::SubmissionReceived {
            submission_id: submission.id,
            project_id: lineage.project_id,
            submitter_id: lineage.submitter_id,
            channel: submission.channel,
        });
        shared.events.publish(QuoteEvent::QuoteVersionCreated {
            quote_id: quote.id,
            version,
            previous_version_id: quote.previous_version_id,
        });
        shared.review.resolve(&previous.id);
        shared.dispatch(lineage, quote.id, Work::Remap(base), &runtime);
        drop(conn);

        Ok(SubmissionAck {
            submission_id: submission.id,
            quote_id: quote.id,
            version,
            status: quote.status,
        })
    }

    /// Mark a standardized quote as reviewed and clear its review entries.
    pub fn mark_reviewed(&self, quote_id: &Uuid) -> Result<StandardizedQuote, EngineError> {
        let quote = self.shared.advance_head(quote_id, QuoteStatus::Reviewed)?;
        self.shared.review.resolve(quote_id);
        Ok(quote)
    }

    pub fn accept(&self, quote_id: &Uuid) -> Result<StandardizedQuote, EngineError> {
        self.close(quote_id, QuoteStatus::Accepted)
    }

    pub fn reject(&self, quote_id: &Uuid) -> Result<StandardizedQuote, EngineError> {
        self.close(quote_id, QuoteStatus::Rejected)
    }

    /// Withdraw a quote from any non-terminal state. In-flight extraction
    /// for it is discarded when it finishes.
    pub fn withdraw(&self, quote_id: &Uuid) -> Result<StandardizedQuote, EngineError> {
        self.close(quote_id, QuoteStatus::Withdrawn)
    }

    fn close(&self, quote_id: &Uuid, to: QuoteStatus) -> Result<StandardizedQuote, EngineError> {
        let quote = self.shared.advance_head(quote_id, to)?;
        self.shared.review.resolve(quote_id);
        Ok(quote)
    }

    /// Resolve a review-queue item with corrected field values.
    ///
    /// A quote that needs clarification gets a new version carrying the
    /// corrections as `manual` candidates. A standardized or reviewed quote
    /// queued for review first moves back to `needs_clarification` on the
    /// corrected fields, then takes the same path. Either way the mapper
    /// re-runs and the new version settles on its own confidence.
    pub fn resolve_review(
        &self,
        quote_id: &Uuid,
        corrections: &BTreeMap<String, String>,
    ) -> Result<SubmissionAck, EngineError> {
        Handle::try_current().map_err(|_| EngineError::RuntimeUnavailable)?;
        manual_candidates(corrections)?;

        let status = self
            .get_quote(quote_id)?
            .ok_or(EngineError::QuoteNotFound(*quote_id))?
            .status;
        if matches!(status, QuoteStatus::Standardized | QuoteStatus::Reviewed) {
            let fields: Vec<&str> = corrections.keys().map(String::as_str).collect();
            self.request_clarification(quote_id, &fields)?;
        }
        self.submit_clarification(quote_id, corrections)
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.shared.review
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuoteEvent> {
        self.shared.events.subscribe()
    }

    pub fn get_quote(&self, quote_id: &Uuid) -> Result<Option<StandardizedQuote>, EngineError> {
        let conn = self.shared.conn()?;
        Ok(db::get_quote(&conn, quote_id)?)
    }

    /// Every version of a lineage, oldest first.
    pub fn get_lineage(&self, project_id: &Uuid, submitter_id: &Uuid) -> Result<Vec<StandardizedQuote>, EngineError> {
        let lineage = LineageKey {
            project_id: *project_id,
            submitter_id: *submitter_id,
        };
        let conn = self.shared.conn()?;
        Ok(db::get_lineage(&conn, &lineage)?)
    }

    pub fn get_line_items(&self, quote_id: &Uuid) -> Result<Vec<LineItem>, EngineError> {
        let conn = self.shared.conn()?;
        Ok(db::get_line_items(&conn, quote_id)?)
    }

    pub fn get_extraction_records(&self, quote_id: &Uuid) -> Result<Vec<ExtractionRecord>, EngineError> {
        let conn = self.shared.conn()?;
        Ok(db::get_extraction_records(&conn, quote_id)?)
    }

    pub fn get_submission(&self, submission_id: &Uuid) -> Result<Submission, EngineError> {
        let conn = self.shared.conn()?;
        db::get_submission(&conn, submission_id)?.ok_or(EngineError::SubmissionNotFound(*submission_id))
    }

    /// Raw bytes of a stored submission.
    pub fn read_payload(&self, submission_id: &Uuid) -> Result<Vec<u8>, EngineError> {
        let submission = self.get_submission(submission_id)?;
        Ok(self.shared.payloads.get(&submission.raw_payload_ref)?)
    }

    pub fn build_comparison(&self, project_id: &Uuid, options: ComparisonOptions) -> Result<ComparisonMatrix, EngineError> {
        let quotes = {
            let conn = self.shared.conn()?;
            db::list_project_quotes(&conn, project_id)?
        };
        let matrix = comparison::build_comparison(*project_id, &quotes, options);
        tracing::debug!(project_id = %project_id, rows = matrix.rows.len(), "Comparison built");
        Ok(matrix)
    }
}

/// One `manual` candidate at full confidence per corrected field.
fn manual_candidates(corrections: &BTreeMap<String, String>) -> Result<Vec<Candidate>, EngineError> {
    if corrections.is_empty() {
        return Err(EngineError::InvalidCorrection {
            field: String::new(),
            reason: "no corrections supplied".into(),
        });
    }
    corrections
        .iter()
        .map(|(field, value)| {
            if field_spec(field).is_none() {
                return Err(EngineError::InvalidCorrection {
                    field: field.clone(),
                    reason: "unknown field".into(),
                });
            }
            if parse_field_value(field, value).is_none() {
                return Err(EngineError::InvalidCorrection {
                    field: field.clone(),
                    reason: format!("cannot parse {value:?}"),
                });
            }
            Ok(Candidate::new(field, value.trim(), 1.0, ExtractionMethod::Manual))
        })
        .collect()
}

/// Candidates of the previous version, minus earlier manual values for fields being corrected again.
fn carried_candidates(records: &[ExtractionRecord], corrections: &BTreeMap<String, String>) -> Vec<Candidate> {
    records
        .iter()
        .filter(|r| {
            !(r.extraction_method == ExtractionMethod::Manual
                && corrections.contains_key(&r.field_name))
        })
        .map(|r| Candidate::new(&r.field_name, &r.extracted_value, r.confidence, r.extraction_method))
        .collect()
}
