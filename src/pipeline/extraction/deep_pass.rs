//! Stage B: text recognition followed by every applicable extractor, each
//! under the retry policy and all under one stage deadline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use super::patterns::PatternExtractor;
use super::semantic::RuleBasedSemanticParser;
use super::form::StructuredFormExtractor;
use super::vision::VisionTextExtractor;
use super::{
    call_with_retry, needs_vision, Candidate, CandidateExtractor, ExtractionError, ExtractionInput,
    RecognizedText, RetryPolicy, VisionTextRecognizer,
};

const RECOGNIZER_STAGE: &str = "vision_recognizer";

/// Everything the deep pass produced, including what it could not finish.
#[derive(Debug, Clone, Default)]
pub struct DeepPassOutcome {
    pub candidates: Vec<Candidate>,
    /// Text used by the extractors, when any was recognized.
    pub text: Option<RecognizedText>,
    /// Stages that ran out of time or retries.
    pub timed_out: Vec<String>,
    /// Stages that rejected their input outright.
    pub failed: Vec<String>,
}

pub struct DeepPass {
    extractors: Vec<Arc<dyn CandidateExtractor>>,
    recognizer: Arc<dyn VisionTextRecognizer>,
    policy: RetryPolicy,
    stage_timeout: Duration,
}

impl DeepPass {
    /// Deep pass with the built-in extractors.
    pub fn new(recognizer: Arc<dyn VisionTextRecognizer>, policy: RetryPolicy, stage_timeout: Duration) -> Self {
        Self {
            extractors: default_extractors(),
            recognizer,
            policy,
            stage_timeout,
        }
    }

    /// Deep pass with an explicit extractor set.
    pub fn with_extractors(
        extractors: Vec<Arc<dyn CandidateExtractor>>,
        recognizer: Arc<dyn VisionTextRecognizer>,
        policy: RetryPolicy,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            extractors,
            recognizer,
            policy,
            stage_timeout,
        }
    }

    pub fn extractor_names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    pub async fn run(&self, mut input: ExtractionInput) -> DeepPassOutcome {
        let deadline = Instant::now() + self.stage_timeout;
        let mut outcome = DeepPassOutcome::default();

        if needs_vision(&input.mime, input.text.as_ref()) {
            match self.recognize(&input, deadline).await {
                Ok(text) => {
                    tracing::debug!(
                        submission_id = %input.submission_id,
                        chars = text.text.len(),
                        confidence = text.confidence,
                        "Vision text recognized"
                    );
                    input.text = Some(text);
                }
                Err(e) => record_failure(&mut outcome, RECOGNIZER_STAGE, &e),
            }
        }

        let input = Arc::new(input);
        let mut tasks = JoinSet::new();
        let mut pending: Vec<(usize, &'static str)> = Vec::new();
        for (idx, extractor) in self.extractors.iter().enumerate() {
            if !extractor.applies_to(&input) {
                continue;
            }
            let name = extractor.name();
            let extractor = Arc::clone(extractor);
            let task_input = Arc::clone(&input);
            let policy = self.policy;
            pending.push((idx, name));
            tasks.spawn(async move {
                let result = call_with_retry(name, &policy, move || extractor.extract(&task_input)).await;
                (idx, name, result)
            });
        }

        let mut finished: Vec<(usize, Vec<Candidate>)> = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, name, result)))) => {
                    pending.retain(|(i, _)| *i != idx);
                    match result {
                        Ok(candidates) => {
                            tracing::debug!(extractor = name, count = candidates.len(), "Extractor finished");
                            finished.push((idx, candidates));
                        }
                        Err(e) => record_failure(&mut outcome, name, &e),
                    }
                }
                Ok(Some(Err(join_err))) => {
                    tracing::error!(error = %join_err, "Extractor task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    for (_, name) in pending.drain(..) {
                        tracing::warn!(
                            extractor = name,
                            timeout_ms = self.stage_timeout.as_millis() as u64,
                            "Extractor cut off by deep pass deadline"
                        );
                        outcome.timed_out.push(name.to_string());
                    }
                    break;
                }
            }
        }

        // Registration order, so the candidate list does not depend on scheduling.
        finished.sort_by_key(|(idx, _)| *idx);
        outcome.candidates = finished.into_iter().flat_map(|(_, c)| c).collect();
        outcome.text = input.text.clone();
        outcome.timed_out.sort();
        outcome.failed.sort();

        tracing::info!(
            submission_id = %input.submission_id,
            candidates = outcome.candidates.len(),
            timed_out = outcome.timed_out.len(),
            failed = outcome.failed.len(),
            "Deep pass complete"
        );
        outcome
    }

    async fn recognize(&self, input: &ExtractionInput, deadline: Instant) -> Result<RecognizedText, ExtractionError> {
        let recognizer = Arc::clone(&self.recognizer);
        let payload: Arc<[u8]> = Arc::from(input.payload.as_slice());
        let mime = input.mime.clone();
        let call = move || recognizer.recognize(&payload, &mime);

        tokio::time::timeout_at(deadline, call_with_retry(RECOGNIZER_STAGE, &self.policy, call))
            .await
            .unwrap_or_else(|_| {
                Err(ExtractionError::Timeout {
                    stage: RECOGNIZER_STAGE.into(),
                    after_ms: self.stage_timeout.as_millis() as u64,
                })
            })
    }
}

pub fn default_extractors() -> Vec<Arc<dyn CandidateExtractor>> {
    vec![
        Arc::new(PatternExtractor) as Arc<dyn CandidateExtractor>,
        Arc::new(RuleBasedSemanticParser),
        Arc::new(StructuredFormExtractor),
        Arc::new(VisionTextExtractor),
    ]
}

/// Retryable failures that survived every retry count as timeouts; bad input is a plain failure.
fn record_failure(outcome: &mut DeepPassOutcome, stage: &str, error: &ExtractionError) {
    if error.is_retryable() {
        outcome.timed_out.push(stage.to_string());
    } else {
        tracing::warn!(stage, error = %error, "Extraction stage failed");
        outcome.failed.push(stage.to_string());
    }
}
