use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ExtractionError;
use crate::models::{Channel, ExtractionMethod};

/// One value proposed for one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub field_name: String,
    pub value: String,
    pub confidence: f64,
    pub method: ExtractionMethod,
}

impl Candidate {
    pub fn new(
        field_name: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            value: value.into(),
            confidence: clamp_confidence(confidence),
            method,
        }
    }
}

pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Collapse repeats of the same (field, value, method), keeping the highest confidence.
/// Distinct values for one field are all retained.
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match out.iter_mut().find(|c| {
            c.field_name == candidate.field_name && c.value == candidate.value && c.method == candidate.method
        }) {
            Some(existing) => {
                if candidate.confidence > existing.confidence {
                    existing.confidence = candidate.confidence;
                }
            }
            None => out.push(candidate),
        }
    }
    out
}

/// Where recognized text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSource {
    Plain,
    PdfTextLayer,
    MessageBody,
    Vision,
}

/// A field a vision backend read directly off an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedField {
    pub field_name: String,
    pub value: String,
    pub confidence: f64,
}

/// Text recovered from a payload, with the recognizer's own confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f64,
    pub source: TextSource,
    pub fields: Vec<RecognizedField>,
}

impl RecognizedText {
    pub fn new(text: impl Into<String>, confidence: f64, source: TextSource) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            source,
            fields: Vec::new(),
        }
    }

    pub fn empty(source: TextSource) -> Self {
        Self::new(String::new(), 0.0, source)
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty() && self.fields.is_empty()
    }

    /// Factor applied to candidate confidences derived from this text.
    /// Text layers are exact; recognized text is only as good as the recognizer.
    pub fn candidate_scale(&self) -> f64 {
        match self.source {
            TextSource::Vision => self.confidence,
            TextSource::Plain | TextSource::PdfTextLayer | TextSource::MessageBody => 1.0,
        }
    }
}

/// Everything an extractor may look at for one submission.
#[derive(Debug, Clone)]
pub struct ExtractionInput {
    pub submission_id: Uuid,
    pub channel: Channel,
    pub mime: String,
    pub payload: Vec<u8>,
    /// Anchor for relative dates such as "tomorrow".
    pub reference_date: NaiveDate,
    pub text: Option<RecognizedText>,
}

impl ExtractionInput {
    pub fn text_str(&self) -> Option<&str> {
        self.text
            .as_ref()
            .map(|t| t.text.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// A source of field candidates. Implementations are synchronous and may
/// block; the deep pass runs them on the blocking pool under a timeout.
pub trait CandidateExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    fn applies_to(&self, input: &ExtractionInput) -> bool;

    fn extract(&self, input: &ExtractionInput) -> Result<Vec<Candidate>, ExtractionError>;
}

/// Turns an image (or scanned PDF) into text and, optionally, directly read fields.
/// Typically an out-of-process OCR or vision-model service.
pub trait VisionTextRecognizer: Send + Sync {
    fn recognize(&self, payload: &[u8], mime: &str) -> Result<RecognizedText, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_confidence_clamped() {
        assert_eq!(Candidate::new("pricing.total", "1", 1.7, ExtractionMethod::Pattern).confidence, 1.0);
        assert_eq!(Candidate::new("pricing.total", "1", -0.2, ExtractionMethod::Pattern).confidence, 0.0);
        assert_eq!(Candidate::new("pricing.total", "1", f64::NAN, ExtractionMethod::Pattern).confidence, 0.0);
    }

    #[test]
    fn dedupe_keeps_best_duplicate_and_distinct_values() {
        let out = dedupe_candidates(vec![
            Candidate::new("pricing.total", "500.00", 0.6, ExtractionMethod::Pattern),
            Candidate::new("pricing.total", "500.00", 0.9, ExtractionMethod::Pattern),
            Candidate::new("pricing.total", "450.00", 0.8, ExtractionMethod::Pattern),
            Candidate::new("pricing.total", "500.00", 0.7, ExtractionMethod::SemanticParse),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].confidence, 0.9);
    }

    #[test]
    fn vision_text_scales_candidates() {
        let text = RecognizedText::new("Total $5", 0.8, TextSource::Vision);
        assert_eq!(text.candidate_scale(), 0.8);
        let text = RecognizedText::new("Total $5", 0.8, TextSource::Plain);
        assert_eq!(text.candidate_scale(), 1.0);
    }

    #[test]
    fn traits_are_object_safe() {
        fn _assert_extractor(_: &dyn CandidateExtractor) {}
        fn _assert_recognizer(_: &dyn VisionTextRecognizer) {}
    }
}
