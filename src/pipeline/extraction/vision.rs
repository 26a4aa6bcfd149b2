//! Fields a vision backend read directly off an image.

use super::{Candidate, CandidateExtractor, ExtractionError, ExtractionInput, TextSource};
use crate::models::fields::{field_spec, parse_field_value};
use crate::models::ExtractionMethod;

/// Emits the recognizer's directly-read fields as vision-text candidates.
/// Text the recognizer returned is handled by the text extractors.
#[derive(Debug, Default, Clone, Copy)]
pub struct VisionTextExtractor;

impl CandidateExtractor for VisionTextExtractor {
    fn name(&self) -> &'static str {
        "vision_text"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::VisionText
    }

    fn applies_to(&self, input: &ExtractionInput) -> bool {
        input
            .text
            .as_ref()
            .is_some_and(|t| t.source == TextSource::Vision && !t.fields.is_empty())
    }

    fn extract(&self, input: &ExtractionInput) -> Result<Vec<Candidate>, ExtractionError> {
        let Some(text) = input.text.as_ref() else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for field in &text.fields {
            if field_spec(&field.field_name).is_none() {
                tracing::debug!(field = %field.field_name, "Ignoring unknown recognized field");
                continue;
            }
            if parse_field_value(&field.field_name, &field.value).is_none() {
                tracing::debug!(field = %field.field_name, "Ignoring unparsable recognized field");
                continue;
            }
            out.push(Candidate::new(
                field.field_name.clone(),
                field.value.trim(),
                field.confidence,
                ExtractionMethod::VisionText,
            ));
        }
        Ok(out)
    }
}
