//! Text-layer reading for payloads that carry text directly, plus the
//! default vision backend.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{ExtractionError, RecognizedText, TextSource, VisionTextRecognizer};
use crate::models::Channel;

/// Reported confidence for a PDF text layer.
const PDF_TEXT_CONFIDENCE: f64 = 0.95;

/// Read text that is present in the payload without any recognition step.
///
/// Returns `None` for images and structured forms. A PDF whose text layer is
/// empty yields blank text so the caller can fall back to vision.
pub fn read_text_layer(
    channel: Channel,
    mime: &str,
    payload: &[u8],
) -> Result<Option<RecognizedText>, ExtractionError> {
    match channel {
        Channel::StructuredForm => return Ok(None),
        Channel::InboundMessage => {
            return Ok(Some(RecognizedText::new(
                decode_text(payload)?,
                1.0,
                TextSource::MessageBody,
            )))
        }
        Channel::DocumentUpload | Channel::PhotoCapture => {}
    }

    match mime {
        "text/plain" => Ok(Some(RecognizedText::new(decode_text(payload)?, 1.0, TextSource::Plain))),
        "application/pdf" => pdf_text(payload).map(Some),
        _ => Ok(None),
    }
}

/// True when the payload can only be read by a vision backend.
pub fn needs_vision(mime: &str, text_layer: Option<&RecognizedText>) -> bool {
    match mime {
        "image/jpeg" | "image/png" | "image/tiff" | "image/heic" => true,
        "application/pdf" => text_layer.map_or(true, RecognizedText::is_blank),
        _ => false,
    }
}

fn decode_text(payload: &[u8]) -> Result<String, ExtractionError> {
    // Strip a UTF-8 BOM if present
    let bytes = payload.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(payload);
    String::from_utf8(bytes.to_vec()).map_err(|e| ExtractionError::EncodingError(e.to_string()))
}

fn pdf_text(payload: &[u8]) -> Result<RecognizedText, ExtractionError> {
    // Malformed PDFs can panic inside the parser; treat that as a parse failure.
    let extracted = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(payload)))
        .map_err(|_| ExtractionError::PdfParsing("parser panicked on malformed PDF".into()))?
        .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

    let confidence = if extracted.trim().is_empty() { 0.0 } else { PDF_TEXT_CONFIDENCE };
    Ok(RecognizedText::new(extracted, confidence, TextSource::PdfTextLayer))
}

/// Vision backend used when none is configured: recognizes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVisionBackend;

impl VisionTextRecognizer for NoVisionBackend {
    fn recognize(&self, _payload: &[u8], mime: &str) -> Result<RecognizedText, ExtractionError> {
        tracing::debug!(mime, "No vision backend configured, returning empty text");
        Ok(RecognizedText::empty(TextSource::Vision))
    }
}
