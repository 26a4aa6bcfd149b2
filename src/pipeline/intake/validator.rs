//! Synchronous admission checks run before a submission is acknowledged.

use std::io::Cursor;

use super::{sniff_format, IntakeError, PayloadKind, QuoteForm};
use crate::config::IntakeConfig;
use crate::models::{Channel, SubmissionMetadata};

/// Mime types a document upload may carry.
pub const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "image/heic",
];

/// Mime types a photo capture may carry.
pub const PHOTO_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/tiff", "image/heic"];

/// What the validator learned about an admitted payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPayload {
    pub detected_mime: String,
    pub kind: PayloadKind,
    pub size: u64,
}

/// Check a raw payload against its channel's rules.
pub fn validate_submission(
    config: &IntakeConfig,
    channel: Channel,
    payload: &[u8],
    metadata: &SubmissionMetadata,
) -> Result<ValidatedPayload, IntakeError> {
    let size = payload.len() as u64;

    let validated = match channel {
        Channel::DocumentUpload => validate_document(config, payload)?,
        Channel::PhotoCapture => validate_photo(config, payload)?,
        Channel::StructuredForm => validate_form(config, payload)?,
        Channel::InboundMessage => validate_message(config, payload, metadata)?,
    };

    if let Some(hint) = metadata.mime_hint.as_deref() {
        if !hint.eq_ignore_ascii_case(&validated.detected_mime) {
            tracing::debug!(
                channel = %channel,
                hint,
                detected = %validated.detected_mime,
                "Mime hint disagrees with payload bytes"
            );
        }
    }

    tracing::debug!(channel = %channel, size, mime = %validated.detected_mime, "Submission validated");
    Ok(validated)
}

fn check_size(size: u64, limit: u64) -> Result<(), IntakeError> {
    if size > limit {
        return Err(IntakeError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

fn validate_document(config: &IntakeConfig, payload: &[u8]) -> Result<ValidatedPayload, IntakeError> {
    if payload.is_empty() {
        return Err(IntakeError::EmptySubmission("document upload has no content".into()));
    }
    check_size(payload.len() as u64, config.max_document_bytes)?;

    let sniffed = sniff_format(payload);
    if !DOCUMENT_MIME_TYPES.contains(&sniffed.mime) {
        return Err(IntakeError::InvalidFormat(format!(
            "document type {} is not accepted",
            sniffed.mime
        )));
    }
    if sniffed.kind == PayloadKind::Text && payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(IntakeError::EmptySubmission("text document is blank".into()));
    }

    Ok(ValidatedPayload {
        detected_mime: sniffed.mime.to_string(),
        kind: sniffed.kind,
        size: payload.len() as u64,
    })
}

fn validate_photo(config: &IntakeConfig, payload: &[u8]) -> Result<ValidatedPayload, IntakeError> {
    if payload.is_empty() {
        return Err(IntakeError::EmptySubmission("photo capture has no content".into()));
    }
    check_size(payload.len() as u64, config.max_photo_bytes)?;

    let sniffed = sniff_format(payload);
    if !PHOTO_MIME_TYPES.contains(&sniffed.mime) {
        return Err(IntakeError::InvalidFormat(format!(
            "photo type {} is not an accepted image format",
            sniffed.mime
        )));
    }

    // HEIC has no decoder here; its dimensions are checked downstream by the vision backend.
    if sniffed.mime != "image/heic" {
        let (width, height) = image_dimensions(payload)?;
        let max = config.max_photo_dimension;
        if width > max || height > max {
            return Err(IntakeError::InvalidFormat(format!(
                "photo is {width}x{height}, larger than {max}px on a side"
            )));
        }
    }

    Ok(ValidatedPayload {
        detected_mime: sniffed.mime.to_string(),
        kind: sniffed.kind,
        size: payload.len() as u64,
    })
}

/// Read width and height from the image header without decoding pixels.
fn image_dimensions(payload: &[u8]) -> Result<(u32, u32), IntakeError> {
    image::io::Reader::new(Cursor::new(payload))
        .with_guessed_format()?
        .into_dimensions()
        .map_err(|e| IntakeError::InvalidFormat(format!("unreadable image: {e}")))
}

fn validate_form(config: &IntakeConfig, payload: &[u8]) -> Result<ValidatedPayload, IntakeError> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(IntakeError::EmptySubmission("structured form has no content".into()));
    }
    check_size(payload.len() as u64, config.max_document_bytes)?;

    let form = QuoteForm::parse(payload)?;
    form.validate(config.max_form_line_items)?;

    Ok(ValidatedPayload {
        detected_mime: "application/json".into(),
        kind: PayloadKind::Json,
        size: payload.len() as u64,
    })
}

fn validate_message(
    config: &IntakeConfig,
    payload: &[u8],
    metadata: &SubmissionMetadata,
) -> Result<ValidatedPayload, IntakeError> {
    let body_blank = payload.iter().all(|b| b.is_ascii_whitespace());
    if body_blank && metadata.attachment_count == 0 {
        return Err(IntakeError::EmptySubmission(
            "inbound message has neither a body nor attachments".into(),
        ));
    }
    check_size(payload.len() as u64, config.max_document_bytes)?;

    if !body_blank && std::str::from_utf8(payload).is_err() {
        return Err(IntakeError::InvalidFormat("message body is not UTF-8 text".into()));
    }

    Ok(ValidatedPayload {
        detected_mime: "text/plain".into(),
        kind: PayloadKind::Text,
        size: payload.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
        let mut bytes = Vec::new();
        img.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
        bytes
    }

    fn meta() -> SubmissionMetadata {
        SubmissionMetadata::default()
    }

    #[test]
    fn text_document_accepted() {
        let config = IntakeConfig::default();
        let v = validate_submission(&config, Channel::DocumentUpload, b"Total: $500", &meta()).unwrap();
        assert_eq!(v.detected_mime, "text/plain");
        assert_eq!(v.size, 11);
    }

    #[test]
    fn empty_bytes_are_empty_submission_on_every_channel() {
        let config = IntakeConfig::default();
        for channel in Channel::all() {
            let err = validate_submission(&config, *channel, b"", &meta()).unwrap_err();
            assert!(
                matches!(err, IntakeError::EmptySubmission(_)),
                "{channel}: unexpected {err:?}"
            );
        }
    }

    #[test]
    fn whitespace_only_text_document_is_empty() {
        let config = IntakeConfig::default();
        let err = validate_submission(&config, Channel::DocumentUpload, b"   \n\t  ", &meta()).unwrap_err();
        assert!(matches!(err, IntakeError::EmptySubmission(_)));
    }

    #[test]
    fn oversized_document_rejected_with_sizes() {
        let config = IntakeConfig {
            max_document_bytes: 8,
            ..Default::default()
        };
        let err = validate_submission(&config, Channel::DocumentUpload, b"Total: $1,250.00", &meta())
            .unwrap_err();
        assert!(matches!(err, IntakeError::PayloadTooLarge { size: 16, limit: 8 }));
    }

    #[test]
    fn unsupported_document_type_rejected() {
        let config = IntakeConfig::default();
        let err = validate_submission(&config, Channel::DocumentUpload, &[0x00, 0x01, 0xFE, 0xFF, 0x00, 0x01, 0x02, 0x03, 0x04], &meta())
            .unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFormat(_)));
    }

    #[test]
    fn photo_must_be_an_image() {
        let config = IntakeConfig::default();
        let err = validate_submission(&config, Channel::PhotoCapture, b"just some text", &meta()).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFormat(_)));
    }

    #[test]
    fn photo_within_dimension_limit_accepted() {
        let config = IntakeConfig {
            max_photo_dimension: 64,
            ..Default::default()
        };
        let v = validate_submission(&config, Channel::PhotoCapture, &png_bytes(32, 16), &meta()).unwrap();
        assert_eq!(v.detected_mime, "image/png");
        assert_eq!(v.kind, PayloadKind::Image);
    }

    #[test]
    fn photo_over_dimension_limit_rejected() {
        let config = IntakeConfig {
            max_photo_dimension: 64,
            ..Default::default()
        };
        let err = validate_submission(&config, Channel::PhotoCapture, &png_bytes(100, 10), &meta()).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFormat(_)));
    }

    #[test]
    fn form_over_line_item_limit_rejected() {
        let config = IntakeConfig {
            max_form_line_items: 1,
            ..Default::default()
        };
        let payload = br#"{"total_amount": 20, "line_items": [
            {"description": "a", "line_total": 10},
            {"description": "b", "line_total": 10}
        ]}"#;
        let err = validate_submission(&config, Channel::StructuredForm, payload, &meta()).unwrap_err();
        assert!(matches!(err, IntakeError::InvalidFormat(_)));
    }

    #[test]
    fn message_with_attachment_only_accepted() {
        let config = IntakeConfig::default();
        let metadata = SubmissionMetadata {
            attachment_count: 1,
            ..Default::default()
        };
        assert!(validate_submission(&config, Channel::InboundMessage, b"", &metadata).is_ok());
    }

    #[test]
    fn blank_message_without_attachments_rejected() {
        let config = IntakeConfig::default();
        let err = validate_submission(&config, Channel::InboundMessage, b"  \n ", &meta()).unwrap_err();
        assert!(matches!(err, IntakeError::EmptySubmission(_)));
    }
}
