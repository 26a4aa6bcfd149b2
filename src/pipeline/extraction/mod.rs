pub mod types;
pub mod text;
pub mod retry;
pub mod dates;
pub mod patterns;
pub mod semantic;
pub mod form;
pub mod vision;
pub mod category;
pub mod fast_pass;
pub mod deep_pass;

pub use types::*;
pub use text::*;
pub use retry::*;
pub use patterns::PatternExtractor;
pub use semantic::RuleBasedSemanticParser;
pub use form::StructuredFormExtractor;
pub use vision::VisionTextExtractor;
pub use fast_pass::*;
pub use deep_pass::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("{stage} timed out after {after_ms} ms")]
    Timeout { stage: String, after_ms: u64 },

    #[error("Extraction backend failed: {0}")]
    Backend(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Text encoding error: {0}")]
    EncodingError(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported format for extraction")]
    UnsupportedFormat,
}

impl ExtractionError {
    /// Timeouts and backend failures are worth another attempt; bad input is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Backend(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
