pub mod form;
pub mod format;
pub mod payload_store;
pub mod validator;

pub use form::*;
pub use format::*;
pub use payload_store::*;
pub use validator::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Empty submission: {0}")]
    EmptySubmission(String),

    #[error("Payload not found: {0}")]
    PayloadNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
