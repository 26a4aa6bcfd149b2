use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Channel;

/// Caller-supplied context travelling with a raw payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    pub mime_hint: Option<String>,
    pub filename: Option<String>,
    /// Number of attachments accompanying an inbound message.
    #[serde(default)]
    pub attachment_count: u32,
}

/// An immutable intake record. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub project_id: Uuid,
    pub submitter_id: Uuid,
    pub channel: Channel,
    pub raw_payload_ref: String,
    pub received_at: DateTime<Utc>,
    pub size: u64,
    pub mime_hint: Option<String>,
    pub detected_mime: String,
    pub filename: Option<String>,
    /// Set when this submission carries corrections for an earlier quote version.
    pub clarification_of: Option<Uuid>,
}
