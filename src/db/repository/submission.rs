use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_submission(conn: &Connection, submission: &Submission) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO submissions (id, project_id, submitter_id, channel, raw_payload_ref,
         received_at, size, mime_hint, detected_mime, filename, clarification_of)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            submission.id.to_string(),
            submission.project_id.to_string(),
            submission.submitter_id.to_string(),
            submission.channel.as_str(),
            submission.raw_payload_ref,
            submission.received_at.to_rfc3339(),
            submission.size as i64,
            submission.mime_hint,
            submission.detected_mime,
            submission.filename,
            submission.clarification_of.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

pub fn get_submission(conn: &Connection, id: &Uuid) -> Result<Option<Submission>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, submitter_id, channel, raw_payload_ref, received_at, size,
         mime_hint, detected_mime, filename, clarification_of
         FROM submissions WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok(SubmissionRow {
            id: row.get(0)?,
            project_id: row.get(1)?,
            submitter_id: row.get(2)?,
            channel: row.get(3)?,
            raw_payload_ref: row.get(4)?,
            received_at: row.get(5)?,
            size: row.get(6)?,
            mime_hint: row.get(7)?,
            detected_mime: row.get(8)?,
            filename: row.get(9)?,
            clarification_of: row.get(10)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(submission_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

struct SubmissionRow {
    id: String,
    project_id: String,
    submitter_id: String,
    channel: String,
    raw_payload_ref: String,
    received_at: String,
    size: i64,
    mime_hint: Option<String>,
    detected_mime: String,
    filename: Option<String>,
    clarification_of: Option<String>,
}

fn submission_from_row(row: SubmissionRow) -> Result<Submission, DatabaseError> {
    Ok(Submission {
        id: parse_uuid(&row.id)?,
        project_id: parse_uuid(&row.project_id)?,
        submitter_id: parse_uuid(&row.submitter_id)?,
        channel: Channel::from_str(&row.channel)?,
        raw_payload_ref: row.raw_payload_ref,
        received_at: parse_timestamp(&row.received_at)?,
        size: row.size.max(0) as u64,
        mime_hint: row.mime_hint,
        detected_mime: row.detected_mime,
        filename: row.filename,
        clarification_of: parse_optional_uuid(row.clarification_of)?,
    })
}
