use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

/// Replace the audit trail of a quote in one transaction.
pub fn replace_extraction_records(
    conn: &Connection,
    quote_id: &Uuid,
    records: &[ExtractionRecord],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    write_extraction_records(&tx, quote_id, records)?;
    tx.commit()?;
    Ok(())
}

pub(super) fn write_extraction_records(
    tx: &Connection,
    quote_id: &Uuid,
    records: &[ExtractionRecord],
) -> Result<(), DatabaseError> {
    tx.execute(
        "DELETE FROM extraction_records WHERE quote_id = ?1",
        params![quote_id.to_string()],
    )?;
    for record in records {
        tx.execute(
            "INSERT INTO extraction_records (id, quote_id, field_name, extracted_value, confidence,
             extraction_method, selected)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.quote_id.to_string(),
                record.field_name,
                record.extracted_value,
                record.confidence,
                record.extraction_method.as_str(),
                record.selected as i32,
            ],
        )?;
    }
    Ok(())
}

pub fn get_extraction_records(conn: &Connection, quote_id: &Uuid) -> Result<Vec<ExtractionRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, quote_id, field_name, extracted_value, confidence, extraction_method, selected
         FROM extraction_records WHERE quote_id = ?1
         ORDER BY field_name ASC, selected DESC, confidence DESC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![quote_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, f64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i32>(6)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, quote_id, field_name, extracted_value, confidence, method, selected) = row?;
        records.push(ExtractionRecord {
            id: parse_uuid(&id)?,
            quote_id: parse_uuid(&quote_id)?,
            field_name,
            extracted_value,
            confidence,
            extraction_method: ExtractionMethod::from_str(&method)?,
            selected: selected != 0,
        });
    }
    Ok(records)
}
