use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::extraction_record::write_extraction_records;
use super::line_item::write_line_items;
use super::{parse_date, parse_optional_uuid, parse_timestamp, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

const QUOTE_COLUMNS: &str = "id, submission_id, project_id, submitter_id, version, previous_version_id,
     pricing_total, labor_cost, materials_cost, other_costs, tax_amount, pricing_confidence,
     start_date, duration_days, completion_date, timeline_confidence,
     scope_json, terms_json, contact_json, overall_confidence, status, flags_json,
     provisional_total, primary_category, created_at, updated_at";

pub fn insert_quote(conn: &Connection, quote: &StandardizedQuote) -> Result<(), DatabaseError> {
    conn.execute(
        &format!(
            "INSERT INTO standardized_quotes ({QUOTE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)"
        ),
        params![
            quote.id.to_string(),
            quote.submission_id.to_string(),
            quote.project_id.to_string(),
            quote.submitter_id.to_string(),
            quote.version,
            quote.previous_version_id.map(|id| id.to_string()),
            quote.pricing.total,
            quote.pricing.breakdown.labor,
            quote.pricing.breakdown.materials,
            quote.pricing.breakdown.other,
            quote.pricing.breakdown.tax,
            quote.pricing.confidence,
            quote.timeline.start_date.map(|d| d.to_string()),
            quote.timeline.duration_days,
            quote.timeline.completion_date.map(|d| d.to_string()),
            quote.timeline.confidence,
            serde_json::to_string(&quote.scope)?,
            serde_json::to_string(&quote.terms)?,
            serde_json::to_string(&quote.contact)?,
            quote.overall_confidence,
            quote.status.as_str(),
            serde_json::to_string(&quote.flags_for_review)?,
            quote.provisional_total,
            quote.primary_category,
            quote.created_at.to_rfc3339(),
            quote.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Overwrite every mutable column of an existing quote.
/// Lineage columns (submission, project, submitter, version) never change.
pub fn update_quote(conn: &Connection, quote: &StandardizedQuote) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE standardized_quotes SET
            pricing_total = ?2, labor_cost = ?3, materials_cost = ?4, other_costs = ?5,
            tax_amount = ?6, pricing_confidence = ?7, start_date = ?8, duration_days = ?9,
            completion_date = ?10, timeline_confidence = ?11, scope_json = ?12, terms_json = ?13,
            contact_json = ?14, overall_confidence = ?15, status = ?16, flags_json = ?17,
            provisional_total = ?18, primary_category = ?19, updated_at = ?20
         WHERE id = ?1",
        params![
            quote.id.to_string(),
            quote.pricing.total,
            quote.pricing.breakdown.labor,
            quote.pricing.breakdown.materials,
            quote.pricing.breakdown.other,
            quote.pricing.breakdown.tax,
            quote.pricing.confidence,
            quote.timeline.start_date.map(|d| d.to_string()),
            quote.timeline.duration_days,
            quote.timeline.completion_date.map(|d| d.to_string()),
            quote.timeline.confidence,
            serde_json::to_string(&quote.scope)?,
            serde_json::to_string(&quote.terms)?,
            serde_json::to_string(&quote.contact)?,
            quote.overall_confidence,
            quote.status.as_str(),
            serde_json::to_string(&quote.flags_for_review)?,
            quote.provisional_total,
            quote.primary_category,
            quote.updated_at.to_rfc3339(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "StandardizedQuote".into(),
            id: quote.id.to_string(),
        });
    }
    Ok(())
}

pub fn update_quote_status(
    conn: &Connection,
    id: &Uuid,
    status: QuoteStatus,
    updated_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE standardized_quotes SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), updated_at.to_rfc3339()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "StandardizedQuote".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Record the fast-pass sketch without touching status or extracted fields.
/// Record the Stage A sketch. Only a quote still in `processing` is touched;
/// returns whether the row was written.
pub fn update_provisional(
    conn: &Connection,
    id: &Uuid,
    provisional_total: Option<f64>,
    primary_category: Option<&str>,
) -> Result<bool, DatabaseError> {
    let written = conn.execute(
        "UPDATE standardized_quotes SET provisional_total = ?2, primary_category = ?3
         WHERE id = ?1 AND status = ?4",
        params![
            id.to_string(),
            provisional_total,
            primary_category,
            QuoteStatus::Processing.as_str()
        ],
    )?;
    Ok(written == 1)
}

/// Persist a mapped quote with its line items and audit trail atomically.
pub fn save_mapped_quote(
    conn: &Connection,
    quote: &StandardizedQuote,
    line_items: &[LineItem],
    records: &[ExtractionRecord],
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    update_quote(&tx, quote)?;
    write_line_items(&tx, &quote.id, line_items)?;
    write_extraction_records(&tx, &quote.id, records)?;
    tx.commit()?;
    Ok(())
}

pub fn get_quote(conn: &Connection, id: &Uuid) -> Result<Option<StandardizedQuote>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM standardized_quotes WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], read_quote_row);

    match result {
        Ok(row) => Ok(Some(quote_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All versions for one submitter in one project, oldest first.
pub fn get_lineage(conn: &Connection, lineage: &LineageKey) -> Result<Vec<StandardizedQuote>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM standardized_quotes
         WHERE project_id = ?1 AND submitter_id = ?2
         ORDER BY version ASC"
    ))?;

    let rows = stmt.query_map(
        params![lineage.project_id.to_string(), lineage.submitter_id.to_string()],
        read_quote_row,
    )?;

    let mut quotes = Vec::new();
    for row in rows {
        quotes.push(quote_from_row(row?)?);
    }
    Ok(quotes)
}

/// Latest version of a lineage, if any.
pub fn get_lineage_head(
    conn: &Connection,
    lineage: &LineageKey,
) -> Result<Option<StandardizedQuote>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM standardized_quotes
         WHERE project_id = ?1 AND submitter_id = ?2
         ORDER BY version DESC LIMIT 1"
    ))?;

    let result = stmt.query_row(
        params![lineage.project_id.to_string(), lineage.submitter_id.to_string()],
        read_quote_row,
    );

    match result {
        Ok(row) => Ok(Some(quote_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Next free version number for a lineage (1 for a new lineage).
pub fn next_version(conn: &Connection, lineage: &LineageKey) -> Result<u32, DatabaseError> {
    let max: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM standardized_quotes WHERE project_id = ?1 AND submitter_id = ?2",
        params![lineage.project_id.to_string(), lineage.submitter_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

/// Every version of every lineage in a project.
pub fn list_project_quotes(conn: &Connection, project_id: &Uuid) -> Result<Vec<StandardizedQuote>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM standardized_quotes
         WHERE project_id = ?1
         ORDER BY submitter_id ASC, version ASC"
    ))?;

    let rows = stmt.query_map(params![project_id.to_string()], read_quote_row)?;

    let mut quotes = Vec::new();
    for row in rows {
        quotes.push(quote_from_row(row?)?);
    }
    Ok(quotes)
}

struct QuoteRow {
    id: String,
    submission_id: String,
    project_id: String,
    submitter_id: String,
    version: u32,
    previous_version_id: Option<String>,
    pricing_total: Option<f64>,
    labor_cost: Option<f64>,
    materials_cost: Option<f64>,
    other_costs: Option<f64>,
    tax_amount: Option<f64>,
    pricing_confidence: f64,
    start_date: Option<String>,
    duration_days: Option<u32>,
    completion_date: Option<String>,
    timeline_confidence: f64,
    scope_json: String,
    terms_json: String,
    contact_json: String,
    overall_confidence: f64,
    status: String,
    flags_json: String,
    provisional_total: Option<f64>,
    primary_category: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_quote_row(row: &Row<'_>) -> rusqlite::Result<QuoteRow> {
    Ok(QuoteRow {
        id: row.get(0)?,
        submission_id: row.get(1)?,
        project_id: row.get(2)?,
        submitter_id: row.get(3)?,
        version: row.get(4)?,
        previous_version_id: row.get(5)?,
        pricing_total: row.get(6)?,
        labor_cost: row.get(7)?,
        materials_cost: row.get(8)?,
        other_costs: row.get(9)?,
        tax_amount: row.get(10)?,
        pricing_confidence: row.get(11)?,
        start_date: row.get(12)?,
        duration_days: row.get(13)?,
        completion_date: row.get(14)?,
        timeline_confidence: row.get(15)?,
        scope_json: row.get(16)?,
        terms_json: row.get(17)?,
        contact_json: row.get(18)?,
        overall_confidence: row.get(19)?,
        status: row.get(20)?,
        flags_json: row.get(21)?,
        provisional_total: row.get(22)?,
        primary_category: row.get(23)?,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
    })
}

fn quote_from_row(row: QuoteRow) -> Result<StandardizedQuote, DatabaseError> {
    Ok(StandardizedQuote {
        id: parse_uuid(&row.id)?,
        submission_id: parse_uuid(&row.submission_id)?,
        project_id: parse_uuid(&row.project_id)?,
        submitter_id: parse_uuid(&row.submitter_id)?,
        version: row.version,
        previous_version_id: parse_optional_uuid(row.previous_version_id)?,
        pricing: Pricing {
            total: row.pricing_total,
            breakdown: PriceBreakdown {
                labor: row.labor_cost,
                materials: row.materials_cost,
                other: row.other_costs,
                tax: row.tax_amount,
            },
            confidence: row.pricing_confidence,
        },
        timeline: Timeline {
            start_date: parse_date(row.start_date),
            duration_days: row.duration_days,
            completion_date: parse_date(row.completion_date),
            confidence: row.timeline_confidence,
        },
        scope: serde_json::from_str(&row.scope_json)?,
        terms: serde_json::from_str(&row.terms_json)?,
        contact: serde_json::from_str(&row.contact_json)?,
        overall_confidence: row.overall_confidence,
        status: QuoteStatus::from_str(&row.status)?,
        flags_for_review: serde_json::from_str(&row.flags_json)?,
        provisional_total: row.provisional_total,
        primary_category: row.primary_category,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::repository::fixtures::{lineage, make_submission, seed_quote};
    use crate::db::repository::insert_submission;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn insert_and_get_quote() {
        let conn = open_memory_database().unwrap();
        let key = lineage();
        let quote = seed_quote(&conn, key, 1, None);

        let loaded = get_quote(&conn, &quote.id).unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.status, QuoteStatus::Received);
        assert_eq!(loaded.lineage_key(), key);
        assert!(loaded.flags_for_review.is_empty());
    }

    #[test]
    fn update_round_trips_components() {
        let conn = open_memory_database().unwrap();
        let mut quote = seed_quote(&conn, lineage(), 1, None);
        quote.pricing.total = Some(1250.0);
        quote.pricing.breakdown.labor = Some(800.0);
        quote.pricing.confidence = 0.95;
        quote.timeline.duration_days = Some(3);
        quote.timeline.start_date = NaiveDate::from_ymd_opt(2024, 6, 3);
        quote.scope.included = vec!["Replace water heater".into()];
        quote.terms.warranty = Some("1 year".into());
        quote.status = QuoteStatus::Standardized;
        quote.flags_for_review = vec!["reconciliation_mismatch".into()];
        update_quote(&conn, &quote).unwrap();

        let loaded = get_quote(&conn, &quote.id).unwrap().unwrap();
        assert_eq!(loaded.pricing, quote.pricing);
        assert_eq!(loaded.timeline, quote.timeline);
        assert_eq!(loaded.scope, quote.scope);
        assert_eq!(loaded.terms, quote.terms);
        assert_eq!(loaded.status, QuoteStatus::Standardized);
        assert_eq!(loaded.flags_for_review, vec!["reconciliation_mismatch".to_string()]);
    }

    #[test]
    fn lineage_is_ordered_and_head_is_latest() {
        let conn = open_memory_database().unwrap();
        let key = lineage();
        let v1 = seed_quote(&conn, key, 1, None);
        let v2 = seed_quote(&conn, key, 2, Some(v1.id));
        seed_quote(&conn, lineage(), 1, None);

        let versions: Vec<u32> = get_lineage(&conn, &key).unwrap().iter().map(|q| q.version).collect();
        assert_eq!(versions, vec![1, 2]);

        let head = get_lineage_head(&conn, &key).unwrap().unwrap();
        assert_eq!(head.id, v2.id);
        assert_eq!(head.previous_version_id, Some(v1.id));
        assert_eq!(next_version(&conn, &key).unwrap(), 3);
    }

    #[test]
    fn next_version_starts_at_one() {
        let conn = open_memory_database().unwrap();
        assert_eq!(next_version(&conn, &lineage()).unwrap(), 1);
    }

    #[test]
    fn duplicate_version_is_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let key = lineage();
        seed_quote(&conn, key, 1, None);

        let submission = make_submission(key);
        insert_submission(&conn, &submission).unwrap();
        let clash = StandardizedQuote::pending(
            Uuid::new_v4(),
            submission.id,
            key,
            1,
            None,
            QuoteStatus::Received,
            Utc::now(),
        );
        let err = insert_quote(&conn, &clash).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn status_update_on_missing_quote_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = update_quote_status(&conn, &Uuid::new_v4(), QuoteStatus::Processing, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn project_listing_spans_lineages() {
        let conn = open_memory_database().unwrap();
        let a = lineage();
        let b = LineageKey {
            project_id: a.project_id,
            submitter_id: Uuid::new_v4(),
        };
        seed_quote(&conn, a, 1, None);
        seed_quote(&conn, b, 1, None);
        seed_quote(&conn, lineage(), 1, None);

        assert_eq!(list_project_quotes(&conn, &a.project_id).unwrap().len(), 2);
    }

    #[test]
    fn mapped_quote_saved_with_children() {
        let conn = open_memory_database().unwrap();
        let mut quote = seed_quote(&conn, lineage(), 1, None);
        quote.pricing.total = Some(300.0);
        quote.status = QuoteStatus::Standardized;
        let item = LineItem {
            id: Uuid::new_v4(),
            quote_id: quote.id,
            item_type: LineItemType::Other,
            description: "Service".into(),
            quantity: None,
            unit_of_measure: None,
            unit_price: None,
            total_price: 300.0,
            is_included: true,
            display_order: 0,
            confidence: 0.9,
        };
        let record = ExtractionRecord {
            id: Uuid::new_v4(),
            quote_id: quote.id,
            field_name: "pricing.total".into(),
            extracted_value: "300.00".into(),
            confidence: 0.9,
            extraction_method: ExtractionMethod::Pattern,
            selected: true,
        };
        save_mapped_quote(&conn, &quote, &[item], &[record]).unwrap();

        assert_eq!(get_quote(&conn, &quote.id).unwrap().unwrap().pricing.total, Some(300.0));
        assert_eq!(crate::db::repository::get_line_items(&conn, &quote.id).unwrap().len(), 1);
        assert_eq!(crate::db::repository::get_extraction_records(&conn, &quote.id).unwrap().len(), 1);
    }

    #[test]
    fn provisional_sketch_only_lands_while_processing() {
        let conn = open_memory_database().unwrap();
        let quote = seed_quote(&conn, lineage(), 1, None);

        update_quote_status(&conn, &quote.id, QuoteStatus::Processing, Utc::now()).unwrap();
        assert!(update_provisional(&conn, &quote.id, Some(480.0), Some("plumbing")).unwrap());

        update_quote_status(&conn, &quote.id, QuoteStatus::Withdrawn, Utc::now()).unwrap();
        assert!(!update_provisional(&conn, &quote.id, Some(9999.0), Some("roofing")).unwrap());

        let loaded = get_quote(&conn, &quote.id).unwrap().unwrap();
        assert_eq!(loaded.status, QuoteStatus::Withdrawn);
        assert_eq!(loaded.provisional_total, Some(480.0));
        assert_eq!(loaded.primary_category.as_deref(), Some("plumbing"));
    }

    #[test]
    fn failed_save_rolls_back() {
        let conn = open_memory_database().unwrap();
        let quote = seed_quote(&conn, lineage(), 1, None);
        let mut ghost = quote.clone();
        ghost.id = Uuid::new_v4();
        let err = save_mapped_quote(&conn, &ghost, &[], &[]).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
        assert_eq!(get_quote(&conn, &quote.id).unwrap().unwrap().status, QuoteStatus::Received);
    }
}
