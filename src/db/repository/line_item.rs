use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::*;

/// Replace every line item of a quote in one transaction.
pub fn replace_line_items(conn: &Connection, quote_id: &Uuid, items: &[LineItem]) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    write_line_items(&tx, quote_id, items)?;
    tx.commit()?;
    Ok(())
}

/// Delete-then-insert without opening a transaction; the caller owns it.
pub(super) fn write_line_items(tx: &Connection, quote_id: &Uuid, items: &[LineItem]) -> Result<(), DatabaseError> {
    tx.execute(
        "DELETE FROM line_items WHERE quote_id = ?1",
        params![quote_id.to_string()],
    )?;
    for item in items {
        tx.execute(
            "INSERT INTO line_items (id, quote_id, item_type, description, quantity, unit_of_measure,
             unit_price, total_price, is_included, display_order, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.id.to_string(),
                item.quote_id.to_string(),
                item.item_type.as_str(),
                item.description,
                item.quantity,
                item.unit_of_measure,
                item.unit_price,
                item.total_price,
                item.is_included as i32,
                item.display_order,
                item.confidence,
            ],
        )?;
    }
    Ok(())
}

pub fn get_line_items(conn: &Connection, quote_id: &Uuid) -> Result<Vec<LineItem>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, quote_id, item_type, description, quantity, unit_of_measure, unit_price,
         total_price, is_included, display_order, confidence
         FROM line_items WHERE quote_id = ?1 ORDER BY display_order ASC",
    )?;

    let rows = stmt.query_map(params![quote_id.to_string()], |row| {
        Ok(LineItemRow {
            id: row.get(0)?,
            quote_id: row.get(1)?,
            item_type: row.get(2)?,
            description: row.get(3)?,
            quantity: row.get(4)?,
            unit_of_measure: row.get(5)?,
            unit_price: row.get(6)?,
            total_price: row.get(7)?,
            is_included: row.get(8)?,
            display_order: row.get(9)?,
            confidence: row.get(10)?,
        })
    })?;

    let mut items = Vec::new();
    for row in rows {
        let row = row?;
        items.push(LineItem {
            id: parse_uuid(&row.id)?,
            quote_id: parse_uuid(&row.quote_id)?,
            item_type: LineItemType::from_str(&row.item_type)?,
            description: row.description,
            quantity: row.quantity,
            unit_of_measure: row.unit_of_measure,
            unit_price: row.unit_price,
            total_price: row.total_price,
            is_included: row.is_included != 0,
            display_order: row.display_order,
            confidence: row.confidence,
        });
    }
    Ok(items)
}

struct LineItemRow {
    id: String,
    quote_id: String,
    item_type: String,
    description: String,
    quantity: Option<f64>,
    unit_of_measure: Option<String>,
    unit_price: Option<f64>,
    total_price: f64,
    is_included: i32,
    display_order: u32,
    confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::{lineage, seed_quote};
    use crate::db::sqlite::open_memory_database;

    fn item(quote_id: Uuid, order: u32, total: f64) -> LineItem {
        LineItem {
            id: Uuid::new_v4(),
            quote_id,
            item_type: LineItemType::Material,
            description: format!("Item {order}"),
            quantity: Some(2.0),
            unit_of_measure: Some("ea".into()),
            unit_price: Some(total / 2.0),
            total_price: total,
            is_included: true,
            display_order: order,
            confidence: 0.8,
        }
    }

    #[test]
    fn replace_overwrites_previous_items() {
        let conn = open_memory_database().unwrap();
        let quote = seed_quote(&conn, lineage(), 1, None);

        replace_line_items(&conn, &quote.id, &[item(quote.id, 0, 10.0), item(quote.id, 1, 20.0)]).unwrap();
        replace_line_items(&conn, &quote.id, &[item(quote.id, 0, 99.0)]).unwrap();

        let items = get_line_items(&conn, &quote.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_price, 99.0);
        assert_eq!(items[0].unit_of_measure.as_deref(), Some("ea"));
    }

    #[test]
    fn items_come_back_in_display_order() {
        let conn = open_memory_database().unwrap();
        let quote = seed_quote(&conn, lineage(), 1, None);
        replace_line_items(&conn, &quote.id, &[item(quote.id, 2, 3.0), item(quote.id, 0, 1.0), item(quote.id, 1, 2.0)])
            .unwrap();

        let totals: Vec<f64> = get_line_items(&conn, &quote.id).unwrap().iter().map(|i| i.total_price).collect();
        assert_eq!(totals, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn items_require_existing_quote() {
        let conn = open_memory_database().unwrap();
        let orphan = Uuid::new_v4();
        assert!(replace_line_items(&conn, &orphan, &[item(orphan, 0, 1.0)]).is_err());
    }
}
