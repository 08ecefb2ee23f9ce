//! Price history queries
//!
//! Append-only audit trail of observed prices. Rows are never mutated;
//! the only deletion path is upload rollback, which removes the rows a
//! cancelled or deleted upload job wrote.

use crate::db::sqlite::models::PriceHistoryEntry;
use crate::error::Result;
use rusqlite::{params, Connection, Row};

fn entry_from_row(row: &Row) -> rusqlite::Result<PriceHistoryEntry> {
    Ok(PriceHistoryEntry {
        id: row.get(0)?,
        product_id: row.get(1)?,
        upload_id: row.get(2)?,
        reference_price: row.get(3)?,
        supplier_price: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Append one price snapshot
pub fn append_entry(
    conn: &Connection,
    product_id: i64,
    upload_id: Option<i64>,
    reference_price: f64,
    supplier_price: Option<f64>,
    notes: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO price_history (product_id, upload_id, reference_price, supplier_price, notes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![product_id, upload_id, reference_price, supplier_price, notes],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Price snapshots for one product, newest first
pub fn list_for_product(
    conn: &Connection,
    product_id: i64,
    limit: usize,
) -> Result<Vec<PriceHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, product_id, upload_id, reference_price, supplier_price, notes, created_at
         FROM price_history
         WHERE product_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![product_id, limit as i64], entry_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Remove the snapshots written by one upload job (rollback path)
pub fn delete_for_upload(conn: &Connection, upload_id: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM price_history WHERE upload_id = ?1",
        params![upload_id],
    )?;
    Ok(deleted)
}
