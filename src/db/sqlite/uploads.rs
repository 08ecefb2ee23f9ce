//! Upload job queries
//!
//! Every status write goes through `transition_upload`, the single
//! authorized transition function for the upload lifecycle.

use crate::db::sqlite::models::{UploadJob, UploadStatus};
use crate::error::{AppError, Result};
use rusqlite::{params, Connection, Row};

fn job_from_row(row: &Row) -> rusqlite::Result<UploadJob> {
    let status_raw: String = row.get(5)?;
    Ok(UploadJob {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_hash: row.get(2)?,
        records_count: row.get(3)?,
        processed_count: row.get(4)?,
        status: UploadStatus::parse(&status_raw).unwrap_or(UploadStatus::Error),
        message: row.get(6)?,
        affected_product_ids: Vec::new(),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

const JOB_COLUMNS: &str =
    "id, filename, file_hash, records_count, processed_count, status, message, created_at, updated_at";

/// Create a new upload job in `Pending`
pub fn create_upload(
    conn: &Connection,
    filename: &str,
    file_hash: &str,
    records_count: i64,
) -> Result<UploadJob> {
    conn.execute(
        "INSERT INTO uploads (filename, file_hash, records_count, status)
         VALUES (?1, ?2, ?3, 'pending')",
        params![filename, file_hash, records_count],
    )?;
    let id = conn.last_insert_rowid();
    get_upload(conn, id)?.ok_or_else(|| AppError::Internal("upload row vanished".to_string()))
}

/// Get one upload job with its affected product ids
pub fn get_upload(conn: &Connection, id: i64) -> Result<Option<UploadJob>> {
    let sql = format!("SELECT {} FROM uploads WHERE id = ?1", JOB_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id], job_from_row)?;
    let job = match rows.next() {
        Some(row) => row?,
        None => return Ok(None),
    };
    let mut job = job;
    job.affected_product_ids = affected_product_ids(conn, id)?;
    Ok(Some(job))
}

/// List all upload jobs, newest first
pub fn list_uploads(conn: &Connection) -> Result<Vec<UploadJob>> {
    let sql = format!("SELECT {} FROM uploads ORDER BY created_at DESC, id DESC", JOB_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut jobs = stmt
        .query_map([], job_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for job in &mut jobs {
        job.affected_product_ids = affected_product_ids(conn, job.id)?;
    }
    Ok(jobs)
}

/// Apply a lifecycle transition, rejecting any move the state machine
/// does not allow
pub fn transition_upload(
    conn: &Connection,
    id: i64,
    next: UploadStatus,
    message: Option<&str>,
) -> Result<UploadJob> {
    let current = get_upload(conn, id)?
        .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))?;

    if !current.status.can_transition_to(next) {
        return Err(AppError::Validation(format!(
            "Upload {} cannot transition from {} to {}",
            id,
            current.status.as_str(),
            next.as_str()
        )));
    }

    conn.execute(
        "UPDATE uploads SET status = ?1, message = COALESCE(?2, message),
             updated_at = datetime('now')
         WHERE id = ?3",
        params![next.as_str(), message, id],
    )?;

    get_upload(conn, id)?.ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))
}

/// Increment the processed counter by one. Monotonic by construction.
pub fn increment_processed(conn: &Connection, id: i64) -> Result<i64> {
    conn.execute(
        "UPDATE uploads SET processed_count = processed_count + 1,
             updated_at = datetime('now')
         WHERE id = ?1",
        params![id],
    )?;
    let count: i64 = conn.query_row(
        "SELECT processed_count FROM uploads WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Register a product the job wrote to (idempotent per job/product pair)
pub fn add_affected_product(conn: &Connection, upload_id: i64, product_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO upload_products (upload_id, product_id) VALUES (?1, ?2)",
        params![upload_id, product_id],
    )?;
    Ok(())
}

/// Product ids annotated by this job, in insertion order
pub fn affected_product_ids(conn: &Connection, upload_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT product_id FROM upload_products WHERE upload_id = ?1 ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![upload_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Remove the job row (rollback happens separately, in the same
/// transaction, before this is called)
pub fn delete_upload_row(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM uploads WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(AppError::NotFound(format!("Upload {} not found", id)));
    }
    Ok(())
}
