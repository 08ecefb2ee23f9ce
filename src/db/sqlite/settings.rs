//! Settings queries (singleton row)

use crate::db::sqlite::models::Settings;
use crate::error::Result;
use rusqlite::{params, Connection};

/// Get settings
pub fn get_settings(conn: &Connection) -> Result<Settings> {
    let settings = conn.query_row(
        "SELECT id, discrepancy_threshold_pct, price_check_enabled, price_check_hour,
                price_check_minute, price_check_timezone, sync_poll_interval_secs, updated_at
         FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(Settings {
                id: row.get(0)?,
                discrepancy_threshold_pct: row.get(1)?,
                price_check_enabled: row.get(2)?,
                price_check_hour: row.get(3)?,
                price_check_minute: row.get(4)?,
                price_check_timezone: row.get(5)?,
                sync_poll_interval_secs: row.get::<_, i64>(6)? as u64,
                updated_at: row.get(7)?,
            })
        },
    )?;
    Ok(settings)
}

/// Update settings; absent fields keep their current value
#[allow(clippy::too_many_arguments)]
pub fn update_settings(
    conn: &Connection,
    discrepancy_threshold_pct: Option<f64>,
    price_check_enabled: Option<bool>,
    price_check_hour: Option<u32>,
    price_check_minute: Option<u32>,
    price_check_timezone: Option<String>,
    sync_poll_interval_secs: Option<u64>,
) -> Result<Settings> {
    conn.execute(
        "UPDATE settings SET
             discrepancy_threshold_pct = COALESCE(?1, discrepancy_threshold_pct),
             price_check_enabled = COALESCE(?2, price_check_enabled),
             price_check_hour = COALESCE(?3, price_check_hour),
             price_check_minute = COALESCE(?4, price_check_minute),
             price_check_timezone = COALESCE(?5, price_check_timezone),
             sync_poll_interval_secs = COALESCE(?6, sync_poll_interval_secs),
             updated_at = datetime('now')
         WHERE id = 1",
        params![
            discrepancy_threshold_pct,
            price_check_enabled,
            price_check_hour,
            price_check_minute,
            price_check_timezone,
            sync_poll_interval_secs.map(|v| v as i64),
        ],
    )?;
    get_settings(conn)
}

/// Store encrypted platform credentials (single row)
pub fn store_platform_credentials(
    conn: &Connection,
    shop_url: &str,
    access_token_encrypted: &str,
    nonce: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO platform_auth (id, shop_url, access_token_encrypted, nonce)
         VALUES (1, ?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             shop_url = excluded.shop_url,
             access_token_encrypted = excluded.access_token_encrypted,
             nonce = excluded.nonce,
             updated_at = datetime('now')",
        params![shop_url, access_token_encrypted, nonce],
    )?;
    Ok(())
}

/// Get encrypted platform credentials: (shop_url, ciphertext, nonce)
pub fn get_platform_credentials(conn: &Connection) -> Result<Option<(String, String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT shop_url, access_token_encrypted, nonce FROM platform_auth WHERE id = 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    })?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Delete stored platform credentials
pub fn delete_platform_credentials(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM platform_auth WHERE id = 1", [])?;
    Ok(())
}
