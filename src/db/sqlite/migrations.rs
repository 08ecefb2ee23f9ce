//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Run each migration
    run_migration(conn, "001_products", CREATE_PRODUCTS_TABLE)?;
    run_migration(conn, "002_price_history", CREATE_PRICE_HISTORY_TABLE)?;
    run_migration(conn, "003_uploads", CREATE_UPLOADS_TABLE)?;
    run_migration(conn, "004_upload_products", CREATE_UPLOAD_PRODUCTS_TABLE)?;
    run_migration(conn, "005_settings", CREATE_SETTINGS_TABLE)?;
    run_migration(conn, "006_platform_auth", CREATE_PLATFORM_AUTH_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_PRODUCTS_TABLE: &str = r#"
CREATE TABLE products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sku TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    reference_price REAL NOT NULL DEFAULT 0,
    cost_price REAL,
    supplier_url TEXT,
    supplier_price REAL,
    last_scraped TEXT,
    last_checked TEXT,
    has_price_discrepancy INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    vendor TEXT,
    product_type TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_products_sku ON products(sku);
CREATE INDEX IF NOT EXISTS idx_products_discrepancy ON products(has_price_discrepancy);
"#;

const CREATE_PRICE_HISTORY_TABLE: &str = r#"
CREATE TABLE price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    upload_id INTEGER,
    reference_price REAL NOT NULL,
    supplier_price REAL,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_price_history_product ON price_history(product_id);
CREATE INDEX IF NOT EXISTS idx_price_history_upload ON price_history(upload_id);
"#;

const CREATE_UPLOADS_TABLE: &str = r#"
CREATE TABLE uploads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    records_count INTEGER NOT NULL DEFAULT 0,
    processed_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    message TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status);
"#;

const CREATE_UPLOAD_PRODUCTS_TABLE: &str = r#"
CREATE TABLE upload_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    upload_id INTEGER NOT NULL REFERENCES uploads(id) ON DELETE CASCADE,
    product_id INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(upload_id, product_id)
);
"#;

const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    discrepancy_threshold_pct REAL NOT NULL DEFAULT 0,
    price_check_enabled INTEGER NOT NULL DEFAULT 1,
    price_check_hour INTEGER NOT NULL DEFAULT 2,
    price_check_minute INTEGER NOT NULL DEFAULT 0,
    price_check_timezone TEXT NOT NULL DEFAULT 'UTC',
    sync_poll_interval_secs INTEGER NOT NULL DEFAULT 2,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
INSERT OR IGNORE INTO settings (id) VALUES (1);
"#;

const CREATE_PLATFORM_AUTH_TABLE: &str = r#"
CREATE TABLE platform_auth (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    shop_url TEXT NOT NULL,
    access_token_encrypted TEXT NOT NULL,
    nonce TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
