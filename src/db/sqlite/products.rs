//! Catalog product queries
//!
//! Runtime SKU lookups go through the in-memory cache in AppState;
//! these queries are the persistent source of truth behind it.

use crate::db::sqlite::models::{Product, ProductUpsert};
use crate::error::Result;
use rusqlite::{params, Connection, Row};

const PRODUCT_COLUMNS: &str = "id, sku, title, reference_price, cost_price, supplier_url, \
     supplier_price, last_scraped, last_checked, has_price_discrepancy, status, vendor, \
     product_type, created_at, updated_at";

fn product_from_row(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        sku: row.get(1)?,
        title: row.get(2)?,
        reference_price: row.get(3)?,
        cost_price: row.get(4)?,
        supplier_url: row.get(5)?,
        supplier_price: row.get(6)?,
        last_scraped: row.get(7)?,
        last_checked: row.get(8)?,
        has_price_discrepancy: row.get(9)?,
        status: row.get(10)?,
        vendor: row.get(11)?,
        product_type: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

/// Insert or update a product by SKU (catalog sync path), returns its id
pub fn upsert_product(conn: &Connection, product: &ProductUpsert) -> Result<i64> {
    conn.execute(
        "INSERT INTO products (sku, title, reference_price, cost_price, status, vendor, product_type)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(sku) DO UPDATE SET
             title = excluded.title,
             reference_price = excluded.reference_price,
             cost_price = excluded.cost_price,
             status = excluded.status,
             vendor = excluded.vendor,
             product_type = excluded.product_type,
             updated_at = datetime('now')",
        params![
            product.sku,
            product.title,
            product.reference_price,
            product.cost_price,
            product.status,
            product.vendor,
            product.product_type,
        ],
    )?;

    let id: i64 = conn.query_row(
        "SELECT id FROM products WHERE sku = ?1",
        params![product.sku],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Get a product by id
pub fn get_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![id], product_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Get a product by exact SKU (case-sensitive)
pub fn get_product_by_sku(conn: &Connection, sku: &str) -> Result<Option<Product>> {
    let sql = format!("SELECT {} FROM products WHERE sku = ?1", PRODUCT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![sku], product_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// List all products ordered by SKU
pub fn list_products(conn: &Connection) -> Result<Vec<Product>> {
    let sql = format!("SELECT {} FROM products ORDER BY sku", PRODUCT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let products = stmt
        .query_map([], product_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(products)
}

/// Search products by SKU or title pattern
pub fn search_products(conn: &Connection, query: &str, limit: usize) -> Result<Vec<Product>> {
    let pattern = format!("%{}%", query);
    let sql = format!(
        "SELECT {} FROM products WHERE sku LIKE ?1 OR title LIKE ?1 ORDER BY sku LIMIT ?2",
        PRODUCT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let products = stmt
        .query_map(params![pattern, limit as i64], product_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(products)
}

/// Products currently flagged with a price discrepancy
pub fn list_flagged_products(conn: &Connection) -> Result<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE has_price_discrepancy = 1 ORDER BY sku",
        PRODUCT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let products = stmt
        .query_map([], product_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(products)
}

/// Products with a supplier URL, eligible for a price re-check
pub fn list_products_with_supplier_url(conn: &Connection) -> Result<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE supplier_url IS NOT NULL ORDER BY sku",
        PRODUCT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let products = stmt
        .query_map([], product_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(products)
}

/// Write the supplier URL onto a catalog entry (matcher path)
pub fn set_supplier_url(conn: &Connection, id: i64, supplier_url: &str) -> Result<()> {
    conn.execute(
        "UPDATE products SET supplier_url = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![supplier_url, id],
    )?;
    Ok(())
}

/// Record a successful price observation on a catalog entry
pub fn record_observation(
    conn: &Connection,
    id: i64,
    supplier_price: f64,
    has_discrepancy: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE products SET supplier_price = ?1, has_price_discrepancy = ?2,
             last_scraped = datetime('now'), last_checked = datetime('now'),
             updated_at = datetime('now')
         WHERE id = ?3",
        params![supplier_price, has_discrepancy, id],
    )?;
    Ok(())
}

/// Mark a product as checked without a new observation (scrape failure)
pub fn touch_checked(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE products SET last_checked = datetime('now'), updated_at = datetime('now')
         WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Accept the supplier price as the new reference price
pub fn update_reference_price(conn: &Connection, id: i64, new_price: f64) -> Result<()> {
    conn.execute(
        "UPDATE products SET reference_price = ?1, has_price_discrepancy = 0,
             updated_at = datetime('now')
         WHERE id = ?2",
        params![new_price, id],
    )?;
    Ok(())
}

/// Operator dismiss: clear the flag without touching prices
pub fn clear_discrepancy(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE products SET has_price_discrepancy = 0, updated_at = datetime('now')
         WHERE id = ?1 AND has_price_discrepancy = 1",
        params![id],
    )?;
    Ok(changed > 0)
}

/// Clear every discrepancy flag, returns how many were cleared
pub fn clear_all_discrepancies(conn: &Connection) -> Result<usize> {
    let cleared = conn.execute(
        "UPDATE products SET has_price_discrepancy = 0, updated_at = datetime('now')
         WHERE has_price_discrepancy = 1",
        [],
    )?;
    Ok(cleared)
}

/// Full reset of supplier annotations (upload rollback)
pub fn clear_supplier_fields(conn: &Connection, ids: &[i64]) -> Result<()> {
    let mut stmt = conn.prepare(
        "UPDATE products SET supplier_url = NULL, supplier_price = NULL,
             has_price_discrepancy = 0, updated_at = datetime('now')
         WHERE id = ?1",
    )?;
    for id in ids {
        stmt.execute(params![id])?;
    }
    Ok(())
}

/// Load the SKU index used to populate the in-memory cache on startup
pub fn load_sku_index(conn: &Connection) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare("SELECT sku, id FROM products")?;
    let index = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(index)
}

/// Total product count
pub fn count_products(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
    Ok(count)
}
