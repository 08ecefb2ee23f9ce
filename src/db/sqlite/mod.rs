//! SQLite database module

pub mod models;
mod connection;
mod migrations;
mod price_history;
mod products;
mod settings;
mod uploads;

use crate::error::Result;
use models::{PriceHistoryEntry, Product, ProductUpsert, Settings, UploadJob, UploadStatus};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Create new SQLite database connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = connection::create_connection(path)?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database for tests
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Product Methods ==========

    /// Insert or update a product by SKU, returns its id
    pub fn upsert_product(&self, product: &ProductUpsert) -> Result<i64> {
        let conn = self.conn.lock();
        products::upsert_product(&conn, product)
    }

    /// Get a product by id
    pub fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        products::get_product(&conn, id)
    }

    /// Get a product by exact SKU
    pub fn get_product_by_sku(&self, sku: &str) -> Result<Option<Product>> {
        let conn = self.conn.lock();
        products::get_product_by_sku(&conn, sku)
    }

    /// List all products
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        products::list_products(&conn)
    }

    /// Search products by SKU or title
    pub fn search_products(&self, query: &str, limit: usize) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        products::search_products(&conn, query, limit)
    }

    /// Products currently flagged with a discrepancy
    pub fn list_flagged_products(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        products::list_flagged_products(&conn)
    }

    /// Products eligible for a price re-check
    pub fn list_products_with_supplier_url(&self) -> Result<Vec<Product>> {
        let conn = self.conn.lock();
        products::list_products_with_supplier_url(&conn)
    }

    /// Write the supplier URL onto a catalog entry
    pub fn set_supplier_url(&self, id: i64, supplier_url: &str) -> Result<()> {
        let conn = self.conn.lock();
        products::set_supplier_url(&conn, id, supplier_url)
    }

    /// Record a successful price observation
    pub fn record_observation(
        &self,
        id: i64,
        supplier_price: f64,
        has_discrepancy: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();
        products::record_observation(&conn, id, supplier_price, has_discrepancy)
    }

    /// Mark a product as checked without a new observation
    pub fn touch_checked(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock();
        products::touch_checked(&conn, id)
    }

    /// Accept a new reference price and clear the discrepancy flag
    pub fn update_reference_price(&self, id: i64, new_price: f64) -> Result<()> {
        let conn = self.conn.lock();
        products::update_reference_price(&conn, id, new_price)
    }

    /// Dismiss a discrepancy without touching prices
    pub fn clear_discrepancy(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        products::clear_discrepancy(&conn, id)
    }

    /// Clear every discrepancy flag, returns the cleared count
    pub fn clear_all_discrepancies(&self) -> Result<usize> {
        let conn = self.conn.lock();
        products::clear_all_discrepancies(&conn)
    }

    /// SKU index for the in-memory cache
    pub fn load_sku_index(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn.lock();
        products::load_sku_index(&conn)
    }

    /// Total product count
    pub fn count_products(&self) -> Result<i64> {
        let conn = self.conn.lock();
        products::count_products(&conn)
    }

    // ========== Price History Methods ==========

    /// Append one price snapshot
    pub fn append_price_history(
        &self,
        product_id: i64,
        upload_id: Option<i64>,
        reference_price: f64,
        supplier_price: Option<f64>,
        notes: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        price_history::append_entry(
            &conn,
            product_id,
            upload_id,
            reference_price,
            supplier_price,
            notes,
        )
    }

    /// Price snapshots for one product, newest first
    pub fn price_history_for_product(
        &self,
        product_id: i64,
        limit: usize,
    ) -> Result<Vec<PriceHistoryEntry>> {
        let conn = self.conn.lock();
        price_history::list_for_product(&conn, product_id, limit)
    }

    // ========== Upload Methods ==========

    /// Create a new upload job in `Pending`
    pub fn create_upload(
        &self,
        filename: &str,
        file_hash: &str,
        records_count: i64,
    ) -> Result<UploadJob> {
        let conn = self.conn.lock();
        uploads::create_upload(&conn, filename, file_hash, records_count)
    }

    /// Get one upload job
    pub fn get_upload(&self, id: i64) -> Result<Option<UploadJob>> {
        let conn = self.conn.lock();
        uploads::get_upload(&conn, id)
    }

    /// List all upload jobs, newest first
    pub fn list_uploads(&self) -> Result<Vec<UploadJob>> {
        let conn = self.conn.lock();
        uploads::list_uploads(&conn)
    }

    /// Apply a lifecycle transition through the single authorized path
    pub fn transition_upload(
        &self,
        id: i64,
        next: UploadStatus,
        message: Option<&str>,
    ) -> Result<UploadJob> {
        let conn = self.conn.lock();
        uploads::transition_upload(&conn, id, next, message)
    }

    /// Increment the processed counter, returns the new value
    pub fn increment_processed(&self, id: i64) -> Result<i64> {
        let conn = self.conn.lock();
        uploads::increment_processed(&conn, id)
    }

    /// Register a product the job wrote to
    pub fn add_affected_product(&self, upload_id: i64, product_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        uploads::add_affected_product(&conn, upload_id, product_id)
    }

    /// Product ids annotated by a job
    pub fn affected_product_ids(&self, upload_id: i64) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        uploads::affected_product_ids(&conn, upload_id)
    }

    /// Undo every supplier annotation attributable to one upload job:
    /// clear supplier fields on the affected products and remove the
    /// price-history rows the job wrote. One transaction.
    pub fn rollback_upload(&self, upload_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids = uploads::affected_product_ids(&tx, upload_id)?;
        products::clear_supplier_fields(&tx, &ids)?;
        price_history::delete_for_upload(&tx, upload_id)?;
        tx.commit()?;
        Ok(ids)
    }

    /// Rollback and remove an upload job entirely. One transaction.
    pub fn rollback_and_delete_upload(&self, upload_id: i64) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids = uploads::affected_product_ids(&tx, upload_id)?;
        products::clear_supplier_fields(&tx, &ids)?;
        price_history::delete_for_upload(&tx, upload_id)?;
        uploads::delete_upload_row(&tx, upload_id)?;
        tx.commit()?;
        Ok(ids)
    }

    // ========== Settings Methods ==========

    /// Get settings
    pub fn get_settings(&self) -> Result<Settings> {
        let conn = self.conn.lock();
        settings::get_settings(&conn)
    }

    /// Update settings; absent fields keep their current value
    pub fn update_settings(
        &self,
        discrepancy_threshold_pct: Option<f64>,
        price_check_enabled: Option<bool>,
        price_check_hour: Option<u32>,
        price_check_minute: Option<u32>,
        price_check_timezone: Option<String>,
        sync_poll_interval_secs: Option<u64>,
    ) -> Result<Settings> {
        let conn = self.conn.lock();
        settings::update_settings(
            &conn,
            discrepancy_threshold_pct,
            price_check_enabled,
            price_check_hour,
            price_check_minute,
            price_check_timezone,
            sync_poll_interval_secs,
        )
    }

    /// Store encrypted platform credentials
    pub fn store_platform_credentials(
        &self,
        shop_url: &str,
        access_token_encrypted: &str,
        nonce: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        settings::store_platform_credentials(&conn, shop_url, access_token_encrypted, nonce)
    }

    /// Get encrypted platform credentials
    pub fn get_platform_credentials(&self) -> Result<Option<(String, String, String)>> {
        let conn = self.conn.lock();
        settings::get_platform_credentials(&conn)
    }

    /// Delete stored platform credentials
    pub fn delete_platform_credentials(&self) -> Result<()> {
        let conn = self.conn.lock();
        settings::delete_platform_credentials(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn test_product(sku: &str, price: f64) -> ProductUpsert {
        ProductUpsert {
            sku: sku.to_string(),
            title: format!("Product {}", sku),
            reference_price: price,
            cost_price: None,
            status: "active".to_string(),
            vendor: None,
            product_type: None,
        }
    }

    #[test]
    fn test_upsert_product_is_idempotent_by_sku() {
        let db = SqliteDb::new_in_memory().unwrap();
        let id1 = db.upsert_product(&test_product("ABC", 100.0)).unwrap();
        let id2 = db.upsert_product(&test_product("ABC", 120.0)).unwrap();
        assert_eq!(id1, id2);

        let product = db.get_product(id1).unwrap().unwrap();
        assert_eq!(product.reference_price, 120.0);
        assert_eq!(db.count_products().unwrap(), 1);
    }

    #[test]
    fn test_sku_lookup_is_case_sensitive() {
        let db = SqliteDb::new_in_memory().unwrap();
        db.upsert_product(&test_product("abc", 10.0)).unwrap();
        assert!(db.get_product_by_sku("abc").unwrap().is_some());
        assert!(db.get_product_by_sku("ABC").unwrap().is_none());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let db = SqliteDb::new_in_memory().unwrap();
        let job = db.create_upload("f.csv", "hash", 3).unwrap();
        assert_eq!(job.status, UploadStatus::Pending);

        let job = db
            .transition_upload(job.id, UploadStatus::Processing, None)
            .unwrap();
        let job = db
            .transition_upload(job.id, UploadStatus::Completed, None)
            .unwrap();

        // Completed is terminal
        let err = db
            .transition_upload(job.id, UploadStatus::Processing, None)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_processed_count_is_monotonic() {
        let db = SqliteDb::new_in_memory().unwrap();
        let job = db.create_upload("f.csv", "hash", 5).unwrap();
        let mut last = 0;
        for _ in 0..5 {
            let count = db.increment_processed(job.id).unwrap();
            assert!(count > last);
            last = count;
        }
        assert_eq!(last, 5);
    }

    #[test]
    fn test_rollback_clears_supplier_annotations_and_history() {
        let db = SqliteDb::new_in_memory().unwrap();
        let p1 = db.upsert_product(&test_product("P1", 100.0)).unwrap();
        let p2 = db.upsert_product(&test_product("P2", 50.0)).unwrap();
        let job = db.create_upload("f.csv", "hash", 2).unwrap();

        for (id, url, price) in [(p1, "https://s.test/1", 90.0), (p2, "https://s.test/2", 55.0)] {
            db.set_supplier_url(id, url).unwrap();
            db.add_affected_product(job.id, id).unwrap();
            db.record_observation(id, price, true).unwrap();
            db.append_price_history(id, Some(job.id), 100.0, Some(price), None)
                .unwrap();
        }

        let ids = db.rollback_upload(job.id).unwrap();
        assert_eq!(ids, vec![p1, p2]);

        for id in [p1, p2] {
            let product = db.get_product(id).unwrap().unwrap();
            assert!(product.supplier_url.is_none());
            assert!(product.supplier_price.is_none());
            assert!(!product.has_price_discrepancy);
            assert!(db.price_history_for_product(id, 10).unwrap().is_empty());
        }
    }

    #[test]
    fn test_rollback_and_delete_removes_job() {
        let db = SqliteDb::new_in_memory().unwrap();
        let p1 = db.upsert_product(&test_product("P1", 100.0)).unwrap();
        let job = db.create_upload("f.csv", "hash", 1).unwrap();
        db.add_affected_product(job.id, p1).unwrap();
        db.set_supplier_url(p1, "https://s.test/1").unwrap();

        db.rollback_and_delete_upload(job.id).unwrap();
        assert!(db.get_upload(job.id).unwrap().is_none());
        let product = db.get_product(p1).unwrap().unwrap();
        assert!(product.supplier_url.is_none());
    }

    #[test]
    fn test_settings_defaults_and_patch() {
        let db = SqliteDb::new_in_memory().unwrap();
        let settings = db.get_settings().unwrap();
        assert_eq!(settings.discrepancy_threshold_pct, 0.0);
        assert!(settings.price_check_enabled);

        let settings = db
            .update_settings(Some(2.5), None, None, None, None, None)
            .unwrap();
        assert_eq!(settings.discrepancy_threshold_pct, 2.5);
        assert!(settings.price_check_enabled);
    }

    #[test]
    fn test_platform_credentials_round_trip() {
        let db = SqliteDb::new_in_memory().unwrap();
        assert!(db.get_platform_credentials().unwrap().is_none());

        db.store_platform_credentials("https://shop.test", "cipher", "nonce")
            .unwrap();
        let (url, cipher, nonce) = db.get_platform_credentials().unwrap().unwrap();
        assert_eq!(url, "https://shop.test");
        assert_eq!(cipher, "cipher");
        assert_eq!(nonce, "nonce");

        db.delete_platform_credentials().unwrap();
        assert!(db.get_platform_credentials().unwrap().is_none());
    }
}
