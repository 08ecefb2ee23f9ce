//! Application state management

use crate::db::sqlite::SqliteDb;
use crate::error::{AppError, Result};
use crate::platform::CommercePlatform;
use crate::security::SecretStore;
use crate::services::sync::SyncTracker;
use crate::suppliers::SupplierRegistry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tauri::{AppHandle, Manager};

/// Application state shared across all commands
pub struct AppState {
    /// SQLite catalog store
    pub sqlite: Arc<SqliteDb>,

    /// Encrypted secret storage for platform credentials
    pub secrets: Arc<SecretStore>,

    /// Supplier price sources
    pub suppliers: Arc<SupplierRegistry>,

    /// Sync progress tracker (singleton per active sync)
    pub sync: Arc<SyncTracker>,

    /// Connected commerce platform, if any
    platform: RwLock<Option<Arc<dyn CommercePlatform>>>,

    /// SKU -> product id cache for O(1) matcher lookups
    sku_cache: DashMap<String, i64>,

    /// Cooperative cancellation flags for in-flight upload jobs
    upload_flags: DashMap<i64, Arc<AtomicBool>>,

    /// Application data directory
    pub data_dir: PathBuf,
}

impl AppState {
    /// Create new application state
    pub fn new(app_handle: &AppHandle) -> Result<Self> {
        let data_dir = app_handle
            .path()
            .app_data_dir()
            .map_err(|e| AppError::Config(format!("Failed to get app data directory: {}", e)))?;
        std::fs::create_dir_all(&data_dir)?;

        tracing::info!("Data directory: {:?}", data_dir);

        let sqlite = Arc::new(SqliteDb::new(&data_dir.join("pricesync.db"))?);
        let secrets = Arc::new(SecretStore::new(&data_dir)?);
        let suppliers = Arc::new(SupplierRegistry::new()?);

        let state = Self {
            sqlite,
            secrets,
            suppliers,
            sync: Arc::new(SyncTracker::new()),
            platform: RwLock::new(None),
            sku_cache: DashMap::new(),
            upload_flags: DashMap::new(),
            data_dir,
        };

        state.reload_sku_cache()?;
        Ok(state)
    }

    /// State backed by an in-memory database and a scripted price source
    #[cfg(test)]
    pub fn new_for_testing(
        source: Arc<dyn crate::suppliers::PriceSource>,
    ) -> Result<Self> {
        let sqlite = Arc::new(SqliteDb::new_in_memory()?);
        let secrets = Arc::new(SecretStore::from_key(&SecretStore::generate_key())?);
        let suppliers = Arc::new(SupplierRegistry::with_default(source));

        Ok(Self {
            sqlite,
            secrets,
            suppliers,
            sync: Arc::new(SyncTracker::new()),
            platform: RwLock::new(None),
            sku_cache: DashMap::new(),
            upload_flags: DashMap::new(),
            data_dir: std::env::temp_dir(),
        })
    }

    // ========== SKU Cache ==========

    /// Rebuild the SKU cache from the database
    pub fn reload_sku_cache(&self) -> Result<()> {
        let index = self.sqlite.load_sku_index()?;
        self.sku_cache.clear();
        for (sku, id) in index {
            self.sku_cache.insert(sku, id);
        }
        tracing::info!("Loaded {} SKUs into cache", self.sku_cache.len());
        Ok(())
    }

    /// Exact, case-sensitive SKU lookup
    pub fn product_id_for_sku(&self, sku: &str) -> Option<i64> {
        self.sku_cache.get(sku).map(|entry| *entry.value())
    }

    /// Insert or refresh one cache entry (catalog sync upsert path)
    pub fn cache_sku(&self, sku: &str, product_id: i64) {
        self.sku_cache.insert(sku.to_string(), product_id);
    }

    // ========== Upload Cancellation Flags ==========

    /// Register a fresh cancel flag for a job about to start processing
    pub fn register_upload(&self, upload_id: i64) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.upload_flags.insert(upload_id, Arc::clone(&flag));
        flag
    }

    /// Request cooperative cancellation. Returns false when no
    /// processing task is alive for this job.
    pub fn request_upload_cancel(&self, upload_id: i64) -> bool {
        match self.upload_flags.get(&upload_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Whether a processing task is still registered for this job
    pub fn upload_task_alive(&self, upload_id: i64) -> bool {
        self.upload_flags.contains_key(&upload_id)
    }

    /// Drop the flag once the processing task has terminated
    pub fn deregister_upload(&self, upload_id: i64) {
        self.upload_flags.remove(&upload_id);
    }

    // ========== Platform ==========

    /// Currently connected commerce platform
    pub fn get_platform(&self) -> Option<Arc<dyn CommercePlatform>> {
        self.platform.read().clone()
    }

    /// Swap the connected platform client
    pub fn set_platform(&self, platform: Option<Arc<dyn CommercePlatform>>) {
        *self.platform.write() = platform;
    }
}
