//! Catalog sync tracking
//!
//! A catalog sync runs for minutes; the dashboard polls
//! `get_sync_progress` and `get_recent_cost_logs` on a short interval
//! for reassurance while it does. The tracker aggregates progress
//! events and cost-price observations into a bounded, deduplicated
//! feed. It is a best-effort view for the operator, never authoritative
//! catalog state.
//!
//! The in-process sync runner emits explicit phases; free-text phase
//! inference survives only in [`legacy`] as a compatibility shim for
//! external log sources.

use crate::db::sqlite::models::ProductUpsert;
use crate::error::{AppError, Result};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Most recent cost observations kept in the feed
const COST_LOG_LIMIT: usize = 20;

/// Raw log entries kept for display
const LOG_BUFFER_LIMIT: usize = 100;

/// Products fetched per platform page
const SYNC_PAGE_SIZE: usize = 50;

/// Sync lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Coarse sync phase, emitted explicitly by the sync runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Counting,
    Processing,
    Completing,
}

/// Snapshot of the active (or last) sync, served to polling clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub id: Option<String>,
    pub status: SyncStatus,
    pub phase: Option<SyncPhase>,
    pub message: String,
    pub processed_items: usize,
    pub total_items: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_completion_time: Option<DateTime<Utc>>,
    pub unique_product_count: Option<usize>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            id: None,
            status: SyncStatus::Pending,
            phase: None,
            message: String::new(),
            processed_items: 0,
            total_items: 0,
            started_at: None,
            estimated_completion_time: None,
            unique_product_count: None,
        }
    }
}

/// One cost-price observation extracted from the log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLogEntry {
    pub sku: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

/// One log event from a sync producer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

/// External log event source contract, polled while a sync is active
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    async fn recent_logs(&self) -> Result<Vec<LogEntry>>;
}

/// Compatibility shims for log sources that predate explicit phase
/// metadata
pub mod legacy {
    use super::SyncPhase;

    /// Infer the sync phase from free-text message cues. First match
    /// wins in the order count, process, complete; messages matching
    /// none yield `None`.
    pub fn infer_phase(message: &str) -> Option<SyncPhase> {
        if message.contains("Counting") {
            Some(SyncPhase::Counting)
        } else if message.contains("Processing") {
            Some(SyncPhase::Processing)
        } else if message.contains("Completing") {
            Some(SyncPhase::Completing)
        } else {
            None
        }
    }
}

fn cost_price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Got cost price for (\S+): \$([0-9][0-9,]*\.?[0-9]*)")
            .expect("cost price pattern is valid")
    })
}

/// Aggregates progress and cost-price observations for one sync at a
/// time
pub struct SyncTracker {
    progress: RwLock<SyncProgress>,
    cost_feed: RwLock<Vec<CostLogEntry>>,
    log_buffer: RwLock<Vec<LogEntry>>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self {
            progress: RwLock::new(SyncProgress::default()),
            cost_feed: RwLock::new(Vec::new()),
            log_buffer: RwLock::new(Vec::new()),
        }
    }

    /// Whether a sync is currently pending or running
    pub fn is_active(&self) -> bool {
        matches!(
            self.progress.read().status,
            SyncStatus::Pending | SyncStatus::InProgress
        )
    }

    /// Start tracking a new sync, resetting the previous feed
    pub fn begin(&self, message: &str) {
        let mut progress = self.progress.write();
        *progress = SyncProgress {
            id: Some(uuid::Uuid::new_v4().to_string()),
            status: SyncStatus::InProgress,
            phase: None,
            message: message.to_string(),
            started_at: Some(Utc::now()),
            ..SyncProgress::default()
        };
        self.cost_feed.write().clear();
        self.log_buffer.write().clear();
    }

    /// Explicit phase change from the sync producer
    pub fn set_phase(&self, phase: SyncPhase, message: &str) {
        let mut progress = self.progress.write();
        progress.phase = Some(phase);
        progress.message = message.to_string();
    }

    /// Update counters and recompute the completion estimate
    pub fn update_progress(&self, processed: usize, total: usize, message: &str) {
        let mut progress = self.progress.write();
        progress.processed_items = processed;
        progress.total_items = total;
        progress.message = message.to_string();

        progress.estimated_completion_time = match (progress.started_at, processed) {
            (Some(started), done) if done > 0 && total > done => {
                let elapsed = Utc::now().signed_duration_since(started);
                let per_item = elapsed / done as i32;
                Some(Utc::now() + per_item * (total - done) as i32)
            }
            _ => None,
        };
    }

    pub fn set_unique_products(&self, count: usize) {
        self.progress.write().unique_product_count = Some(count);
    }

    pub fn complete(&self, message: &str) {
        let mut progress = self.progress.write();
        progress.status = SyncStatus::Complete;
        progress.phase = Some(SyncPhase::Completing);
        progress.message = message.to_string();
        progress.estimated_completion_time = None;
    }

    pub fn fail(&self, message: &str) {
        let mut progress = self.progress.write();
        progress.status = SyncStatus::Failed;
        progress.message = message.to_string();
        progress.estimated_completion_time = None;
    }

    /// Snapshot served to polling clients
    pub fn snapshot(&self) -> SyncProgress {
        self.progress.read().clone()
    }

    /// Current deduplicated cost feed, newest first
    pub fn recent_cost_logs(&self) -> Vec<CostLogEntry> {
        self.cost_feed.read().clone()
    }

    /// Recent raw log entries, newest first
    pub fn recent_entries(&self) -> Vec<LogEntry> {
        self.log_buffer.read().clone()
    }

    /// Append one producer-side log event
    pub fn emit(&self, level: &str, message: String, metadata: Option<serde_json::Value>) {
        self.ingest_entries(&[LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message,
            metadata,
        }]);
    }

    /// Merge a batch of log entries into the feed and buffer.
    ///
    /// Entries from legacy sources carry no phase metadata; the phase
    /// heuristic is applied to the newest message only while a sync is
    /// active, and never downgrades an explicit phase.
    pub fn ingest_entries(&self, entries: &[LogEntry]) {
        if entries.is_empty() {
            return;
        }

        let mut extracted: Vec<CostLogEntry> = entries
            .iter()
            .filter_map(extract_cost_entry)
            .collect();

        if !extracted.is_empty() {
            let mut feed = self.cost_feed.write();
            // Merge, sort newest first, then dedup by SKU so the most
            // recent observation per SKU survives.
            extracted.extend(feed.drain(..));
            extracted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            let mut seen = HashSet::new();
            let mut merged: Vec<CostLogEntry> = extracted
                .into_iter()
                .filter(|entry| seen.insert(entry.sku.clone()))
                .collect();
            merged.truncate(COST_LOG_LIMIT);
            *feed = merged;
        }

        {
            let mut buffer = self.log_buffer.write();
            let mut incoming: Vec<LogEntry> = entries.to_vec();
            incoming.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            incoming.extend(buffer.drain(..));
            incoming.truncate(LOG_BUFFER_LIMIT);
            *buffer = incoming;
        }

        if self.is_active() {
            if let Some(latest) = entries.iter().max_by_key(|e| e.timestamp) {
                let inferred = metadata_phase(latest).or_else(|| legacy::infer_phase(&latest.message));
                let mut progress = self.progress.write();
                progress.message = latest.message.clone();
                if let Some(phase) = inferred {
                    progress.phase = Some(phase);
                }
            }
        }
    }
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata_phase(entry: &LogEntry) -> Option<SyncPhase> {
    let phase = entry.metadata.as_ref()?.get("phase")?.as_str()?;
    match phase {
        "counting" => Some(SyncPhase::Counting),
        "processing" => Some(SyncPhase::Processing),
        "completing" => Some(SyncPhase::Completing),
        _ => None,
    }
}

/// Extract a cost observation from one log entry. The structured
/// metadata path wins; the message regex is the fallback.
fn extract_cost_entry(entry: &LogEntry) -> Option<CostLogEntry> {
    if let Some(metadata) = &entry.metadata {
        if metadata.get("type").and_then(|v| v.as_str()) == Some("cost_price") {
            let sku = metadata.get("sku")?.as_str()?.to_string();
            let price = match metadata.get("price")? {
                serde_json::Value::Number(n) => n.as_f64()?,
                serde_json::Value::String(s) => s.replace(',', "").parse().ok()?,
                _ => return None,
            };
            return Some(CostLogEntry {
                sku,
                price,
                timestamp: entry.timestamp,
            });
        }
    }

    let captures = cost_price_pattern().captures(&entry.message)?;
    let sku = captures.get(1)?.as_str().to_string();
    let price = captures
        .get(2)?
        .as_str()
        .replace(',', "")
        .parse::<f64>()
        .ok()?;
    Some(CostLogEntry {
        sku,
        price,
        timestamp: entry.timestamp,
    })
}

/// Poll an external log source while a sync is active, feeding the
/// tracker. Returns once the sync leaves the active states.
pub async fn poll_log_source(
    tracker: Arc<SyncTracker>,
    source: Arc<dyn LogSource>,
    interval: Duration,
) {
    while tracker.is_active() {
        match source.recent_logs().await {
            Ok(entries) => tracker.ingest_entries(&entries),
            Err(e) => tracing::warn!("Log source poll failed: {}", e),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Catalog sync service
pub struct SyncService;

impl SyncService {
    /// Pull the full catalog from the connected commerce platform,
    /// upserting products and driving the tracker through its phases.
    pub async fn run_catalog_sync(state: &AppState) -> Result<usize> {
        let platform = state
            .get_platform()
            .ok_or_else(|| AppError::Platform("No commerce platform connected".to_string()))?;

        let tracker = &state.sync;
        if tracker.is_active() {
            return Err(AppError::Validation(
                "A catalog sync is already running".to_string(),
            ));
        }

        tracker.begin("Starting catalog sync");
        tracker.set_phase(SyncPhase::Counting, "Counting products...");

        let total = match platform.count_products().await {
            Ok(total) => total,
            Err(e) => {
                tracker.fail(&format!("Catalog sync failed: {}", e));
                return Err(e);
            }
        };
        tracker.update_progress(0, total, &format!("Counting products... {} found", total));

        let mut cursor: Option<String> = None;
        let mut processed = 0usize;
        let mut unique_skus: HashSet<String> = HashSet::new();

        loop {
            let (page, next_cursor) = match platform
                .fetch_products_page(cursor.clone(), SYNC_PAGE_SIZE)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    tracker.fail(&format!("Catalog sync failed: {}", e));
                    return Err(e);
                }
            };

            if page.is_empty() && next_cursor.is_none() {
                break;
            }

            for product in &page {
                let upsert = ProductUpsert {
                    sku: product.sku.clone(),
                    title: product.title.clone(),
                    reference_price: product.price,
                    cost_price: product.cost,
                    status: product.status.clone(),
                    vendor: product.vendor.clone(),
                    product_type: product.product_type.clone(),
                };

                let product_id = match state.sqlite.upsert_product(&upsert) {
                    Ok(id) => id,
                    Err(e) => {
                        tracker.fail(&format!("Catalog sync failed: {}", e));
                        return Err(e);
                    }
                };
                state.cache_sku(&product.sku, product_id);
                unique_skus.insert(product.sku.clone());
                processed += 1;

                if let Some(cost) = product.cost {
                    tracker.emit(
                        "info",
                        format!("Got cost price for {}: ${:.2}", product.sku, cost),
                        Some(serde_json::json!({
                            "type": "cost_price",
                            "sku": product.sku,
                            "price": cost,
                            "phase": "processing",
                        })),
                    );
                }
            }

            tracker.set_phase(SyncPhase::Processing, "Processing products...");
            tracker.update_progress(
                processed,
                total.max(processed),
                &format!("Processing products... {}/{}", processed, total.max(processed)),
            );

            cursor = next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        tracker.set_phase(SyncPhase::Completing, "Completing sync...");
        tracker.set_unique_products(unique_skus.len());
        tracker.complete(&format!("Synced {} products", processed));

        tracing::info!("Catalog sync complete: {} products", processed);
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{CommercePlatform, PlatformProduct};
    use crate::suppliers::MockPriceSource;
    use chrono::TimeZone;

    fn entry_at(secs: i64, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            level: "info".to_string(),
            message: message.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_regex_fallback_extraction() {
        let entry = entry_at(10, "Got cost price for ABC-123: $1,099.50");
        let cost = extract_cost_entry(&entry).unwrap();
        assert_eq!(cost.sku, "ABC-123");
        assert_eq!(cost.price, 1099.50);
    }

    #[test]
    fn test_structured_metadata_wins_over_message() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: "info".to_string(),
            message: "Got cost price for WRONG: $1.00".to_string(),
            metadata: Some(serde_json::json!({
                "type": "cost_price",
                "sku": "RIGHT",
                "price": 42.5,
            })),
        };
        let cost = extract_cost_entry(&entry).unwrap();
        assert_eq!(cost.sku, "RIGHT");
        assert_eq!(cost.price, 42.5);
    }

    #[test]
    fn test_non_cost_entries_are_ignored() {
        let entry = entry_at(1, "Processing products... 5/100");
        assert!(extract_cost_entry(&entry).is_none());
    }

    #[test]
    fn test_cost_feed_dedup_keeps_most_recent() {
        let tracker = SyncTracker::new();
        tracker.begin("start");

        // Fed incrementally: X@1, then X@2 and Y@1
        tracker.ingest_entries(&[entry_at(1, "Got cost price for X: $10.00")]);
        tracker.ingest_entries(&[
            entry_at(2, "Got cost price for X: $12.00"),
            entry_at(1, "Got cost price for Y: $5.00"),
        ]);

        let feed = tracker.recent_cost_logs();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].sku, "X");
        assert_eq!(feed[0].price, 12.00);
        assert_eq!(feed[0].timestamp, Utc.timestamp_opt(2, 0).unwrap());
        assert_eq!(feed[1].sku, "Y");
    }

    #[test]
    fn test_cost_feed_is_bounded() {
        let tracker = SyncTracker::new();
        tracker.begin("start");

        for i in 0..30 {
            tracker.ingest_entries(&[entry_at(
                i,
                &format!("Got cost price for SKU-{}: ${}.00", i, i),
            )]);
        }

        let feed = tracker.recent_cost_logs();
        assert_eq!(feed.len(), COST_LOG_LIMIT);
        // Newest first: SKU-29 down to SKU-10
        assert_eq!(feed[0].sku, "SKU-29");
        assert_eq!(feed[19].sku, "SKU-10");
    }

    #[test]
    fn test_legacy_phase_inference() {
        assert_eq!(legacy::infer_phase("Counting products..."), Some(SyncPhase::Counting));
        assert_eq!(legacy::infer_phase("Processing products... 5/10"), Some(SyncPhase::Processing));
        assert_eq!(legacy::infer_phase("Completing sync..."), Some(SyncPhase::Completing));
        assert_eq!(legacy::infer_phase("something else"), None);
        // Multiple cues: first match wins in count -> process -> complete order
        assert_eq!(
            legacy::infer_phase("Counting done, Processing next"),
            Some(SyncPhase::Counting)
        );
    }

    #[test]
    fn test_phase_not_downgraded_by_unmatched_message() {
        let tracker = SyncTracker::new();
        tracker.begin("start");
        tracker.set_phase(SyncPhase::Processing, "Processing products...");

        tracker.ingest_entries(&[entry_at(5, "fetched a page")]);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.phase, Some(SyncPhase::Processing));
        assert_eq!(snapshot.message, "fetched a page");
    }

    #[test]
    fn test_estimated_completion_present_mid_sync() {
        let tracker = SyncTracker::new();
        tracker.begin("start");
        tracker.update_progress(5, 10, "Processing products... 5/10");
        assert!(tracker.snapshot().estimated_completion_time.is_some());

        tracker.update_progress(10, 10, "Processing products... 10/10");
        assert!(tracker.snapshot().estimated_completion_time.is_none());
    }

    #[tokio::test]
    async fn test_log_poller_feeds_tracker_until_inactive() {
        struct ScriptedSource;

        #[async_trait::async_trait]
        impl LogSource for ScriptedSource {
            async fn recent_logs(&self) -> Result<Vec<LogEntry>> {
                Ok(vec![LogEntry {
                    timestamp: Utc::now(),
                    level: "info".to_string(),
                    message: "Got cost price for Z: $9.99".to_string(),
                    metadata: None,
                }])
            }
        }

        let tracker = Arc::new(SyncTracker::new());
        tracker.begin("start");

        let handle = tokio::spawn(poll_log_source(
            Arc::clone(&tracker),
            Arc::new(ScriptedSource),
            Duration::from_millis(5),
        ));
        tokio::time::sleep(Duration::from_millis(25)).await;
        tracker.complete("done");

        // The poller exits once the sync leaves the active states
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller should stop")
            .unwrap();

        let feed = tracker.recent_cost_logs();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].sku, "Z");
        assert_eq!(feed[0].price, 9.99);
    }

    /// Scripted platform serving a fixed catalog in pages
    struct MockPlatform {
        products: Vec<PlatformProduct>,
        page_size: usize,
    }

    #[async_trait::async_trait]
    impl CommercePlatform for MockPlatform {
        fn id(&self) -> &'static str {
            "mock"
        }

        async fn verify_credentials(&self) -> Result<()> {
            Ok(())
        }

        async fn count_products(&self) -> Result<usize> {
            Ok(self.products.len())
        }

        async fn fetch_products_page(
            &self,
            cursor: Option<String>,
            _limit: usize,
        ) -> Result<(Vec<PlatformProduct>, Option<String>)> {
            let start: usize = cursor.as_deref().map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(self.products.len());
            let page = self.products[start..end].to_vec();
            let next = if end < self.products.len() {
                Some(end.to_string())
            } else {
                None
            };
            Ok((page, next))
        }
    }

    fn mock_product(sku: &str, price: f64, cost: Option<f64>) -> PlatformProduct {
        PlatformProduct {
            sku: sku.to_string(),
            title: format!("Product {}", sku),
            price,
            cost,
            status: "active".to_string(),
            vendor: None,
            product_type: None,
        }
    }

    #[tokio::test]
    async fn test_catalog_sync_end_to_end() {
        let state = AppState::new_for_testing(Arc::new(MockPriceSource::new())).unwrap();
        state.set_platform(Some(Arc::new(MockPlatform {
            products: vec![
                mock_product("A", 10.0, Some(6.0)),
                mock_product("B", 20.0, None),
                mock_product("C", 30.0, Some(18.0)),
            ],
            page_size: 2,
        })));

        let count = SyncService::run_catalog_sync(&state).await.unwrap();
        assert_eq!(count, 3);

        let snapshot = state.sync.snapshot();
        assert_eq!(snapshot.status, SyncStatus::Complete);
        assert_eq!(snapshot.processed_items, 3);
        assert_eq!(snapshot.unique_product_count, Some(3));

        // Catalog rows landed and the SKU cache is warm
        assert_eq!(state.sqlite.count_products().unwrap(), 3);
        assert!(state.product_id_for_sku("B").is_some());

        // Cost observations surfaced through the structured path
        let feed = state.sync.recent_cost_logs();
        let skus: Vec<&str> = feed.iter().map(|e| e.sku.as_str()).collect();
        assert!(skus.contains(&"A"));
        assert!(skus.contains(&"C"));
        assert!(!skus.contains(&"B"));
    }

    #[tokio::test]
    async fn test_sync_without_platform_fails() {
        let state = AppState::new_for_testing(Arc::new(MockPriceSource::new())).unwrap();
        let err = SyncService::run_catalog_sync(&state).await.unwrap_err();
        assert!(matches!(err, AppError::Platform(_)));
        assert_eq!(state.sync.snapshot().status, SyncStatus::Pending);
    }
}
