//! Upload job lifecycle
//!
//! An upload job moves Pending -> Processing -> {Completed, Error,
//! Cancelled}; the status column only changes through the database
//! transition path, which enforces legality. Cancellation and deletion
//! undo every annotation attributable to the job; a job that ends in
//! Error keeps its partial annotations for inspection.

use crate::db::sqlite::models::{UploadJob, UploadStatus};
use crate::error::{AppError, Result};
use crate::ingest::{self, CsvRecord};
use crate::services::catalog_matcher::CatalogMatcher;
use crate::services::discrepancy::DiscrepancyService;
use crate::state::AppState;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct UploadService;

impl UploadService {
    /// Validate an incoming price list and create its job in `Pending`.
    /// A wrong extension is a format error, a file without usable
    /// records a validation error; a partially valid file is accepted
    /// with its warning logged.
    pub fn create_upload(state: &AppState, filename: &str, content: &str) -> Result<UploadJob> {
        if !ingest::has_csv_extension(filename) {
            return Err(AppError::Format(format!(
                "'{}' is not a CSV file. Only .csv files are accepted.",
                filename
            )));
        }

        let verdict = ingest::validate_upload(filename, content);
        if !verdict.valid {
            return Err(AppError::Validation(
                verdict
                    .message
                    .unwrap_or_else(|| "Upload rejected".to_string()),
            ));
        }

        let file_hash = format!("{:x}", Sha256::digest(content.as_bytes()));
        let records_count = verdict.record_count.unwrap_or(0) as i64;

        let job = state.sqlite.create_upload(filename, &file_hash, records_count)?;
        if let Some(warning) = verdict.message {
            tracing::info!("Upload {} accepted with warning: {}", job.id, warning);
        }
        tracing::info!(
            "Created upload {} ({}, {} records)",
            job.id,
            filename,
            records_count
        );
        Ok(job)
    }

    /// Process a pending upload: match records, fetch supplier prices,
    /// annotate the catalog. Registers a fresh cancel flag for the job.
    pub async fn process_upload(
        state: &AppState,
        upload_id: i64,
        content: &str,
    ) -> Result<UploadJob> {
        let flag = state.register_upload(upload_id);
        let result = Self::process_with_flag(state, upload_id, content, &flag).await;
        state.deregister_upload(upload_id);
        result
    }

    /// Processing loop with a caller-visible cancel flag. The flag is
    /// checked once per record; a set flag rolls back everything the
    /// job wrote and lands it in `Cancelled`.
    pub async fn process_with_flag(
        state: &AppState,
        upload_id: i64,
        content: &str,
        cancel: &Arc<AtomicBool>,
    ) -> Result<UploadJob> {
        state
            .sqlite
            .transition_upload(upload_id, UploadStatus::Processing, None)?;

        // Threshold is read once at processing start; a settings change
        // mid-run applies to the next job.
        let threshold = state.sqlite.get_settings()?.discrepancy_threshold_pct;

        // Every complete record counts toward processed_count, so a
        // Completed job always reads records_count/records_count. A SKU
        // appearing twice is attempted twice; the later row overwrites
        // the earlier annotation.
        let records = ingest::parse_csv(content, None);
        let outcome = CatalogMatcher::match_records(state, &records);
        let unmatched = outcome.unmatched_skus.len();
        let mut flagged = 0usize;

        for skipped in &outcome.unmatched_skus {
            tracing::warn!("Upload {}: no catalog entry for SKU {}", upload_id, skipped);
            state.sqlite.increment_processed(upload_id)?;
        }

        for matched in &outcome.matched {
            if cancel.load(Ordering::SeqCst) {
                return Self::finish_cancelled(state, upload_id);
            }

            match Self::annotate_product(state, upload_id, matched.product_id, &matched.record, threshold)
                .await
            {
                Ok(discrepant) => {
                    if discrepant {
                        flagged += 1;
                    }
                }
                Err(e) => {
                    // A database failure poisons the job; partial
                    // annotations stay in place for inspection.
                    let message = format!("Processing failed: {}", e);
                    state
                        .sqlite
                        .transition_upload(upload_id, UploadStatus::Error, Some(&message))?;
                    return Err(e);
                }
            }
            state.sqlite.increment_processed(upload_id)?;
        }

        if cancel.load(Ordering::SeqCst) {
            return Self::finish_cancelled(state, upload_id);
        }

        let message = format!(
            "Matched {} of {} records ({} unmatched, {} flagged)",
            outcome.matched.len(),
            outcome.total(),
            unmatched,
            flagged
        );
        let job = state
            .sqlite
            .transition_upload(upload_id, UploadStatus::Completed, Some(&message))?;
        tracing::info!("Upload {} completed: {}", upload_id, message);
        Ok(job)
    }

    /// Annotate one catalog entry from a matched record. Returns whether
    /// the observation was flagged as a discrepancy. Scrape failures are
    /// per-record: the entry is marked checked and the loop continues.
    async fn annotate_product(
        state: &AppState,
        upload_id: i64,
        product_id: i64,
        record: &CsvRecord,
        threshold: f64,
    ) -> Result<bool> {
        state
            .sqlite
            .set_supplier_url(product_id, &record.origin_url)?;
        state.sqlite.add_affected_product(upload_id, product_id)?;

        let supplier_price = match state.suppliers.resolve(&record.origin_url) {
            Ok(source) => match source.fetch_price(&record.origin_url).await {
                Ok(price) => price,
                Err(e) => {
                    tracing::warn!(
                        "Upload {}: price fetch failed for {}: {}",
                        upload_id,
                        record.origin_url,
                        e
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Upload {}: {}", upload_id, e);
                None
            }
        };

        let Some(supplier_price) = supplier_price else {
            state.sqlite.touch_checked(product_id)?;
            return Ok(false);
        };

        let product = state
            .sqlite
            .get_product(product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
        let discrepant =
            DiscrepancyService::is_discrepant(product.reference_price, supplier_price, threshold);

        state
            .sqlite
            .record_observation(product_id, supplier_price, discrepant)?;
        state.sqlite.append_price_history(
            product_id,
            Some(upload_id),
            product.reference_price,
            Some(supplier_price),
            None,
        )?;

        Ok(discrepant)
    }

    fn finish_cancelled(state: &AppState, upload_id: i64) -> Result<UploadJob> {
        let rolled_back = state.sqlite.rollback_upload(upload_id)?;
        let message = format!(
            "Cancelled; rolled back {} product annotations",
            rolled_back.len()
        );
        let job = state
            .sqlite
            .transition_upload(upload_id, UploadStatus::Cancelled, Some(&message))?;
        tracing::info!("Upload {} cancelled", upload_id);
        Ok(job)
    }

    /// Request cancellation of a job. Terminal jobs are a no-op. A live
    /// processing task is cancelled cooperatively and performs its own
    /// rollback; a job with no live task (pending, or orphaned by a
    /// crash) is rolled back here directly.
    pub fn cancel_upload(state: &AppState, upload_id: i64) -> Result<UploadJob> {
        let job = state
            .sqlite
            .get_upload(upload_id)?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)))?;

        if job.status.is_terminal() {
            return Ok(job);
        }

        if state.request_upload_cancel(upload_id) {
            // The processing task observes the flag at its next record
            // boundary; callers see the still-running job until then.
            return state
                .sqlite
                .get_upload(upload_id)?
                .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)));
        }

        Self::finish_cancelled(state, upload_id)
    }

    /// Delete a job and roll back everything it wrote, terminal or not.
    /// A live processing task is cancelled first and its termination
    /// awaited, so the caller always observes the job gone.
    pub async fn delete_upload(state: &AppState, upload_id: i64) -> Result<Vec<i64>> {
        let job = state
            .sqlite
            .get_upload(upload_id)?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", upload_id)))?;

        if !job.status.is_terminal() && state.request_upload_cancel(upload_id) {
            // The task observes the flag at its next record boundary,
            // rolls back and deregisters; wait for that before removing
            // the row. The timeout only guards against an orphaned flag.
            let drained = async {
                while state.upload_task_alive(upload_id) {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            };
            if tokio::time::timeout(std::time::Duration::from_secs(30), drained)
                .await
                .is_err()
            {
                tracing::warn!("Upload {} task did not stop in time", upload_id);
            }
        }

        let rolled_back = state.sqlite.rollback_and_delete_upload(upload_id)?;
        tracing::info!(
            "Deleted upload {} and rolled back {} products",
            upload_id,
            rolled_back.len()
        );
        Ok(rolled_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::models::ProductUpsert;
    use crate::suppliers::MockPriceSource;

    fn test_state(source: Arc<MockPriceSource>) -> AppState {
        AppState::new_for_testing(source).unwrap()
    }

    fn seed_product(state: &AppState, sku: &str, price: f64) -> i64 {
        let id = state
            .sqlite
            .upsert_product(&ProductUpsert {
                sku: sku.to_string(),
                title: format!("Product {}", sku),
                reference_price: price,
                cost_price: None,
                status: "active".to_string(),
                vendor: None,
                product_type: None,
            })
            .unwrap();
        state.cache_sku(sku, id);
        id
    }

    #[tokio::test]
    async fn test_full_pipeline_annotates_and_flags() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/a", 80.0);
        source.set_price("https://s.test/b", 50.0);
        let state = test_state(source);

        let a = seed_product(&state, "A", 100.0);
        let b = seed_product(&state, "B", 50.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\nB,https://s.test/b\nGHOST,https://s.test/g\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        assert_eq!(job.status, UploadStatus::Pending);
        assert_eq!(job.records_count, 3);

        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();
        assert_eq!(job.status, UploadStatus::Completed);
        assert_eq!(job.processed_count, 3);
        assert_eq!(job.affected_product_ids, vec![a, b]);

        // A differs from its reference, B matches exactly
        let product_a = state.sqlite.get_product(a).unwrap().unwrap();
        assert_eq!(product_a.supplier_price, Some(80.0));
        assert!(product_a.has_price_discrepancy);

        let product_b = state.sqlite.get_product(b).unwrap().unwrap();
        assert_eq!(product_b.supplier_price, Some(50.0));
        assert!(!product_b.has_price_discrepancy);

        assert_eq!(state.sqlite.price_history_for_product(a, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_last_row_wins_and_both_count() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/old", 70.0);
        source.set_price("https://s.test/new", 90.0);
        let state = test_state(source);
        let a = seed_product(&state, "A", 100.0);

        let csv = "SKU,Origin URL\nA,https://s.test/old\nA,https://s.test/new\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        assert_eq!(job.records_count, 2);

        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();
        assert_eq!(job.status, UploadStatus::Completed);
        // Both rows were attempted; Completed reads 2/2
        assert_eq!(job.processed_count, job.records_count);

        // The later row's annotation survives
        let product = state.sqlite.get_product(a).unwrap().unwrap();
        assert_eq!(product.supplier_url.as_deref(), Some("https://s.test/new"));
        assert_eq!(product.supplier_price, Some(90.0));

        // One affected product, two observations
        assert_eq!(job.affected_product_ids, vec![a]);
        assert_eq!(state.sqlite.price_history_for_product(a, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scrape_failure_is_per_record() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/b", 55.0);
        source.fail_url("https://s.test/a");
        let state = test_state(source);

        let a = seed_product(&state, "A", 100.0);
        let b = seed_product(&state, "B", 50.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\nB,https://s.test/b\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();

        assert_eq!(job.status, UploadStatus::Completed);

        // A was checked but has no observation; B went through
        let product_a = state.sqlite.get_product(a).unwrap().unwrap();
        assert!(product_a.supplier_price.is_none());
        assert!(product_a.last_checked.is_some());
        assert!(product_a.last_scraped.is_none());

        let product_b = state.sqlite.get_product(b).unwrap().unwrap();
        assert_eq!(product_b.supplier_price, Some(55.0));
    }

    #[tokio::test]
    async fn test_cancel_flag_rolls_back_everything() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/a", 80.0);
        let state = test_state(source);
        let a = seed_product(&state, "A", 100.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();

        let cancel = Arc::new(AtomicBool::new(true));
        let job = UploadService::process_with_flag(&state, job.id, csv, &cancel)
            .await
            .unwrap();
        assert_eq!(job.status, UploadStatus::Cancelled);

        let product = state.sqlite.get_product(a).unwrap().unwrap();
        assert!(product.supplier_url.is_none());
        assert!(product.supplier_price.is_none());
        assert!(!product.has_price_discrepancy);
        assert!(state.sqlite.price_history_for_product(a, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_on_terminal_job_is_noop() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/a", 80.0);
        let state = test_state(source);
        let a = seed_product(&state, "A", 100.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();
        assert_eq!(job.status, UploadStatus::Completed);

        let job = UploadService::cancel_upload(&state, job.id).unwrap();
        assert_eq!(job.status, UploadStatus::Completed);

        // Annotations survive the no-op
        let product = state.sqlite.get_product(a).unwrap().unwrap();
        assert_eq!(product.supplier_price, Some(80.0));
    }

    #[tokio::test]
    async fn test_cancel_pending_job_without_task() {
        let source = Arc::new(MockPriceSource::new());
        let state = test_state(source);

        let csv = "SKU,Origin URL\nA,https://s.test/a\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();

        let job = UploadService::cancel_upload(&state, job.id).unwrap();
        assert_eq!(job.status, UploadStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_delete_terminal_job_still_rolls_back() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/a", 80.0);
        let state = test_state(source);
        let a = seed_product(&state, "A", 100.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();
        assert_eq!(job.status, UploadStatus::Completed);

        let rolled_back = UploadService::delete_upload(&state, job.id).await.unwrap();
        assert_eq!(rolled_back, vec![a]);
        assert!(state.sqlite.get_upload(job.id).unwrap().is_none());

        let product = state.sqlite.get_product(a).unwrap().unwrap();
        assert!(product.supplier_url.is_none());
        assert!(product.supplier_price.is_none());
        assert!(!product.has_price_discrepancy);
    }

    /// Price source that answers slowly, keeping a processing task
    /// alive long enough to race against
    struct SlowPriceSource {
        price: f64,
        delay: std::time::Duration,
    }

    #[async_trait::async_trait]
    impl crate::suppliers::PriceSource for SlowPriceSource {
        fn id(&self) -> &'static str {
            "slow"
        }

        async fn fetch_price(&self, _url: &str) -> crate::error::Result<Option<f64>> {
            tokio::time::sleep(self.delay).await;
            Ok(Some(self.price))
        }
    }

    #[tokio::test]
    async fn test_delete_while_processing_cancels_waits_and_removes() {
        let state = Arc::new(AppState::new_for_testing(Arc::new(SlowPriceSource {
            price: 80.0,
            delay: std::time::Duration::from_millis(50),
        }))
        .unwrap());
        let a = seed_product(&state, "A", 100.0);
        seed_product(&state, "B", 50.0);

        let csv = "SKU,Origin URL\nA,https://s.test/a\nB,https://s.test/b\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        let job_id = job.id;

        let worker = {
            let state = Arc::clone(&state);
            let csv = csv.to_string();
            tokio::spawn(async move {
                let _ = UploadService::process_upload(&state, job_id, &csv).await;
            })
        };

        // Let the task get into its first slow fetch, then delete
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        UploadService::delete_upload(&state, job_id).await.unwrap();
        worker.await.unwrap();

        // The job is gone and everything it wrote was undone
        assert!(state.sqlite.get_upload(job_id).unwrap().is_none());
        let product = state.sqlite.get_product(a).unwrap().unwrap();
        assert!(product.supplier_url.is_none());
        assert!(product.supplier_price.is_none());
        assert!(state.sqlite.price_history_for_product(a, 10).unwrap().is_empty());
    }

    #[test]
    fn test_create_upload_rejects_invalid_file() {
        let state = test_state(Arc::new(MockPriceSource::new()));
        // Wrong extension is a format error
        let err = UploadService::create_upload(&state, "prices.txt", "SKU,Origin URL\nA,u\n")
            .unwrap_err();
        assert!(matches!(err, AppError::Format(_)));

        // Structurally unusable content is a validation error
        let err = UploadService::create_upload(&state, "prices.csv", "Title\nWidget\n").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_partial_file_counts_only_complete_records() {
        let source = Arc::new(MockPriceSource::new());
        source.set_price("https://s.test/a", 100.0);
        let state = test_state(source);
        seed_product(&state, "A", 100.0);

        // Second row is missing its origin URL
        let csv = "SKU,Origin URL\nA,https://s.test/a\nB,\n";
        let job = UploadService::create_upload(&state, "prices.csv", csv).unwrap();
        assert_eq!(job.records_count, 1);

        let job = UploadService::process_upload(&state, job.id, csv).await.unwrap();
        assert_eq!(job.status, UploadStatus::Completed);
        assert_eq!(job.processed_count, 1);
    }
}
