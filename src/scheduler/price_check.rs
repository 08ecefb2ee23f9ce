//! Daily price re-check scheduler
//!
//! Re-fetches the supplier price for every product carrying a supplier
//! URL, once per day at the configured local time. The check runs
//! outside any upload job, so its history rows carry no upload id and
//! are untouched by upload rollback.

use crate::error::Result;
use crate::services::discrepancy::DiscrepancyService;
use crate::state::AppState;
use chrono::{NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::time::Duration;
use tauri::{AppHandle, Emitter, Manager};
use tracing::{info, warn};

/// Outcome of one re-check pass
#[derive(Debug, Clone, Serialize)]
pub struct RecheckSummary {
    /// Products with a supplier URL that were visited
    pub checked: usize,
    /// Products with a fresh price observation
    pub observed: usize,
    /// Products flagged with a discrepancy this pass
    pub flagged: usize,
}

/// Re-fetch the supplier price for one product
pub async fn rescrape_product(state: &AppState, product_id: i64) -> Result<crate::db::sqlite::models::Product> {
    use crate::error::AppError;

    let product = state
        .sqlite
        .get_product(product_id)?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;
    let supplier_url = product.supplier_url.clone().ok_or_else(|| {
        AppError::Validation(format!("Product {} has no supplier URL", product.sku))
    })?;

    let threshold = state.sqlite.get_settings()?.discrepancy_threshold_pct;
    let source = state.suppliers.resolve(&supplier_url)?;

    match source.fetch_price(&supplier_url).await {
        Ok(Some(price)) => {
            let discrepant =
                DiscrepancyService::is_discrepant(product.reference_price, price, threshold);
            state.sqlite.record_observation(product_id, price, discrepant)?;
            state.sqlite.append_price_history(
                product_id,
                None,
                product.reference_price,
                Some(price),
                None,
            )?;
        }
        Ok(None) => {
            state.sqlite.touch_checked(product_id)?;
        }
        Err(e) => {
            state.sqlite.touch_checked(product_id)?;
            return Err(e);
        }
    }

    state
        .sqlite
        .get_product(product_id)?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
}

/// Re-check every product with a supplier URL. Per-product failures are
/// recorded as absence and do not abort the pass.
pub async fn recheck_all(state: &AppState) -> Result<RecheckSummary> {
    let threshold = state.sqlite.get_settings()?.discrepancy_threshold_pct;
    let products = state.sqlite.list_products_with_supplier_url()?;

    let mut summary = RecheckSummary {
        checked: 0,
        observed: 0,
        flagged: 0,
    };

    for product in products {
        let Some(supplier_url) = product.supplier_url.as_deref() else {
            continue;
        };
        summary.checked += 1;

        let price = match state.suppliers.resolve(supplier_url) {
            Ok(source) => match source.fetch_price(supplier_url).await {
                Ok(price) => price,
                Err(e) => {
                    warn!("Re-check failed for {}: {}", product.sku, e);
                    None
                }
            },
            Err(e) => {
                warn!("Re-check skipped for {}: {}", product.sku, e);
                None
            }
        };

        match price {
            Some(price) => {
                let discrepant =
                    DiscrepancyService::is_discrepant(product.reference_price, price, threshold);
                state.sqlite.record_observation(product.id, price, discrepant)?;
                state.sqlite.append_price_history(
                    product.id,
                    None,
                    product.reference_price,
                    Some(price),
                    None,
                )?;
                summary.observed += 1;
                if discrepant {
                    summary.flagged += 1;
                }
            }
            None => state.sqlite.touch_checked(product.id)?,
        }
    }

    info!(
        "Price re-check: {} checked, {} observed, {} flagged",
        summary.checked, summary.observed, summary.flagged
    );
    Ok(summary)
}

/// Scheduler that runs the re-check daily at the configured local time
pub struct PriceCheckScheduler {
    app_handle: AppHandle,
}

impl PriceCheckScheduler {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }

    /// Duration until the next occurrence of `hour:minute` in `tz`
    pub fn duration_until(hour: u32, minute: u32, tz: &Tz) -> Duration {
        let now_local = Utc::now().with_timezone(tz);

        let target_time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0)
            .unwrap_or(NaiveTime::MIN);
        let now_time = now_local.time();

        let duration_secs = if now_time < target_time {
            // Target is later today
            (target_time - now_time).num_seconds() as u64
        } else {
            // Target is tomorrow
            let until_midnight = (24 * 3600) - now_time.num_seconds_from_midnight() as u64;
            let from_midnight = target_time.num_seconds_from_midnight() as u64;
            until_midnight + from_midnight
        };

        Duration::from_secs(duration_secs)
    }

    /// Start the daily re-check loop. Settings are re-read on every
    /// iteration, so schedule changes apply without a restart.
    pub fn start(self) {
        tauri::async_runtime::spawn(async move {
            info!("Price re-check scheduler started");

            loop {
                let state = self.app_handle.state::<AppState>();
                let settings = match state.sqlite.get_settings() {
                    Ok(settings) => settings,
                    Err(e) => {
                        warn!("Scheduler could not read settings: {}", e);
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        continue;
                    }
                };

                if !settings.price_check_enabled {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    continue;
                }

                let tz: Tz = settings
                    .price_check_timezone
                    .parse()
                    .unwrap_or(chrono_tz::UTC);
                let duration = Self::duration_until(
                    settings.price_check_hour,
                    settings.price_check_minute,
                    &tz,
                );
                info!(
                    "Next price re-check in {} hours {} minutes",
                    duration.as_secs() / 3600,
                    (duration.as_secs() % 3600) / 60
                );
                tokio::time::sleep(duration).await;

                // The toggle may have flipped while we slept
                match state.sqlite.get_settings() {
                    Ok(settings) if settings.price_check_enabled => {
                        match recheck_all(&state).await {
                            Ok(summary) => {
                                if let Err(e) = self.app_handle.emit("price_check_complete", &summary)
                                {
                                    warn!("Failed to emit price_check_complete: {}", e);
                                }
                            }
                            Err(e) => warn!("Scheduled price re-check failed: {}", e),
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Scheduler could not re-read settings: {}", e),
                }
            }
        });
    }
}
