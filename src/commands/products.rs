//! Catalog browse and price-check commands

use crate::db::sqlite::models::{PriceHistoryEntry, Product};
use crate::error::{AppError, Result};
use crate::scheduler::{self, RecheckSummary};
use crate::state::AppState;
use tauri::State;

const DEFAULT_SEARCH_LIMIT: usize = 50;
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Full catalog listing
#[tauri::command]
pub async fn list_products(state: State<'_, AppState>) -> Result<Vec<Product>> {
    state.sqlite.list_products()
}

/// Search products by SKU or title substring
#[tauri::command]
pub async fn search_products(
    state: State<'_, AppState>,
    query: String,
    limit: Option<usize>,
) -> Result<Vec<Product>> {
    state
        .sqlite
        .search_products(&query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
}

/// Get one product
#[tauri::command]
pub async fn get_product(state: State<'_, AppState>, id: i64) -> Result<Product> {
    state
        .sqlite
        .get_product(id)?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", id)))
}

/// Price snapshots for one product, newest first
#[tauri::command]
pub async fn get_price_history(
    state: State<'_, AppState>,
    product_id: i64,
    limit: Option<usize>,
) -> Result<Vec<PriceHistoryEntry>> {
    state
        .sqlite
        .price_history_for_product(product_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
}

/// Re-fetch the supplier price for one product
#[tauri::command]
pub async fn rescrape_product(state: State<'_, AppState>, product_id: i64) -> Result<Product> {
    tracing::info!("Re-scraping product {}", product_id);
    scheduler::rescrape_product(&state, product_id).await
}

/// Re-check every product with a supplier URL
#[tauri::command]
pub async fn recheck_all(state: State<'_, AppState>) -> Result<RecheckSummary> {
    tracing::info!("Manual price re-check requested");
    scheduler::recheck_all(&state).await
}
