//! Discrepancy review commands

use crate::db::sqlite::models::Product;
use crate::error::Result;
use crate::services::{DiscrepancyReport, DiscrepancyService};
use crate::state::AppState;
use tauri::State;

/// All currently flagged products with computed differences
#[tauri::command]
pub async fn list_discrepancies(state: State<'_, AppState>) -> Result<Vec<DiscrepancyReport>> {
    DiscrepancyService::list_discrepancies(&state)
}

/// Dismiss the flag on one product; a later observation may re-flag it
#[tauri::command]
pub async fn clear_discrepancy(state: State<'_, AppState>, product_id: i64) -> Result<bool> {
    tracing::info!("Dismissing discrepancy on product {}", product_id);
    DiscrepancyService::dismiss(&state, product_id)
}

/// Dismiss every flag, returns the number cleared
#[tauri::command]
pub async fn clear_all_discrepancies(state: State<'_, AppState>) -> Result<usize> {
    DiscrepancyService::dismiss_all(&state)
}

/// Set a new reference price and clear the flag
#[tauri::command]
pub async fn update_price(
    state: State<'_, AppState>,
    product_id: i64,
    new_price: f64,
) -> Result<Product> {
    DiscrepancyService::update_price(&state, product_id, new_price)
}

/// Accept the supplier price as the new reference price
#[tauri::command]
pub async fn accept_supplier_price(
    state: State<'_, AppState>,
    product_id: i64,
) -> Result<Product> {
    DiscrepancyService::accept_supplier_price(&state, product_id)
}
