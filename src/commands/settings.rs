//! Settings management commands

use crate::db::sqlite::models::Settings;
use crate::error::Result;
use crate::state::AppState;
use serde::Deserialize;
use tauri::State;

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub discrepancy_threshold_pct: Option<f64>,
    pub price_check_enabled: Option<bool>,
    pub price_check_hour: Option<u32>,
    pub price_check_minute: Option<u32>,
    pub price_check_timezone: Option<String>,
    pub sync_poll_interval_secs: Option<u64>,
}

/// Get current settings
#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> Result<Settings> {
    state.sqlite.get_settings()
}

/// Update settings; absent fields keep their current value
#[tauri::command]
pub async fn update_settings(
    state: State<'_, AppState>,
    request: UpdateSettingsRequest,
) -> Result<Settings> {
    tracing::info!("Updating settings");

    state.sqlite.update_settings(
        request.discrepancy_threshold_pct,
        request.price_check_enabled,
        request.price_check_hour,
        request.price_check_minute,
        request.price_check_timezone,
        request.sync_poll_interval_secs,
    )
}
