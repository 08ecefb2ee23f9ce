//! Catalog sync commands

use crate::error::{AppError, Result};
use crate::services::sync::{CostLogEntry, LogEntry, SyncProgress, SyncService};
use crate::state::AppState;
use tauri::{AppHandle, Emitter, Manager, State};

/// Start a catalog sync in the background. Fails when a sync is
/// already active; progress is polled via `get_sync_progress`.
#[tauri::command]
pub async fn start_catalog_sync(app: AppHandle, state: State<'_, AppState>) -> Result<()> {
    if state.get_platform().is_none() {
        return Err(AppError::Platform(
            "No commerce platform connected".to_string(),
        ));
    }
    if state.sync.is_active() {
        return Err(AppError::Validation(
            "A catalog sync is already running".to_string(),
        ));
    }

    tracing::info!("Starting catalog sync");
    tauri::async_runtime::spawn(async move {
        let state = app.state::<AppState>();
        match SyncService::run_catalog_sync(&state).await {
            Ok(count) => {
                if let Err(e) = app.emit("catalog_sync_complete", count) {
                    tracing::warn!("Failed to emit catalog_sync_complete: {}", e);
                }
            }
            Err(e) => tracing::error!("Catalog sync failed: {}", e),
        }
    });

    Ok(())
}

/// Snapshot of the active (or last) sync
#[tauri::command]
pub async fn get_sync_progress(state: State<'_, AppState>) -> Result<SyncProgress> {
    Ok(state.sync.snapshot())
}

/// Deduplicated cost-price feed, newest first
#[tauri::command]
pub async fn get_recent_cost_logs(state: State<'_, AppState>) -> Result<Vec<CostLogEntry>> {
    Ok(state.sync.recent_cost_logs())
}

/// Recent raw log entries for one source
#[tauri::command]
pub async fn get_recent_logs(
    state: State<'_, AppState>,
    source: String,
) -> Result<Vec<LogEntry>> {
    match source.as_str() {
        "sync" => Ok(state.sync.recent_entries()),
        other => Err(AppError::NotFound(format!(
            "Unknown log source: {}",
            other
        ))),
    }
}
