//! Upload lifecycle commands

use crate::db::sqlite::models::UploadJob;
use crate::error::{AppError, Result};
use crate::ingest::{self, ValidationVerdict};
use crate::services::UploadService;
use crate::state::AppState;
use serde::Deserialize;
use tauri::{AppHandle, Emitter, Manager, State};

/// One file handed over by the frontend
#[derive(Debug, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    pub content: String,
}

/// Pre-flight a file without creating a job
#[tauri::command]
pub async fn validate_csv(filename: String, content: String) -> Result<ValidationVerdict> {
    Ok(ingest::validate_upload(&filename, &content))
}

/// Validate the files, create their jobs and spawn processing for each.
/// Returns the jobs in `Pending`; progress is polled via `get_upload`.
#[tauri::command]
pub async fn upload_csv(
    app: AppHandle,
    state: State<'_, AppState>,
    files: Vec<UploadFile>,
) -> Result<Vec<UploadJob>> {
    let mut jobs = Vec::with_capacity(files.len());

    for file in files {
        let job = UploadService::create_upload(&state, &file.filename, &file.content)?;
        let job_id = job.id;
        let app = app.clone();

        tauri::async_runtime::spawn(async move {
            let state = app.state::<AppState>();
            if let Err(e) = UploadService::process_upload(&state, job_id, &file.content).await {
                tracing::error!("Upload {} failed: {}", job_id, e);
            }
            if let Err(e) = app.emit("upload_finished", job_id) {
                tracing::warn!("Failed to emit upload_finished: {}", e);
            }
        });

        jobs.push(job);
    }

    Ok(jobs)
}

/// List all upload jobs, newest first
#[tauri::command]
pub async fn list_uploads(state: State<'_, AppState>) -> Result<Vec<UploadJob>> {
    state.sqlite.list_uploads()
}

/// Get one upload job
#[tauri::command]
pub async fn get_upload(state: State<'_, AppState>, id: i64) -> Result<UploadJob> {
    state
        .sqlite
        .get_upload(id)?
        .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))
}

/// Cancel an upload job; terminal jobs are a no-op
#[tauri::command]
pub async fn cancel_upload(state: State<'_, AppState>, id: i64) -> Result<UploadJob> {
    tracing::info!("Cancelling upload {}", id);
    UploadService::cancel_upload(&state, id)
}

/// Delete an upload job and roll back everything it wrote
#[tauri::command]
pub async fn delete_upload(state: State<'_, AppState>, id: i64) -> Result<Vec<i64>> {
    tracing::info!("Deleting upload {}", id);
    UploadService::delete_upload(&state, id).await
}
