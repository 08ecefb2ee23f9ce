//! PriceSync Desktop - Supplier Price Reconciliation
//!
//! A desktop application that reconciles supplier price lists against a
//! commerce-platform product catalog: CSV ingestion, SKU matching,
//! supplier price observation, discrepancy review and catalog sync.

pub mod commands;
pub mod db;
pub mod error;
pub mod ingest;
pub mod platform;
pub mod scheduler;
pub mod security;
pub mod services;
pub mod state;
pub mod suppliers;

use platform::shopify::ShopifyPlatform;
use scheduler::PriceCheckScheduler;
use state::AppState;
use std::sync::Arc;
use tauri::Manager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reconnect the commerce platform from credentials stored in a
/// previous session. Credentials that no longer decrypt are dropped.
fn restore_platform(state: &AppState) {
    let credentials = match state.sqlite.get_platform_credentials() {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("Could not read platform credentials: {}", e);
            return;
        }
    };

    let (shop_url, token_encrypted, nonce) = credentials;
    match state.secrets.decrypt(&token_encrypted, &nonce) {
        Ok(access_token) => match ShopifyPlatform::new(&shop_url, &access_token) {
            Ok(platform) => {
                state.set_platform(Some(Arc::new(platform)));
                tracing::info!("Restored platform connection to {}", shop_url);
            }
            Err(e) => tracing::warn!("Could not restore platform client: {}", e),
        },
        Err(e) => {
            tracing::warn!("Stored platform credentials no longer decrypt: {}", e);
            if let Err(e) = state.sqlite.delete_platform_credentials() {
                tracing::warn!("Could not drop stale credentials: {}", e);
            }
        }
    }
}

/// Initialize and run the Tauri application
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pricesync_desktop=debug,tauri=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting PriceSync Desktop...");

    tauri::Builder::default()
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            // Initialize application state
            let app_state = AppState::new(app.handle())?;
            restore_platform(&app_state);
            app.manage(app_state);

            // Start the daily price re-check scheduler
            let scheduler = PriceCheckScheduler::new(app.handle().clone());
            scheduler.start();

            tracing::info!("Application state initialized");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Upload commands
            commands::uploads::validate_csv,
            commands::uploads::upload_csv,
            commands::uploads::list_uploads,
            commands::uploads::get_upload,
            commands::uploads::cancel_upload,
            commands::uploads::delete_upload,
            // Discrepancy commands
            commands::discrepancies::list_discrepancies,
            commands::discrepancies::clear_discrepancy,
            commands::discrepancies::clear_all_discrepancies,
            commands::discrepancies::update_price,
            commands::discrepancies::accept_supplier_price,
            // Product commands
            commands::products::list_products,
            commands::products::search_products,
            commands::products::get_product,
            commands::products::get_price_history,
            commands::products::rescrape_product,
            commands::products::recheck_all,
            // Sync commands
            commands::sync::start_catalog_sync,
            commands::sync::get_sync_progress,
            commands::sync::get_recent_cost_logs,
            commands::sync::get_recent_logs,
            // Platform commands
            commands::platform::connect_platform,
            commands::platform::get_platform_status,
            commands::platform::disconnect_platform,
            // Settings commands
            commands::settings::get_settings,
            commands::settings::update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
