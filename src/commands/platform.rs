//! Commerce platform connection commands

use crate::error::Result;
use crate::platform::shopify::ShopifyPlatform;
use crate::platform::CommercePlatform;
use crate::state::AppState;
use serde::Serialize;
use std::sync::Arc;
use tauri::State;

#[derive(Debug, Serialize)]
pub struct PlatformStatus {
    pub connected: bool,
    pub platform: Option<String>,
    pub shop_url: Option<String>,
}

/// Verify and store platform credentials, then connect. The access
/// token is encrypted at rest; only the shop URL is stored in clear.
#[tauri::command]
pub async fn connect_platform(
    state: State<'_, AppState>,
    shop_url: String,
    access_token: String,
) -> Result<PlatformStatus> {
    tracing::info!("Connecting commerce platform at {}", shop_url);

    let platform = ShopifyPlatform::new(&shop_url, &access_token)?;
    platform.verify_credentials().await?;

    let (token_encrypted, nonce) = state.secrets.encrypt(&access_token)?;
    state
        .sqlite
        .store_platform_credentials(&shop_url, &token_encrypted, &nonce)?;

    state.set_platform(Some(Arc::new(platform)));

    Ok(PlatformStatus {
        connected: true,
        platform: Some("shopify".to_string()),
        shop_url: Some(shop_url),
    })
}

/// Current platform connection state
#[tauri::command]
pub async fn get_platform_status(state: State<'_, AppState>) -> Result<PlatformStatus> {
    let shop_url = state
        .sqlite
        .get_platform_credentials()?
        .map(|(url, _, _)| url);

    match state.get_platform() {
        Some(platform) => Ok(PlatformStatus {
            connected: true,
            platform: Some(platform.id().to_string()),
            shop_url,
        }),
        None => Ok(PlatformStatus {
            connected: false,
            platform: None,
            shop_url,
        }),
    }
}

/// Drop the connection and remove the stored credentials
#[tauri::command]
pub async fn disconnect_platform(state: State<'_, AppState>) -> Result<()> {
    tracing::info!("Disconnecting commerce platform");
    state.sqlite.delete_platform_credentials()?;
    state.set_platform(None);
    Ok(())
}
