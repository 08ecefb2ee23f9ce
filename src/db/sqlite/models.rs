//! SQLite database models

use serde::{Deserialize, Serialize};

/// Catalog product synced from the commerce platform.
///
/// The reconciliation pipeline reads every field but only writes
/// `supplier_url`, `supplier_price`, `has_price_discrepancy`,
/// `last_scraped` and `last_checked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub title: String,
    pub reference_price: f64,
    pub cost_price: Option<f64>,
    pub supplier_url: Option<String>,
    pub supplier_price: Option<f64>,
    pub last_scraped: Option<String>,
    pub last_checked: Option<String>,
    pub has_price_discrepancy: bool,
    pub status: String,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when upserting a product from a catalog sync
#[derive(Debug, Clone)]
pub struct ProductUpsert {
    pub sku: String,
    pub title: String,
    pub reference_price: f64,
    pub cost_price: Option<f64>,
    pub status: String,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
}

/// One observed price snapshot, append-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    pub id: i64,
    pub product_id: i64,
    pub upload_id: Option<i64>,
    pub reference_price: f64,
    pub supplier_price: Option<f64>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// Upload job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
            UploadStatus::Error => "error",
            UploadStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(UploadStatus::Pending),
            "processing" => Some(UploadStatus::Processing),
            "completed" => Some(UploadStatus::Completed),
            "error" => Some(UploadStatus::Error),
            "cancelled" => Some(UploadStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never transition further; deletion is a
    /// destructive operation, not a transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
        )
    }

    /// The single authority on legal lifecycle transitions
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        match self {
            UploadStatus::Pending => matches!(
                next,
                UploadStatus::Processing | UploadStatus::Error | UploadStatus::Cancelled
            ),
            UploadStatus::Processing => matches!(
                next,
                UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
            ),
            _ => false,
        }
    }
}

/// Upload job model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: i64,
    pub filename: String,
    pub file_hash: String,
    pub records_count: i64,
    pub processed_count: i64,
    pub status: UploadStatus,
    pub message: Option<String>,
    pub affected_product_ids: Vec<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Settings model (singleton row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: i64,
    /// Minimum absolute percentage difference before a supplier price
    /// counts as a discrepancy. 0.0 flags any non-zero difference.
    pub discrepancy_threshold_pct: f64,
    pub price_check_enabled: bool,
    pub price_check_hour: u32,
    pub price_check_minute: u32,
    pub price_check_timezone: String,
    pub sync_poll_interval_secs: u64,
    pub updated_at: String,
}
