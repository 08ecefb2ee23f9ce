//! Commerce platform adapters
//!
//! The product catalog is owned by an external commerce platform; this
//! module defines the contract the sync pipeline needs from it and the
//! Shopify implementation. Everything else in the crate depends only on
//! the trait.

pub mod shopify;

use crate::error::Result;
use async_trait::async_trait;

/// One catalog product as reported by the platform
#[derive(Debug, Clone)]
pub struct PlatformProduct {
    pub sku: String,
    pub title: String,
    pub price: f64,
    pub cost: Option<f64>,
    pub status: String,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
}

/// Commerce platform contract
#[async_trait]
pub trait CommercePlatform: Send + Sync {
    /// Platform ID (e.g., "shopify")
    fn id(&self) -> &'static str;

    /// Cheap credential check used when connecting a store
    async fn verify_credentials(&self) -> Result<()>;

    /// Total product count, used for sync progress estimation
    async fn count_products(&self) -> Result<usize>;

    /// Fetch one page of products. `cursor` is the opaque continuation
    /// token from the previous page; `None` starts from the beginning.
    /// Returns the page and the next cursor, if any.
    async fn fetch_products_page(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<PlatformProduct>, Option<String>)>;
}
