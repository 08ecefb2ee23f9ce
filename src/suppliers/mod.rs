//! Supplier price sources
//!
//! The reconciliation pipeline never scrapes pages itself; it asks a
//! `PriceSource` for the price advertised at a supplier origin URL. The
//! generic HTTP source covers suppliers without a dedicated adapter;
//! per-host adapters can be registered on top of it.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Price source contract all supplier adapters implement
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source ID (e.g., "http")
    fn id(&self) -> &'static str;

    /// Fetch the price advertised on a supplier product page.
    /// `Ok(None)` means the page loaded but no price could be extracted.
    async fn fetch_price(&self, url: &str) -> Result<Option<f64>>;
}

/// Registry resolving origin URLs to price sources
pub struct SupplierRegistry {
    by_host: HashMap<String, Arc<dyn PriceSource>>,
    default: Arc<dyn PriceSource>,
}

impl SupplierRegistry {
    /// Create the registry with the generic HTTP source as fallback
    pub fn new() -> Result<Self> {
        Ok(Self {
            by_host: HashMap::new(),
            default: Arc::new(HttpPriceSource::new()?),
        })
    }

    /// Registry with a caller-supplied default source (tests)
    pub fn with_default(source: Arc<dyn PriceSource>) -> Self {
        Self {
            by_host: HashMap::new(),
            default: source,
        }
    }

    /// Register a dedicated adapter for one supplier host
    pub fn register_host(&mut self, host: &str, source: Arc<dyn PriceSource>) {
        self.by_host.insert(host.to_string(), source);
    }

    /// Resolve the source for an origin URL, validating the URL first
    pub fn resolve(&self, origin_url: &str) -> Result<Arc<dyn PriceSource>> {
        let parsed = Url::parse(origin_url)
            .map_err(|e| AppError::Scrape(format!("Invalid origin URL '{}': {}", origin_url, e)))?;

        let source = parsed
            .host_str()
            .and_then(|host| self.by_host.get(host))
            .unwrap_or(&self.default);
        Ok(Arc::clone(source))
    }
}

/// Generic HTTP price source: fetches the page and extracts the first
/// recognizable price from common markup patterns
pub struct HttpPriceSource {
    client: reqwest::Client,
    patterns: Vec<Regex>,
}

impl HttpPriceSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("PriceSync Desktop")
            .build()?;

        let patterns = [
            // JSON-LD / embedded product data
            r#""price"\s*[:=]\s*"?\$?([0-9][0-9,]*\.?[0-9]*)"#,
            // Microdata price annotation
            r#"itemprop="price"[^>]*content="([0-9][0-9,]*\.?[0-9]*)""#,
            // Visible dollar amount
            r"\$\s*([0-9][0-9,]*(?:\.[0-9]{1,2})?)",
        ]
        .iter()
        .map(|p| Regex::new(p).map_err(|e| AppError::Internal(e.to_string())))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self { client, patterns })
    }

    /// Extract the first recognizable price from page text
    fn extract_price(&self, body: &str) -> Option<f64> {
        for pattern in &self.patterns {
            if let Some(captures) = pattern.captures(body) {
                let raw = captures.get(1)?.as_str().replace(',', "");
                if let Ok(price) = raw.parse::<f64>() {
                    return Some(price);
                }
            }
        }
        None
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn fetch_price(&self, url: &str) -> Result<Option<f64>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Scrape(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Scrape(format!(
                "Supplier page {} returned {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Scrape(format!("Failed to read {}: {}", url, e)))?;

        Ok(self.extract_price(&body))
    }
}

/// Scripted price source for tests: maps URL to a fixed outcome
#[cfg(test)]
pub struct MockPriceSource {
    prices: parking_lot::RwLock<HashMap<String, f64>>,
    failing: parking_lot::RwLock<std::collections::HashSet<String>>,
}

#[cfg(test)]
impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            prices: parking_lot::RwLock::new(HashMap::new()),
            failing: parking_lot::RwLock::new(std::collections::HashSet::new()),
        }
    }

    pub fn set_price(&self, url: &str, price: f64) {
        self.prices.write().insert(url.to_string(), price);
    }

    pub fn fail_url(&self, url: &str) {
        self.failing.write().insert(url.to_string());
    }
}

#[cfg(test)]
#[async_trait]
impl PriceSource for MockPriceSource {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn fetch_price(&self, url: &str) -> Result<Option<f64>> {
        if self.failing.read().contains(url) {
            return Err(AppError::Scrape(format!("mock failure for {}", url)));
        }
        Ok(self.prices.read().get(url).copied())
    }
}
