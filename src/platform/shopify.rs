//! Shopify Admin REST client
//!
//! Thin adapter over the endpoints the catalog sync needs. Variants are
//! flattened to one catalog product per SKU; variants without a SKU are
//! skipped since the reconciliation pipeline joins on SKU.

use crate::error::{AppError, Result};
use crate::platform::{CommercePlatform, PlatformProduct};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const API_VERSION: &str = "2024-01";
const DEFAULT_PAGE_SIZE: usize = 50;

pub struct ShopifyPlatform {
    client: reqwest::Client,
    shop_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    products: Vec<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
struct ShopifyProduct {
    id: i64,
    title: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Deserialize)]
struct ShopifyVariant {
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

impl ShopifyPlatform {
    pub fn new(shop_url: &str, access_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            shop_url: shop_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/admin/api/{}/{}", self.shop_url, API_VERSION, resource)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header("X-Shopify-Access-Token", &self.access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Platform(format!(
                "Shopify returned {} for {}",
                status, url
            )));
        }

        Ok(response.json::<T>().await?)
    }

    fn flatten(product: ShopifyProduct) -> Vec<PlatformProduct> {
        let status = product.status.unwrap_or_else(|| "active".to_string());
        product
            .variants
            .into_iter()
            .filter_map(|variant| {
                let sku = variant.sku.filter(|s| !s.is_empty())?;
                let price = variant
                    .price
                    .as_deref()
                    .and_then(|p| p.parse::<f64>().ok())
                    .unwrap_or(0.0);
                Some(PlatformProduct {
                    sku,
                    title: product.title.clone(),
                    price,
                    cost: None,
                    status: status.clone(),
                    vendor: product.vendor.clone(),
                    product_type: product.product_type.clone(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl CommercePlatform for ShopifyPlatform {
    fn id(&self) -> &'static str {
        "shopify"
    }

    async fn verify_credentials(&self) -> Result<()> {
        let _count: CountResponse = self.get_json(&self.endpoint("products/count.json")).await?;
        Ok(())
    }

    async fn count_products(&self) -> Result<usize> {
        let response: CountResponse = self.get_json(&self.endpoint("products/count.json")).await?;
        Ok(response.count)
    }

    async fn fetch_products_page(
        &self,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<(Vec<PlatformProduct>, Option<String>)> {
        let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit };

        // since_id paging: the cursor is the last Shopify product id seen
        let mut url = format!("{}?limit={}", self.endpoint("products.json"), limit);
        if let Some(since_id) = &cursor {
            url.push_str(&format!("&since_id={}", urlencoding::encode(since_id)));
        }

        let response: ProductsResponse = self.get_json(&url).await?;

        let next_cursor = if response.products.len() < limit {
            None
        } else {
            response.products.last().map(|p| p.id.to_string())
        };

        let products = response
            .products
            .into_iter()
            .flat_map(Self::flatten)
            .collect();

        Ok((products, next_cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_skips_variants_without_sku() {
        let product = ShopifyProduct {
            id: 1,
            title: "Widget".to_string(),
            status: Some("active".to_string()),
            vendor: Some("Acme".to_string()),
            product_type: None,
            variants: vec![
                ShopifyVariant {
                    sku: Some("W-1".to_string()),
                    price: Some("19.99".to_string()),
                },
                ShopifyVariant {
                    sku: None,
                    price: Some("9.99".to_string()),
                },
                ShopifyVariant {
                    sku: Some(String::new()),
                    price: None,
                },
            ],
        };

        let flattened = ShopifyPlatform::flatten(product);
        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened[0].sku, "W-1");
        assert_eq!(flattened[0].price, 19.99);
        assert_eq!(flattened[0].vendor.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let platform = ShopifyPlatform::new("https://shop.test/", "token").unwrap();
        assert_eq!(
            platform.endpoint("products/count.json"),
            format!("https://shop.test/admin/api/{}/products/count.json", API_VERSION)
        );
    }
}
