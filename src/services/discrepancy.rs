//! Price discrepancy evaluation
//!
//! A discrepancy exists when a supplier price is present and its
//! percentage difference from the reference price exceeds the
//! configured threshold. The flag on a product is a current-state
//! marker, not an event log; dismissing it does not suppress future
//! observations.

use crate::db::sqlite::models::Product;
use crate::error::{AppError, Result};
use crate::state::AppState;
use serde::Serialize;

/// One flagged product with the computed differences, for display
#[derive(Debug, Clone, Serialize)]
pub struct DiscrepancyReport {
    pub product_id: i64,
    pub sku: String,
    pub title: String,
    pub reference_price: f64,
    pub supplier_price: f64,
    pub supplier_url: Option<String>,
    pub absolute_difference: f64,
    /// Signed percentage difference relative to the reference price;
    /// `None` when the reference price is zero.
    pub percentage_difference: Option<f64>,
    pub last_scraped: Option<String>,
}

pub struct DiscrepancyService;

impl DiscrepancyService {
    /// Signed percentage difference of `supplier` relative to
    /// `reference`. Undefined for a zero reference price.
    pub fn percentage_difference(reference: f64, supplier: f64) -> Option<f64> {
        if reference == 0.0 {
            None
        } else {
            Some((supplier - reference) / reference * 100.0)
        }
    }

    /// Whether a supplier observation counts as a discrepancy under the
    /// given threshold. A zero reference price flags any non-zero
    /// supplier price regardless of threshold; a threshold of 0.0 flags
    /// any non-zero difference.
    pub fn is_discrepant(reference: f64, supplier: f64, threshold_pct: f64) -> bool {
        match Self::percentage_difference(reference, supplier) {
            Some(pct) => pct.abs() > threshold_pct,
            None => supplier != 0.0,
        }
    }

    fn report_for(product: &Product) -> Option<DiscrepancyReport> {
        let supplier_price = product.supplier_price?;
        Some(DiscrepancyReport {
            product_id: product.id,
            sku: product.sku.clone(),
            title: product.title.clone(),
            reference_price: product.reference_price,
            supplier_price,
            supplier_url: product.supplier_url.clone(),
            absolute_difference: supplier_price - product.reference_price,
            percentage_difference: Self::percentage_difference(
                product.reference_price,
                supplier_price,
            ),
            last_scraped: product.last_scraped.clone(),
        })
    }

    /// All currently flagged products with computed differences
    pub fn list_discrepancies(state: &AppState) -> Result<Vec<DiscrepancyReport>> {
        let flagged = state.sqlite.list_flagged_products()?;
        Ok(flagged.iter().filter_map(Self::report_for).collect())
    }

    /// Accept the supplier price as the new reference price. Clears the
    /// flag and records the change in price history.
    pub fn accept_supplier_price(state: &AppState, product_id: i64) -> Result<Product> {
        let product = state
            .sqlite
            .get_product(product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

        let supplier_price = product.supplier_price.ok_or_else(|| {
            AppError::Validation(format!(
                "Product {} has no supplier price to accept",
                product.sku
            ))
        })?;

        state
            .sqlite
            .update_reference_price(product_id, supplier_price)?;
        state.sqlite.append_price_history(
            product_id,
            None,
            supplier_price,
            Some(supplier_price),
            Some("Reference price updated to supplier price"),
        )?;

        tracing::info!(
            "Accepted supplier price {} for product {}",
            supplier_price,
            product.sku
        );
        state
            .sqlite
            .get_product(product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Set a new reference price directly. Clears the flag and records
    /// the change in price history.
    pub fn update_price(state: &AppState, product_id: i64, new_price: f64) -> Result<Product> {
        if new_price < 0.0 {
            return Err(AppError::Validation(format!(
                "Reference price cannot be negative: {}",
                new_price
            )));
        }
        let product = state
            .sqlite
            .get_product(product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

        state.sqlite.update_reference_price(product_id, new_price)?;
        state.sqlite.append_price_history(
            product_id,
            None,
            new_price,
            product.supplier_price,
            Some("Reference price updated"),
        )?;

        tracing::info!("Updated reference price for {} to {}", product.sku, new_price);
        state
            .sqlite
            .get_product(product_id)?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Dismiss the flag on one product without touching prices. Returns
    /// false when the product was not flagged.
    pub fn dismiss(state: &AppState, product_id: i64) -> Result<bool> {
        if state.sqlite.get_product(product_id)?.is_none() {
            return Err(AppError::NotFound(format!("Product {} not found", product_id)));
        }
        state.sqlite.clear_discrepancy(product_id)
    }

    /// Dismiss every flag, returns the number cleared
    pub fn dismiss_all(state: &AppState) -> Result<usize> {
        let cleared = state.sqlite.clear_all_discrepancies()?;
        tracing::info!("Dismissed {} discrepancies", cleared);
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::models::ProductUpsert;
    use crate::suppliers::MockPriceSource;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new_for_testing(Arc::new(MockPriceSource::new())).unwrap()
    }

    fn seed_product(state: &AppState, sku: &str, price: f64) -> i64 {
        state
            .sqlite
            .upsert_product(&ProductUpsert {
                sku: sku.to_string(),
                title: format!("Product {}", sku),
                reference_price: price,
                cost_price: None,
                status: "active".to_string(),
                vendor: None,
                product_type: None,
            })
            .unwrap()
    }

    #[test]
    fn test_percentage_difference_signed() {
        assert_eq!(
            DiscrepancyService::percentage_difference(100.0, 85.0),
            Some(-15.0)
        );
        assert_eq!(
            DiscrepancyService::percentage_difference(100.0, 115.0),
            Some(15.0)
        );
        assert_eq!(DiscrepancyService::percentage_difference(0.0, 10.0), None);
    }

    #[test]
    fn test_zero_threshold_flags_any_difference() {
        assert!(DiscrepancyService::is_discrepant(100.0, 100.01, 0.0));
        assert!(!DiscrepancyService::is_discrepant(100.0, 100.0, 0.0));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        // Exactly at the threshold is not a discrepancy
        assert!(!DiscrepancyService::is_discrepant(100.0, 115.0, 15.0));
        assert!(DiscrepancyService::is_discrepant(100.0, 115.01, 15.0));
        assert!(!DiscrepancyService::is_discrepant(100.0, 85.0, 15.0));
        assert!(DiscrepancyService::is_discrepant(100.0, 84.99, 15.0));
    }

    #[test]
    fn test_zero_reference_price_flags_nonzero_supplier() {
        assert!(DiscrepancyService::is_discrepant(0.0, 1.0, 50.0));
        assert!(!DiscrepancyService::is_discrepant(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_accept_supplier_price_updates_reference_and_clears_flag() {
        let state = test_state();
        let id = seed_product(&state, "A", 100.0);
        state.sqlite.set_supplier_url(id, "https://s.test/a").unwrap();
        state.sqlite.record_observation(id, 80.0, true).unwrap();

        let product = DiscrepancyService::accept_supplier_price(&state, id).unwrap();
        assert_eq!(product.reference_price, 80.0);
        assert!(!product.has_price_discrepancy);

        let history = state.sqlite.price_history_for_product(id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reference_price, 80.0);
    }

    #[test]
    fn test_accept_without_supplier_price_fails() {
        let state = test_state();
        let id = seed_product(&state, "A", 100.0);
        let err = DiscrepancyService::accept_supplier_price(&state, id).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_dismiss_is_not_sticky() {
        let state = test_state();
        let id = seed_product(&state, "A", 100.0);
        state.sqlite.record_observation(id, 80.0, true).unwrap();

        assert!(DiscrepancyService::dismiss(&state, id).unwrap());
        let product = state.sqlite.get_product(id).unwrap().unwrap();
        assert!(!product.has_price_discrepancy);

        // A later observation re-flags the product
        state.sqlite.record_observation(id, 75.0, true).unwrap();
        let product = state.sqlite.get_product(id).unwrap().unwrap();
        assert!(product.has_price_discrepancy);
    }

    #[test]
    fn test_list_discrepancies_reports_differences() {
        let state = test_state();
        let id = seed_product(&state, "A", 100.0);
        state.sqlite.set_supplier_url(id, "https://s.test/a").unwrap();
        state.sqlite.record_observation(id, 85.0, true).unwrap();

        // An unflagged product is not reported
        seed_product(&state, "B", 50.0);

        let reports = DiscrepancyService::list_discrepancies(&state).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.sku, "A");
        assert_eq!(report.absolute_difference, -15.0);
        assert_eq!(report.percentage_difference, Some(-15.0));
    }
}
