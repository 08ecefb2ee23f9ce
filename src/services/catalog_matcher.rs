//! SKU-to-catalog matcher
//!
//! Joins supplier records onto the catalog by exact, case-sensitive SKU.
//! Records keep their file order; a SKU appearing twice yields two
//! matched records against the same catalog entry, so the later row
//! overwrites the earlier one during processing. The matcher only
//! annotates existing catalog entries; an unknown SKU is reported,
//! never created.

use crate::ingest::CsvRecord;
use crate::state::AppState;

/// One supplier record joined to its catalog entry
#[derive(Debug, Clone)]
pub struct MatchedRecord {
    pub product_id: i64,
    pub record: CsvRecord,
}

/// Result of matching one upload's records against the catalog
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Vec<MatchedRecord>,
    pub unmatched_skus: Vec<String>,
}

impl MatchOutcome {
    pub fn total(&self) -> usize {
        self.matched.len() + self.unmatched_skus.len()
    }
}

pub struct CatalogMatcher;

impl CatalogMatcher {
    /// Match records onto the catalog in file order. Lookups go through
    /// the SKU cache with a database fallback for entries created since
    /// the last cache reload.
    pub fn match_records(state: &AppState, records: &[CsvRecord]) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        for record in records {
            let product_id = match state.product_id_for_sku(&record.sku) {
                Some(id) => Some(id),
                None => match state.sqlite.get_product_by_sku(&record.sku) {
                    Ok(Some(product)) => {
                        state.cache_sku(&record.sku, product.id);
                        Some(product.id)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!("SKU lookup failed for {}: {}", record.sku, e);
                        None
                    }
                },
            };

            match product_id {
                Some(product_id) => outcome.matched.push(MatchedRecord {
                    product_id,
                    record: record.clone(),
                }),
                None => outcome.unmatched_skus.push(record.sku.clone()),
            }
        }

        outcome
    }
}
