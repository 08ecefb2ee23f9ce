//! Scheduled background tasks
//!
//! Currently one task: the daily supplier price re-check.

mod price_check;

pub use price_check::{recheck_all, rescrape_product, PriceCheckScheduler, RecheckSummary};
