//! Services layer
//!
//! Business logic shared between the Tauri IPC commands and the
//! background scheduler. Commands stay thin; everything that touches
//! the catalog goes through a service.
//!
//! # Services
//!
//! - `UploadService` - Upload job lifecycle: create, process, cancel, delete
//! - `CatalogMatcher` - SKU-to-catalog join with last-wins dedup
//! - `DiscrepancyService` - Discrepancy arithmetic, accept/dismiss flows
//! - `SyncService` / `SyncTracker` - Catalog sync runner and progress feed

pub mod catalog_matcher;
pub mod discrepancy;
pub mod sync;
pub mod uploads;

pub use catalog_matcher::{CatalogMatcher, MatchOutcome, MatchedRecord};
pub use discrepancy::{DiscrepancyReport, DiscrepancyService};
pub use sync::{CostLogEntry, LogEntry, SyncPhase, SyncProgress, SyncService, SyncStatus, SyncTracker};
pub use uploads::UploadService;
