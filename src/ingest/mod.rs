//! Supplier price list ingestion
//!
//! Turns raw CSV bytes into normalized records and applies the upload
//! validation rules before anything touches the catalog.

pub mod tokenizer;
pub mod validator;

pub use tokenizer::{parse_csv, parse_csv_document, CsvRecord, ParsedCsv};
pub use validator::{has_csv_extension, validate_upload, ValidationVerdict};
