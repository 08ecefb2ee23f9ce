//! Upload validation
//!
//! Structural and business checks applied to a supplier CSV before an
//! upload job is created. The tokenizer silently drops rows missing a SKU
//! or origin URL; the validator re-parses the raw document so the counts
//! it reports stay accurate. Both passes are intentional and must not be
//! unified into one filter.

use crate::ingest::tokenizer::{parse_csv_document, CsvRecord};
use serde::{Deserialize, Serialize};

/// Validation outcome for one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub message: Option<String>,
    pub record_count: Option<usize>,
}

impl ValidationVerdict {
    fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
            record_count: None,
        }
    }
}

/// Whether the filename carries the accepted extension
pub fn has_csv_extension(filename: &str) -> bool {
    filename.to_lowercase().ends_with(".csv")
}

/// Validate an uploaded price list file (name + content)
pub fn validate_upload(filename: &str, content: &str) -> ValidationVerdict {
    if !has_csv_extension(filename) {
        return ValidationVerdict::rejected(format!(
            "'{}' is not a CSV file. Only .csv files are accepted.",
            filename
        ));
    }

    let doc = parse_csv_document(content, None, None);
    let total_records = doc.records.len();

    if total_records == 0 {
        return ValidationVerdict::rejected(
            "The CSV file is empty or contains no valid records.",
        );
    }

    let valid_records = doc
        .records
        .iter()
        .filter(|r| r.is_complete())
        .count();

    if valid_records == 0 {
        let has_sku_column = doc.has_column("sku");
        let has_url_column = doc.has_column("origin_url");
        let any_sku = doc.records.iter().any(|r: &CsvRecord| !r.sku.is_empty());
        let any_url = doc.records.iter().any(|r| !r.origin_url.is_empty());

        let message = if !has_sku_column && !has_url_column {
            "The CSV file must contain both SKU and Origin URL columns."
        } else if !has_sku_column || !any_sku {
            "The CSV file is missing the SKU column."
        } else if !has_url_column || !any_url {
            "The CSV file is missing the Origin URL column."
        } else {
            "No records contain both SKU and Origin URL values."
        };
        return ValidationVerdict::rejected(message);
    }

    if valid_records < total_records {
        let ignored = total_records - valid_records;
        return ValidationVerdict {
            valid: true,
            message: Some(format!(
                "{} of {} rows are missing a SKU or Origin URL and will be ignored.",
                ignored, total_records
            )),
            record_count: Some(valid_records),
        };
    }

    ValidationVerdict {
        valid: true,
        message: None,
        record_count: Some(valid_records),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_csv_extension() {
        let verdict = validate_upload("prices.xlsx", "SKU,Origin URL\nA,https://x.test\n");
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("not a CSV"));
        assert!(verdict.record_count.is_none());
    }

    #[test]
    fn test_extension_check_is_case_insensitive() {
        let verdict = validate_upload("PRICES.CSV", "SKU,Origin URL\nA,https://x.test\n");
        assert!(verdict.valid);
    }

    #[test]
    fn test_rejects_empty_file() {
        let verdict = validate_upload("prices.csv", "");
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("empty"));
    }

    #[test]
    fn test_rejects_header_only_file() {
        let verdict = validate_upload("prices.csv", "SKU,Origin URL\n");
        assert!(!verdict.valid);
    }

    #[test]
    fn test_missing_sku_column() {
        let verdict = validate_upload("prices.csv", "Origin URL\nhttps://x.test/1\n");
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("SKU column"));
    }

    #[test]
    fn test_missing_url_column() {
        let verdict = validate_upload("prices.csv", "SKU\nABC-1\n");
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("Origin URL column"));
    }

    #[test]
    fn test_missing_both_columns() {
        let verdict = validate_upload("prices.csv", "Name,Qty\nWidget,3\n");
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("both SKU and Origin URL"));
    }

    #[test]
    fn test_no_row_with_both_values() {
        let content = "SKU,Origin URL\nABC-1,\n,https://x.test/2\n";
        let verdict = validate_upload("prices.csv", content);
        assert!(!verdict.valid);
        assert!(verdict.message.unwrap().contains("both SKU and Origin URL values"));
    }

    #[test]
    fn test_partial_rows_warn_but_pass() {
        let content = "SKU,Origin URL\nABC-1,https://x.test/1\nABC-2,\nABC-3,https://x.test/3\n";
        let verdict = validate_upload("prices.csv", content);
        assert!(verdict.valid);
        assert_eq!(verdict.record_count, Some(2));
        assert!(verdict.message.unwrap().contains("1 of 3"));
    }

    #[test]
    fn test_clean_file_has_no_message() {
        let content = "SKU,Origin URL\nABC-1,https://x.test/1\n";
        let verdict = validate_upload("prices.csv", content);
        assert!(verdict.valid);
        assert!(verdict.message.is_none());
        assert_eq!(verdict.record_count, Some(1));
    }

    #[test]
    fn test_counting_invariant() {
        // valid <= total, and valid == 0 implies rejected
        let inputs = [
            "",
            "SKU,Origin URL\n",
            "SKU,Origin URL\nA,\n",
            "SKU,Origin URL\nA,https://x.test\nB,\n",
            "SKU,Origin URL\nA,https://x.test\n",
        ];
        for content in inputs {
            let verdict = validate_upload("f.csv", content);
            if let Some(count) = verdict.record_count {
                assert!(verdict.valid);
                assert!(count > 0);
            } else {
                assert!(!verdict.valid);
            }
        }
    }
}
