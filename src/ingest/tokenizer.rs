//! CSV tokenizer and record normalizer
//!
//! Supplier price lists arrive as loosely formatted CSV exports. The
//! tokenizer honors double-quote enclosure (`""` escapes a literal quote
//! inside a quoted field; the delimiter only separates fields outside
//! quoted mode) and maps header names onto canonical record fields via a
//! static alias table. Parsing is a single deterministic pass with no side
//! effects.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default field delimiter
pub const DEFAULT_DELIMITER: char = ',';

/// Header alias table: header name (case-sensitive) to canonical field.
/// New aliases are additive; unmatched headers land in `extra` verbatim.
const HEADER_ALIASES: &[(&str, &str)] = &[
    ("SKU", "sku"),
    ("sku", "sku"),
    ("Origin URL", "origin_url"),
    ("originUrl", "origin_url"),
    ("url", "origin_url"),
    ("Title", "title"),
    ("title", "title"),
    ("Cost per item", "cost"),
    ("cost", "cost"),
    ("Price", "price"),
    ("price", "price"),
    ("Description", "description"),
    ("description", "description"),
];

/// Resolve a header name to its canonical field, if any
pub fn canonical_field(header: &str) -> Option<&'static str> {
    HEADER_ALIASES
        .iter()
        .find(|(alias, _)| *alias == header)
        .map(|(_, field)| *field)
}

/// One normalized row from a supplier price list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CsvRecord {
    pub sku: String,
    pub origin_url: String,
    pub title: Option<String>,
    pub cost: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    /// Columns with no canonical mapping, preserved verbatim
    pub extra: HashMap<String, String>,
}

impl CsvRecord {
    /// A record is complete iff both SKU and origin URL are present
    pub fn is_complete(&self) -> bool {
        !self.sku.is_empty() && !self.origin_url.is_empty()
    }
}

/// Raw parse result: header columns plus every data row, incomplete
/// rows included. The validator needs this unfiltered view to report
/// accurate counts.
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub columns: Vec<String>,
    pub records: Vec<CsvRecord>,
}

impl ParsedCsv {
    /// Whether any header column maps to the given canonical field
    pub fn has_column(&self, canonical: &str) -> bool {
        self.columns
            .iter()
            .any(|c| canonical_field(c) == Some(canonical))
    }
}

/// Split one line into fields, honoring double-quote enclosure
pub fn tokenize_line(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '"' {
            if in_quotes && chars.peek() == Some(&'"') {
                // Doubled quote inside quoted mode is a literal quote
                current.push('"');
                chars.next();
            } else {
                in_quotes = !in_quotes;
            }
        } else if ch == delimiter && !in_quotes {
            fields.push(current.clone());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current);

    fields
}

/// Parse CSV text into rows without applying the completeness filter.
///
/// The first non-blank line is treated as the header row unless an
/// explicit column list is supplied, in which case every line is data.
pub fn parse_csv_document(
    content: &str,
    delimiter: Option<char>,
    columns: Option<&[String]>,
) -> ParsedCsv {
    let delimiter = delimiter.unwrap_or(DEFAULT_DELIMITER);

    let mut lines = content
        .split(['\r', '\n'])
        .filter(|line| !line.trim().is_empty());

    let header: Vec<String> = match columns {
        Some(cols) => cols.to_vec(),
        None => match lines.next() {
            Some(line) => tokenize_line(line, delimiter)
                .into_iter()
                .map(|f| f.trim().to_string())
                .collect(),
            None => Vec::new(),
        },
    };

    let mut records = Vec::new();
    for line in lines {
        let fields = tokenize_line(line, delimiter);
        records.push(normalize_record(&header, &fields));
    }

    ParsedCsv {
        columns: header,
        records,
    }
}

/// Parse CSV text into the ordered record sequence, dropping rows that
/// are missing a SKU or origin URL. This is a lossy filter, not a
/// validation error; the validator accounts for the loss separately.
pub fn parse_csv(content: &str, delimiter: Option<char>) -> Vec<CsvRecord> {
    parse_csv_document(content, delimiter, None)
        .records
        .into_iter()
        .filter(CsvRecord::is_complete)
        .collect()
}

fn normalize_record(columns: &[String], fields: &[String]) -> CsvRecord {
    let mut record = CsvRecord::default();

    for (i, column) in columns.iter().enumerate() {
        let value = fields.get(i).map(|f| f.trim()).unwrap_or("");
        match canonical_field(column) {
            Some("sku") => record.sku = value.to_string(),
            Some("origin_url") => record.origin_url = value.to_string(),
            Some("title") => record.title = non_empty(value),
            Some("cost") => record.cost = non_empty(value),
            Some("price") => record.price = non_empty(value),
            Some("description") => record.description = non_empty(value),
            _ => {
                record
                    .extra
                    .insert(column.clone(), value.to_string());
            }
        }
    }

    record
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
