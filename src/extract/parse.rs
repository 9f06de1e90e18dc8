//! Coercing freeform model output into fixed-schema records.
//!
//! Vision models are asked for a bare JSON array but routinely wrap it in
//! prose, a ```json fence, or return a single object instead. The
//! extraction step is unreliable by nature, so parsing is a fallback
//! ladder: each pattern is tried in turn and the first candidate that
//! parses wins. Only when every pattern fails is the response treated as
//! malformed.

use crate::extract::fields::{is_currency_field, EXTRACTION_FIELDS, SENTINEL};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// One extracted record: field name → string value.
pub type FieldMap = Map<String, Value>;

// Ordered fallback patterns; a JSON array match is preferred over fenced
// blocks, which are preferred over a lone object.
static JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*?\]").expect("array pattern"));
static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").expect("fenced-json pattern"));
static FENCED_ANY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").expect("fenced pattern"));
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*?\}").expect("object pattern"));

/// Pull a JSON record array out of arbitrary model text.
///
/// Tries, in order: a bare JSON array, a ```json fenced block, any fenced
/// block, a bare JSON object (wrapped into a one-element array). Returns
/// `None` when no pattern yields valid JSON — the caller's
/// MalformedOutput case.
pub fn coerce_records(text: &str) -> Option<Vec<Value>> {
    for candidate in JSON_ARRAY.find_iter(text) {
        if let Some(records) = parse_candidate(candidate.as_str()) {
            return Some(records);
        }
    }
    for caps in FENCED_JSON.captures_iter(text) {
        if let Some(records) = caps.get(1).and_then(|m| parse_candidate(m.as_str())) {
            return Some(records);
        }
    }
    for caps in FENCED_ANY.captures_iter(text) {
        if let Some(records) = caps.get(1).and_then(|m| parse_candidate(m.as_str())) {
            return Some(records);
        }
    }
    for candidate in JSON_OBJECT.find_iter(text) {
        if let Some(records) = parse_candidate(candidate.as_str()) {
            return Some(records);
        }
    }
    None
}

fn parse_candidate(raw: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(raw.trim()).ok()? {
        Value::Array(items) => Some(items),
        obj @ Value::Object(_) => Some(vec![obj]),
        _ => None,
    }
}

/// Drop non-object items and fill missing fields with the sentinel.
///
/// A missing field is data, not an error: the redacted regions are
/// *expected* to come back empty, and partial tables are common.
pub fn validate_records(records: Vec<Value>) -> Vec<FieldMap> {
    records
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(mut map) => {
                for field in EXTRACTION_FIELDS {
                    map.entry(field.to_string())
                        .or_insert_with(|| Value::String(SENTINEL.to_string()));
                }
                Some(map)
            }
            _ => None,
        })
        .collect()
}

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d]").expect("digit pattern"));

/// Normalise an amount-valued string to digits only.
///
/// `"1,234원"` → `"1234"`; empty, `"없음"`, and `"N/A"` → `"0"`; anything
/// left with no digits → `"0"`.
pub fn clean_currency(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "없음" || trimmed == SENTINEL {
        return "0".to_string();
    }
    let digits = NON_DIGITS.replace_all(trimmed, "");
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits.into_owned()
    }
}

/// Render a JSON value as a flat cell string.
fn cell_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => SENTINEL.to_string(),
        other => other.to_string(),
    }
}

/// Build one spreadsheet row per record:
/// `[file_stem, row_number, ...fields in declared order]`.
///
/// Newlines inside values are flattened to spaces and currency fields are
/// normalised; everything else is passed through as-is.
pub fn build_rows(file_stem: &str, records: &[FieldMap]) -> Vec<Vec<String>> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut row = Vec::with_capacity(EXTRACTION_FIELDS.len() + 2);
            row.push(file_stem.to_string());
            row.push((i + 1).to_string());
            for field in EXTRACTION_FIELDS {
                let raw = record
                    .get(*field)
                    .map(cell_value)
                    .unwrap_or_else(|| SENTINEL.to_string());
                let flat = raw.replace(['\n', '\r'], " ");
                if is_currency_field(field) {
                    row.push(clean_currency(&flat));
                } else {
                    row.push(flat);
                }
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_parses() {
        let records = coerce_records(r#"[{"성명": ""}, {"성명": "x"}]"#).expect("parse");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn array_wrapped_in_prose_parses() {
        let text = "Here is the extracted data:\n[{\"상호\": \"가게\"}]\nLet me know if you need more.";
        let records = coerce_records(text).expect("parse");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn fenced_json_block_parses() {
        let text = "```json\n[{\"상호\": \"가게\"}]\n```";
        let records = coerce_records(text).expect("parse");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn plain_fenced_block_parses() {
        let text = "```\n[{\"상호\": \"가게\"}]\n```";
        assert!(coerce_records(text).is_some());
    }

    #[test]
    fn lone_object_becomes_single_record() {
        let records = coerce_records(r#"{"상호": "가게"}"#).expect("parse");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn prose_without_json_is_none() {
        assert!(coerce_records("I could not read this document, sorry.").is_none());
        assert!(coerce_records("").is_none());
    }

    #[test]
    fn validate_fills_missing_fields_with_sentinel() {
        let records = vec![serde_json::json!({"성명": "", "상호": "가게"})];
        let validated = validate_records(records);
        assert_eq!(validated.len(), 1);
        assert_eq!(
            validated[0].get("수입금액").and_then(Value::as_str),
            Some(SENTINEL)
        );
        assert_eq!(validated[0].get("상호").and_then(Value::as_str), Some("가게"));
        assert_eq!(validated[0].len(), EXTRACTION_FIELDS.len());
    }

    #[test]
    fn validate_drops_non_objects() {
        let records = vec![
            serde_json::json!("just a string"),
            serde_json::json!({"성명": "x"}),
            serde_json::json!(42),
        ];
        assert_eq!(validate_records(records).len(), 1);
    }

    #[test]
    fn currency_strips_non_digits() {
        assert_eq!(clean_currency("1,234원"), "1234");
        assert_eq!(clean_currency("₩ 5,000,000"), "5000000");
        assert_eq!(clean_currency("1234"), "1234");
    }

    #[test]
    fn currency_none_markers_become_zero() {
        assert_eq!(clean_currency(""), "0");
        assert_eq!(clean_currency("  "), "0");
        assert_eq!(clean_currency("없음"), "0");
        assert_eq!(clean_currency("N/A"), "0");
        assert_eq!(clean_currency("원"), "0");
    }

    #[test]
    fn rows_carry_provenance_and_declared_order() {
        let validated = validate_records(vec![
            serde_json::json!({"수입금액": "1,234원", "상호": "첫째"}),
            serde_json::json!({"수입금액": "", "상호": "둘째"}),
        ]);
        let rows = build_rows("ABCD-2024", &validated);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "ABCD-2024");
        assert_eq!(rows[0][1], "1");
        assert_eq!(rows[1][1], "2");
        assert_eq!(rows[0].len(), EXTRACTION_FIELDS.len() + 2);

        let income_col = 2 + EXTRACTION_FIELDS
            .iter()
            .position(|f| *f == "수입금액")
            .expect("declared");
        assert_eq!(rows[0][income_col], "1234");
        assert_eq!(rows[1][income_col], "0");
    }

    #[test]
    fn rows_flatten_newlines() {
        let validated = validate_records(vec![serde_json::json!({"상호": "가\n게"})]);
        let rows = build_rows("f", &validated);
        let shop_col = 2 + EXTRACTION_FIELDS
            .iter()
            .position(|f| *f == "상호")
            .expect("declared");
        assert_eq!(rows[0][shop_col], "가 게");
    }

    #[test]
    fn missing_field_maps_to_sentinel_not_error() {
        // Skip validate_records to simulate a record missing a field
        // entirely at row-build time.
        let mut record = FieldMap::new();
        record.insert("성명".into(), Value::String("".into()));
        let rows = build_rows("f", &[record]);
        let type_col = 2 + EXTRACTION_FIELDS
            .iter()
            .position(|f| *f == "안내유형")
            .expect("declared");
        assert_eq!(rows[0][type_col], SENTINEL);
    }
}
