//! The fixed extraction schema for tax-guidance notices.
//!
//! Field names are the spreadsheet's Korean column headers, in declared
//! order — every extracted record is coerced onto exactly this set, and
//! every output row lays values out in exactly this order after the
//! `[filename, row-number]` prefix. Keeping the declaration here, in one
//! place, is what lets the sink, the parser, and the tests agree.

/// Placeholder written wherever a field's true value is unknown or absent.
pub const SENTINEL: &str = "N/A";

/// Every field a record carries, in spreadsheet column order.
pub const EXTRACTION_FIELDS: &[&str] = &[
    "성명",
    "생년월일",
    "안내유형",
    "기장의무",
    "추계시 적용경비율",
    "소득종류",
    "이자",
    "배당",
    "근로-단일",
    "근로-복수",
    "연금",
    "기타",
    "종교인 기타소득유무",
    "중간예납세액",
    "원천징수세액",
    "국민연금보험료",
    "개인연금저축",
    "소기업소상공인공제부금 (노란우산공제)",
    "퇴직연금세액공제",
    "연금계좌세액공제",
    "사업자 등록번호",
    "상호",
    "수입금액 구분코드",
    "업종 코드",
    "사업 형태",
    "기장 의무",
    "경비율",
    "수입금액",
    "일반",
    "자가",
    "일반(기본)",
    "자가(초과)",
];

/// Fields whose values are amounts: normalised to digit-only strings on
/// output (`"1,234원"` → `"1234"`, blank/none markers → `"0"`).
pub const CURRENCY_FIELDS: &[&str] = &[
    "중간예납세액",
    "원천징수세액",
    "국민연금보험료",
    "개인연금저축",
    "소기업소상공인공제부금 (노란우산공제)",
    "퇴직연금세액공제",
    "연금계좌세액공제",
    "수입금액",
];

/// Is this field amount-valued?
pub fn is_currency_field(field: &str) -> bool {
    CURRENCY_FIELDS.contains(&field)
}

/// Spreadsheet header row: file name, row number, then every field.
pub fn header_row() -> Vec<String> {
    let mut row = Vec::with_capacity(EXTRACTION_FIELDS.len() + 2);
    row.push("파일이름".to_string());
    row.push("행번호".to_string());
    row.extend(EXTRACTION_FIELDS.iter().map(|f| f.to_string()));
    row
}
