//! The file-mapping artifact: `file_mapping.json`.
//!
//! One redaction run produces one mapping — an ordered list of
//! `{number, original_name, masked_name}` triples correlating each source
//! document to its renumbered, redacted counterpart. The mapping is the
//! *only* durable record of processing order: redacted outputs carry no
//! trace of their original filename, so losing this file means losing the
//! ability to attribute extracted rows to source documents.
//!
//! The artifact is written once per run, pretty-printed UTF-8, and fully
//! replaces any previous run's mapping (no merge).

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Filename of the mapping artifact inside the target folder.
pub const MAPPING_FILE: &str = "file_mapping.json";

/// One source document's slot in the processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// 1-based processing order; dense within one run.
    pub number: u32,
    /// Original source filename, e.g. `"ABCD-2024.pdf"`.
    pub original_name: String,
    /// Redacted output filename, always `"{number}.pdf"`.
    pub masked_name: String,
}

impl MappingEntry {
    pub fn new(number: u32, original_name: impl Into<String>) -> Self {
        Self {
            number,
            original_name: original_name.into(),
            masked_name: format!("{number}.pdf"),
        }
    }
}

/// Write the mapping artifact, replacing any previous one.
pub fn save_mapping(target_folder: &Path, entries: &[MappingEntry]) -> Result<(), PipelineError> {
    let path = target_folder.join(MAPPING_FILE);
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| PipelineError::Internal(format!("mapping serialisation: {e}")))?;
    fs::write(&path, json).map_err(|source| PipelineError::MappingWriteFailed { path, source })
}

/// Load the mapping artifact if one exists.
///
/// `Ok(None)` when the file is absent — callers fall back to re-deriving
/// order from a fresh source listing. A present-but-unparsable file is an
/// error, not a silent fallback: it usually means a half-written artifact.
pub fn load_mapping(target_folder: &Path) -> Result<Option<Vec<MappingEntry>>, PipelineError> {
    let path = target_folder.join(MAPPING_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|source| PipelineError::Io {
        path: path.clone(),
        source,
    })?;
    let entries = serde_json::from_str(&raw).map_err(|e| PipelineError::MappingCorrupt {
        path,
        detail: e.to_string(),
    })?;
    Ok(Some(entries))
}
