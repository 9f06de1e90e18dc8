//! Aligning extraction results back to source identity.
//!
//! Extracted rows carry only the masked file number — correlation to the
//! original document is purely positional. The reconciler rebuilds that
//! correlation: when the redaction run's mapping artifact exists, its
//! order *is* the order extraction consumed (extraction reads `{n}.pdf`
//! ascending); when it does not — redaction and extraction can be
//! triggered independently and out of order — the order is re-derived
//! from a fresh source listing through the same order resolver.
//!
//! A present mapping is trusted as-is, even if the source folder has
//! changed since it was written. Validating it against current folder
//! contents would reject the legitimate workflow of adding new source
//! files after a redaction run; the trade-off is documented rather than
//! guessed at.

use crate::error::PipelineError;
use crate::mapping;
use crate::order;
use crate::redact::list_pdfs_ordered;
use serde::Serialize;
use std::path::Path;

/// One source document's de-identified lookup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonalInfoEntry {
    /// Processing order: the mapping number when a mapping exists,
    /// otherwise the 1-based position in the freshly derived listing.
    pub order: u32,
    /// First four characters of the original filename's stem — the
    /// de-identification proxy carried forward instead of the name itself.
    pub code: String,
    pub original_filename: String,
}

/// Derive the ordered personal-info entries for the current run.
///
/// Entries whose code is blank after trimming are omitted. Output is
/// sorted by `order` ascending.
pub fn reconcile(
    source_folder: &Path,
    target_folder: &Path,
) -> Result<Vec<PersonalInfoEntry>, PipelineError> {
    if !source_folder.exists() {
        return Err(PipelineError::FolderNotFound {
            path: source_folder.to_path_buf(),
        });
    }

    let mut entries = match mapping::load_mapping(target_folder)? {
        Some(mapping_entries) => mapping_entries
            .iter()
            .filter_map(|m| entry_for(m.number, &m.original_name))
            .collect::<Vec<_>>(),
        None => {
            // No mapping artifact: fall back to a fresh listing in
            // resolver order with positional indices.
            let files = list_pdfs_ordered(source_folder)?;
            files
                .iter()
                .enumerate()
                .filter_map(|(i, name)| entry_for(i as u32 + 1, name))
                .collect()
        }
    };

    entries.sort_by_key(|e| e.order);
    Ok(entries)
}

fn entry_for(order_value: u32, filename: &str) -> Option<PersonalInfoEntry> {
    let stem = order::stem(filename);
    let code: String = stem.chars().take(4).collect();
    if code.trim().is_empty() {
        return None;
    }
    Some(PersonalInfoEntry {
        order: order_value,
        code,
        original_filename: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{save_mapping, MappingEntry};
    use tempfile::TempDir;

    #[test]
    fn missing_source_folder_fails() {
        let target = TempDir::new().expect("target");
        let err = reconcile(Path::new("/definitely/not/here"), target.path())
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::FolderNotFound { .. }));
    }

    #[test]
    fn mapping_order_wins_over_listing_order() {
        let source = TempDir::new().expect("source");
        let target = TempDir::new().expect("target");
        // Source listing order would be BBBB, ZZZZ (alphabetic after
        // sentinel ties) — the mapping says otherwise and must win.
        for name in ["BBBB-1.pdf", "ZZZZ-2.pdf"] {
            std::fs::write(source.path().join(name), b"stub").expect("write");
        }
        save_mapping(
            target.path(),
            &[
                MappingEntry::new(1, "ZZZZ-2.pdf"),
                MappingEntry::new(2, "BBBB-1.pdf"),
            ],
        )
        .expect("save");

        let entries = reconcile(source.path(), target.path()).expect("reconcile");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].order, 1);
        assert_eq!(entries[0].code, "ZZZZ");
        assert_eq!(entries[1].order, 2);
        assert_eq!(entries[1].code, "BBBB");
    }

    #[test]
    fn fallback_uses_resolver_order() {
        let source = TempDir::new().expect("source");
        let target = TempDir::new().expect("target");
        for name in ["3.pdf", "1.pdf", "10.pdf"] {
            std::fs::write(source.path().join(name), b"stub").expect("write");
        }

        let entries = reconcile(source.path(), target.path()).expect("reconcile");
        let pairs: Vec<(u32, &str)> = entries
            .iter()
            .map(|e| (e.order, e.original_filename.as_str()))
            .collect();
        assert_eq!(pairs, vec![(1, "1.pdf"), (2, "3.pdf"), (3, "10.pdf")]);
    }

    #[test]
    fn code_is_first_four_chars_of_stem() {
        let source = TempDir::new().expect("source");
        let target = TempDir::new().expect("target");
        save_mapping(
            target.path(),
            &[
                MappingEntry::new(1, "ABCDEF.pdf"),
                MappingEntry::new(2, "XY.pdf"),
            ],
        )
        .expect("save");

        let entries = reconcile(source.path(), target.path()).expect("reconcile");
        assert_eq!(entries[0].code, "ABCD");
        // Shorter than four characters: the whole stem.
        assert_eq!(entries[1].code, "XY");
    }

    #[test]
    fn blank_codes_are_omitted() {
        let source = TempDir::new().expect("source");
        let target = TempDir::new().expect("target");
        save_mapping(
            target.path(),
            &[
                MappingEntry::new(1, "    .pdf"),
                MappingEntry::new(2, "GOOD.pdf"),
            ],
        )
        .expect("save");

        let entries = reconcile(source.path(), target.path()).expect("reconcile");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "GOOD");
    }

    #[test]
    fn stale_mapping_is_trusted_verbatim() {
        let source = TempDir::new().expect("source");
        let target = TempDir::new().expect("target");
        // Mapping references a file no longer present in the source
        // folder; it is still returned untouched.
        std::fs::write(source.path().join("NEW1.pdf"), b"stub").expect("write");
        save_mapping(target.path(), &[MappingEntry::new(1, "GONE.pdf")]).expect("save");

        let entries = reconcile(source.path(), target.path()).expect("reconcile");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_filename, "GONE.pdf");
    }
}
