//! Error types for the taxdoc-redact library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`] — **Fatal**: the run cannot proceed at all (missing
//!   source folder, no input files, unknown job id). Returned as
//!   `Err(PipelineError)` from the top-level entry points and surfaced as a
//!   `failed` job.
//!
//! * [`FileError`] — **Non-fatal**: a single document failed (unreadable
//!   PDF, zero pages, extraction gave up after retries) but the rest of the
//!   batch is fine. Logged, recorded, and skipped; the run continues.
//!
//! The separation lets callers decide their own tolerance: abort on the
//! first bad file, log and continue, or collect everything for a post-run
//! report.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the taxdoc-redact library.
///
/// Per-file failures use [`FileError`] and are recorded rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A required folder does not exist.
    #[error("Folder not found: '{path}'\nCheck the path exists and is readable.")]
    FolderNotFound { path: PathBuf },

    /// The folder exists but holds nothing to process.
    #[error("No PDF files found in '{path}'")]
    NoPdfFiles { path: PathBuf },

    // ── Job errors ────────────────────────────────────────────────────────
    /// The queried job id is unknown to the tracker.
    #[error("Unknown job id: '{id}'")]
    JobNotFound { id: String },

    // ── Artifact errors ───────────────────────────────────────────────────
    /// The file-mapping artifact could not be written.
    #[error("Failed to write mapping file '{path}': {source}")]
    MappingWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file-mapping artifact exists but could not be parsed.
    #[error("Mapping file '{path}' is corrupt: {detail}")]
    MappingCorrupt { path: PathBuf, detail: String },

    /// Bundling the target folder into an archive failed.
    #[error("Failed to build archive: {0}")]
    ArchiveFailed(String),

    // ── External process errors ───────────────────────────────────────────
    /// The extraction worker command could not be spawned.
    #[error("Failed to spawn extraction worker '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// No extraction worker command is configured.
    #[error("No extraction command configured.\nSet one via PipelineConfig::builder().extract_command(..).")]
    ExtractCommandMissing,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O ───────────────────────────────────────────────────────────────
    /// Filesystem error outside any single document.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document within a batch.
///
/// Recorded alongside the run results when one file fails. The overall
/// batch continues past it.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The PDF could not be opened or parsed.
    #[error("'{file}': failed to load: {detail}")]
    LoadFailed { file: String, detail: String },

    /// The document has no pages to redact.
    #[error("'{file}': document has no pages")]
    NoPages { file: String },

    /// The first-page content stream could not be rewritten.
    #[error("'{file}': redaction failed: {detail}")]
    RedactFailed { file: String, detail: String },

    /// The redacted output could not be written.
    #[error("'{file}': failed to save output: {detail}")]
    SaveFailed { file: String, detail: String },

    /// The extraction backend gave up after all retries.
    #[error("'{file}': extraction failed after {retries} attempts: {detail}")]
    ExtractFailed {
        file: String,
        retries: u32,
        detail: String,
    },

    /// The extraction response could not be coerced into records.
    #[error("'{file}': no JSON records found in model output")]
    MalformedOutput { file: String },

    /// Appending rows to the result sink failed.
    #[error("'{file}': failed to append rows: {detail}")]
    AppendFailed { file: String, detail: String },
}

impl FileError {
    /// The source filename this error concerns.
    pub fn file(&self) -> &str {
        match self {
            FileError::LoadFailed { file, .. }
            | FileError::NoPages { file }
            | FileError::RedactFailed { file, .. }
            | FileError::SaveFailed { file, .. }
            | FileError::ExtractFailed { file, .. }
            | FileError::MalformedOutput { file }
            | FileError::AppendFailed { file, .. } => file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_not_found_display() {
        let e = PipelineError::FolderNotFound {
            path: PathBuf::from("pdfs"),
        };
        assert!(e.to_string().contains("pdfs"));
    }

    #[test]
    fn job_not_found_display() {
        let e = PipelineError::JobNotFound {
            id: "abc-123".into(),
        };
        assert!(e.to_string().contains("abc-123"));
    }

    #[test]
    fn file_error_exposes_filename() {
        let e = FileError::NoPages {
            file: "7.pdf".into(),
        };
        assert_eq!(e.file(), "7.pdf");
        assert!(e.to_string().contains("no pages"));
    }

    #[test]
    fn extract_failed_display() {
        let e = FileError::ExtractFailed {
            file: "3.pdf".into(),
            retries: 3,
            detail: "backend unreachable".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("backend unreachable"));
    }
}
