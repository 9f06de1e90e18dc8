//! Batch redaction engine: scan, order, redact, renumber, map.
//!
//! ## Data flow
//!
//! ```text
//! source/*.pdf ──▶ order ──▶ batches ──▶ redact first page ──▶ target/{n}.pdf
//!   (scan)       (numeric)  (of 50)       (blank + overlay)        │
//!                                                                  └▶ file_mapping.json
//! ```
//!
//! Processing is strictly sequential within and across batches — the
//! mapping numbers must match the order the extraction step later consumes,
//! so there is no intra-run parallelism. Batching only bounds peak
//! file-handle use and provides natural progress checkpoints.
//!
//! Each run fully supersedes the last: stale `.pdf` outputs are cleared
//! from the target folder up front and the mapping artifact is rewritten
//! whole.

mod page;

pub use page::redact_first_page;

use crate::config::PipelineConfig;
use crate::error::{FileError, PipelineError};
use crate::jobs::JobStatus;
use crate::mapping::{self, MappingEntry};
use crate::order;
use crate::progress::ProgressSink;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One source file as seen by a folder scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedFile {
    pub filename: String,
    pub size_bytes: u64,
}

/// Result of scanning the source folder.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub count: usize,
    pub total_size_bytes: u64,
}

/// One successfully redacted document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    pub number: u32,
    pub original_name: String,
    pub masked_name: String,
    pub size_bytes: u64,
}

/// Result of one full redaction run.
#[derive(Debug, Clone, Serialize)]
pub struct RedactionOutcome {
    pub processed_files: Vec<ProcessedFile>,
    pub file_mapping: Vec<MappingEntry>,
    /// Per-file failures; these documents have no output and no mapping
    /// slot.
    pub failures: Vec<FileError>,
    pub total_processed: usize,
    pub target_folder: PathBuf,
}

/// List the source folder's PDFs in processing order, with sizes.
///
/// Fails with [`PipelineError::FolderNotFound`] when the folder is absent.
/// The extension match is case-insensitive; ordering comes from the
/// filename order resolver.
pub fn scan(source_folder: &Path) -> Result<ScanResult, PipelineError> {
    let filenames = list_pdfs_ordered(source_folder)?;

    let mut files = Vec::with_capacity(filenames.len());
    let mut total_size_bytes = 0u64;
    for filename in filenames {
        let path = source_folder.join(&filename);
        let size_bytes = fs::metadata(&path)
            .map_err(|source| PipelineError::Io {
                path: path.clone(),
                source,
            })?
            .len();
        total_size_bytes += size_bytes;
        files.push(ScannedFile {
            filename,
            size_bytes,
        });
    }

    Ok(ScanResult {
        count: files.len(),
        total_size_bytes,
        files,
    })
}

/// Redact every source PDF into the target folder and write the mapping
/// artifact.
///
/// Implements the full batch contract: enumerate and order, clear stale
/// outputs, process in batches of `config.batch_size`, assign each
/// successful output the next number, and finish by writing
/// `file_mapping.json`. Per-file failures are logged and recorded in the
/// outcome; folder-level failures abort the run with `Err` and leave no
/// partially written mapping.
///
/// Progress is reported through `sink` with percentages scaled 0–10 for
/// setup, 10–90 proportional to files attempted, and 90–100 for
/// finalisation. Terminal transitions (completed/failed) are the caller's
/// responsibility — the engine only ever reports `Running`.
pub fn redact_all(
    config: &PipelineConfig,
    sink: &dyn ProgressSink,
) -> Result<RedactionOutcome, PipelineError> {
    sink.on_progress(JobStatus::Running, 0, "Scanning source folder…");

    let files = list_pdfs_ordered(&config.source_folder)?;
    if files.is_empty() {
        return Err(PipelineError::NoPdfFiles {
            path: config.source_folder.clone(),
        });
    }

    clear_target(&config.target_folder)?;

    sink.on_progress(
        JobStatus::Running,
        5,
        &format!("{} files found. Starting redaction…", files.len()),
    );

    let total = files.len();
    let batch_count = total.div_ceil(config.batch_size);
    let mut processed_files: Vec<ProcessedFile> = Vec::with_capacity(total);
    let mut failures: Vec<FileError> = Vec::new();
    let mut attempted = 0usize;
    // Numbers are handed out at successful write, so the mapping stays a
    // dense 1..=k sequence even when some files fail mid-batch.
    let mut next_number: u32 = 1;

    for (batch_idx, batch) in files.chunks(config.batch_size).enumerate() {
        sink.on_progress(
            JobStatus::Running,
            batch_progress(attempted, total),
            &format!("Processing batch {}/{}", batch_idx + 1, batch_count),
        );

        for filename in batch {
            let input = config.source_folder.join(filename);
            let output = config.target_folder.join(format!("{next_number}.pdf"));

            match page::redact_first_page(&input, &output, &config.redaction_areas) {
                Ok(size_bytes) => {
                    processed_files.push(ProcessedFile {
                        number: next_number,
                        original_name: filename.clone(),
                        masked_name: format!("{next_number}.pdf"),
                        size_bytes,
                    });
                    next_number += 1;
                }
                Err(e) => {
                    warn!(file = %filename, error = %e, "skipping file");
                    failures.push(e);
                }
            }

            attempted += 1;
            sink.on_progress(
                JobStatus::Running,
                batch_progress(attempted, total),
                &format!("Processed {attempted}/{total} files (first page only)"),
            );
        }
    }

    let file_mapping: Vec<MappingEntry> = processed_files
        .iter()
        .map(|p| MappingEntry::new(p.number, p.original_name.clone()))
        .collect();

    sink.on_progress(JobStatus::Running, 95, "Writing file mapping…");
    mapping::save_mapping(&config.target_folder, &file_mapping)?;

    info!(
        processed = processed_files.len(),
        failed = failures.len(),
        "redaction run finished"
    );

    Ok(RedactionOutcome {
        total_processed: processed_files.len(),
        target_folder: config.target_folder.clone(),
        file_mapping,
        processed_files,
        failures,
    })
}

/// 10–90 band, proportional to files attempted.
fn batch_progress(attempted: usize, total: usize) -> u8 {
    (10.0 + (attempted as f64 / total as f64) * 80.0) as u8
}

/// PDFs in a folder, sorted into processing order.
pub(crate) fn list_pdfs_ordered(folder: &Path) -> Result<Vec<String>, PipelineError> {
    if !folder.exists() {
        return Err(PipelineError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }
    let entries = fs::read_dir(folder).map_err(|source| PipelineError::Io {
        path: folder.to_path_buf(),
        source,
    })?;
    let mut files: Vec<String> = entries
        .flatten()
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.to_lowercase().ends_with(".pdf"))
        .collect();
    // read_dir order is platform-dependent; pin it before the stable sort
    // so sentinel ties resolve the same way everywhere.
    files.sort();
    order::sort_by_order(&mut files);
    Ok(files)
}

/// Remove stale `.pdf` outputs from the target folder, creating it if
/// absent. The mapping artifact is left in place — it is overwritten
/// atomically at the end of the run.
fn clear_target(target_folder: &Path) -> Result<(), PipelineError> {
    if target_folder.exists() {
        let entries = fs::read_dir(target_folder).map_err(|source| PipelineError::Io {
            path: target_folder.to_path_buf(),
            source,
        })?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.ends_with(".pdf") {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "failed to clear stale output");
                }
            }
        }
    } else {
        fs::create_dir_all(target_folder).map_err(|source| PipelineError::Io {
            path: target_folder.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
