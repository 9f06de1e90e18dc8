//! # taxdoc-redact
//!
//! Batch-process scanned tax-document PDFs: redact personally identifying
//! regions from each document's first page, drive a vision-model
//! extraction worker over the redacted output, and reconcile the extracted
//! rows back to source identity.
//!
//! ## Why this crate?
//!
//! Tax-guidance notices arrive as folders of scans with names that *are*
//! personal data. Before a vision model may read them, the identifying
//! regions must be irrecoverably blanked and the files renumbered — and
//! because the model's output is correlated back to people purely by
//! position, one stable processing order has to hold across redaction,
//! extraction, and reconciliation. This crate is that order, plus the
//! machinery around it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! pdfs/
//!  │
//!  ├─ 1. Scan       list + numeric ordering (order resolver)
//!  ├─ 2. Redact     first page only, blank + overlay, emit {n}.pdf
//!  ├─ 3. Map        write file_mapping.json ({number, original, masked})
//!  ├─ 4. Extract    external worker per folder; stdout tee'd to
//!  │                job tracker (status) + log broker (live feed)
//!  ├─ 5. Rows       coerce model output → fixed-schema spreadsheet rows
//!  └─ 6. Reconcile  mapping order → {order, code} provenance entries
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taxdoc_redact::{redact_all, NoopProgressSink, PipelineConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .source_folder("pdfs")
//!         .target_folder("masked-pdfs")
//!         .build()?;
//!     let outcome = redact_all(&config, &NoopProgressSink)?;
//!     println!("{} files redacted", outcome.total_processed);
//!     Ok(())
//! }
//! ```
//!
//! Long-running work goes through the job layer instead: create a
//! [`JobTracker`] and a [`LogBroker`] at process start, trigger work with
//! [`spawn_redaction`] / [`spawn_extraction`], poll [`JobTracker::get`]
//! for status, and attach [`LogBroker::subscribe`] for the live feed.
//!
//! Job state is process-memory only and is lost on restart — this is not
//! a durable queue.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `taxdoc` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! taxdoc-redact = { version = "0.4", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod health;
pub mod jobs;
pub mod logstream;
pub mod mapping;
pub mod order;
pub mod progress;
pub mod reconcile;
pub mod redact;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{bundle_target, ArchiveSummary};
pub use config::{default_redaction_areas, PipelineConfig, PipelineConfigBuilder, RedactionArea};
pub use error::{FileError, PipelineError};
pub use extract::fields::{EXTRACTION_FIELDS, SENTINEL};
pub use extract::runner::{run_extraction_folder, ExtractionReport, FieldExtractor, RowSink};
pub use health::{check as health_check, HealthReport};
pub use jobs::{spawn_extraction, spawn_redaction, Job, JobId, JobStatus, JobTracker};
pub use logstream::{LogBroker, LogEvent};
pub use mapping::{load_mapping, save_mapping, MappingEntry, MAPPING_FILE};
pub use order::{order_key, ORDER_SENTINEL};
pub use progress::{NoopProgressSink, ProgressSink, SharedProgressSink};
pub use reconcile::{reconcile, PersonalInfoEntry};
pub use redact::{redact_all, scan, RedactionOutcome, ScanResult};
