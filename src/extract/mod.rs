//! Extraction-side components.
//!
//! Two ways to run an extraction, sharing everything below the surface:
//!
//! * [`supervise`] — spawn the configured external worker process and
//!   stream its output into the job tracker and log broker. This is what
//!   [`crate::jobs::spawn_extraction`] drives.
//! * [`runner`] — the worker loop itself, usable in-process behind the
//!   [`runner::FieldExtractor`] / [`runner::RowSink`] trait seams. A
//!   deployment typically points the supervisor at a thin binary that
//!   calls this with its real backends.
//!
//! Shared underneath:
//!
//! * [`fields`] — the fixed record schema and currency-field set
//! * [`parse`]  — freeform model output → fixed-schema rows
//! * [`hint`]   — log-line → progress-percent heuristics

pub mod fields;
pub mod hint;
pub mod parse;
pub mod runner;
pub mod supervise;
