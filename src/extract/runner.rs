//! The extraction worker loop: folder in, spreadsheet rows out.
//!
//! Drives the actual per-document extraction the supervisor only watches
//! from the outside. The two external collaborators stay behind trait
//! seams — [`FieldExtractor`] (the vision-model call) and [`RowSink`] (the
//! spreadsheet) — so this crate never hard-codes either backend.
//!
//! Documents are processed strictly one at a time, in ascending numeric
//! order: downstream reconciliation correlates rows back to source
//! identity purely by position, so one file's extraction must finish
//! before the next begins.
//!
//! All progress reporting goes through the injected line sink as
//! timestamped text — the same stdout protocol the supervisor's heuristics
//! parse.

use crate::config::PipelineConfig;
use crate::error::{FileError, PipelineError};
use crate::extract::parse;
use crate::order;
use crate::redact::list_pdfs_ordered;
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Error type for the external collaborators.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// The vision-model extraction capability: one document in, raw model
/// response text out. Coercion into records happens here in the runner,
/// not in the backend.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, pdf: &Path) -> Result<String, BackendError>;
}

/// The result-row destination (a spreadsheet in production).
///
/// `append_error` feeds the dedicated error log, not the main result set.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), BackendError>;
    async fn append_error(&self, file: &str, error: &str) -> Result<(), BackendError>;
}

/// Summary of one extraction run over a folder.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionReport {
    pub total_files: usize,
    pub successful_files: usize,
    pub failed_files: usize,
    pub rows_appended: usize,
    pub failures: Vec<FileError>,
}

/// Extract every `{n}.pdf` in `folder`, in ascending numeric order, and
/// append one row per extracted record to the sink.
///
/// Per-file behaviour: up to `config.max_retries` attempts with a fixed
/// `config.retry_backoff_ms` pause between them; an attempt fails when the
/// backend call errors *or* its response cannot be coerced into records.
/// A file that exhausts its attempts gets an error-log entry and the run
/// continues — per-file failure is non-fatal. Folder-level problems abort
/// with `Err`.
pub async fn run_extraction_folder(
    folder: &Path,
    extractor: &dyn FieldExtractor,
    sink: &dyn RowSink,
    config: &PipelineConfig,
    log: &(dyn Fn(&str) + Send + Sync),
) -> Result<ExtractionReport, PipelineError> {
    let emit = |msg: String| log(&stamped(&msg));

    emit("extraction worker initialized".to_string());

    let files = list_pdfs_ordered(folder)?;
    if files.is_empty() {
        return Err(PipelineError::NoPdfFiles {
            path: folder.to_path_buf(),
        });
    }
    let total = files.len();
    emit(format!("{total} files queued for extraction"));

    let mut report = ExtractionReport {
        total_files: total,
        successful_files: 0,
        failed_files: 0,
        rows_appended: 0,
        failures: Vec::new(),
    };

    for (idx, filename) in files.iter().enumerate() {
        let n = idx + 1;
        let path = folder.join(filename);
        let stem = order::stem(filename);
        emit(format!("[{n}/{total}] '{filename}' processing started"));

        match extract_one(&path, filename, n, total, extractor, config, &emit).await {
            Ok(records) => {
                if records.is_empty() {
                    emit(format!("[{n}/{total}] '{filename}' produced no valid records"));
                    record_failure(
                        &mut report,
                        sink,
                        filename,
                        FileError::MalformedOutput {
                            file: filename.clone(),
                        },
                        &emit,
                    )
                    .await;
                    continue;
                }

                let rows = parse::build_rows(stem, &records);
                let row_count = rows.len();
                emit(format!(
                    "[{n}/{total}] '{filename}' uploading rows ({row_count} records)"
                ));
                match sink.append_rows(rows).await {
                    Ok(()) => {
                        report.successful_files += 1;
                        report.rows_appended += row_count;
                        emit(format!(
                            "[{n}/{total}] '{filename}' fully processed ({row_count} rows)"
                        ));
                    }
                    Err(e) => {
                        record_failure(
                            &mut report,
                            sink,
                            filename,
                            FileError::AppendFailed {
                                file: filename.clone(),
                                detail: e.to_string(),
                            },
                            &emit,
                        )
                        .await;
                    }
                }
            }
            Err(failure) => {
                record_failure(&mut report, sink, filename, failure, &emit).await;
            }
        }
    }

    emit(format!(
        "all files processed: {} succeeded, {} failed, {} rows appended",
        report.successful_files, report.failed_files, report.rows_appended
    ));
    Ok(report)
}

/// One document through the retry loop: backend call plus coercion.
async fn extract_one(
    path: &Path,
    filename: &str,
    n: usize,
    total: usize,
    extractor: &dyn FieldExtractor,
    config: &PipelineConfig,
    emit: &dyn Fn(String),
) -> Result<Vec<parse::FieldMap>, FileError> {
    let attempts = config.max_retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if attempt > 1 {
            emit(format!(
                "[{n}/{total}] '{filename}' retrying (attempt {attempt}/{attempts})"
            ));
            tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
        }
        emit(format!("[{n}/{total}] '{filename}' analysis started"));

        match extractor.extract(path).await {
            Ok(response) => {
                emit(format!(
                    "[{n}/{total}] '{filename}' analyzing response ({} chars)",
                    response.len()
                ));
                match parse::coerce_records(&response) {
                    Some(records) => return Ok(parse::validate_records(records)),
                    None => {
                        last_error = "no JSON records found in model output".to_string();
                        warn!(file = %filename, attempt, "model output not coercible");
                    }
                }
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(file = %filename, attempt, error = %last_error, "backend call failed");
            }
        }
    }

    Err(FileError::ExtractFailed {
        file: filename.to_string(),
        retries: attempts,
        detail: last_error,
    })
}

async fn record_failure(
    report: &mut ExtractionReport,
    sink: &dyn RowSink,
    filename: &str,
    failure: FileError,
    emit: &dyn Fn(String),
) {
    emit(format!("'{filename}' failed: {failure}"));
    if let Err(e) = sink.append_error(filename, &failure.to_string()).await {
        warn!(file = %filename, error = %e, "error-log append failed");
    }
    report.failed_files += 1;
    report.failures.push(failure);
}

fn stamped(message: &str) -> String {
    format!("[{}] {message}", chrono::Local::now().format("%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted backend: responses keyed by filename; `None` simulates a
    /// transient error.
    struct ScriptedExtractor {
        responses: HashMap<String, Vec<Option<String>>>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedExtractor {
        fn new(responses: HashMap<String, Vec<Option<String>>>) -> Self {
            Self {
                responses,
                calls: Mutex::new(HashMap::new()),
            }
        }

        fn calls_for(&self, file: &str) -> usize {
            *self.calls.lock().unwrap().get(file).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl FieldExtractor for ScriptedExtractor {
        async fn extract(&self, pdf: &Path) -> Result<String, BackendError> {
            let name = pdf.file_name().unwrap().to_string_lossy().into_owned();
            let mut calls = self.calls.lock().unwrap();
            let attempt = calls.entry(name.clone()).or_insert(0);
            let scripted = self
                .responses
                .get(&name)
                .and_then(|r| r.get(*attempt))
                .cloned()
                .flatten();
            *attempt += 1;
            scripted.ok_or_else(|| "backend unreachable".into())
        }
    }

    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<Vec<Vec<String>>>,
        errors: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RowSink for MemorySink {
        async fn append_rows(&self, rows: Vec<Vec<String>>) -> Result<(), BackendError> {
            self.rows.lock().unwrap().extend(rows);
            Ok(())
        }

        async fn append_error(&self, file: &str, error: &str) -> Result<(), BackendError> {
            self.errors
                .lock()
                .unwrap()
                .push((file.to_string(), error.to_string()));
            Ok(())
        }
    }

    fn folder_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        for f in files {
            std::fs::write(dir.path().join(f), b"stub pdf").expect("write");
        }
        dir
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig::builder()
            .retry_backoff_ms(1)
            .build()
            .expect("config")
    }

    fn no_log() -> impl Fn(&str) + Send + Sync {
        |_: &str| {}
    }

    #[tokio::test]
    async fn empty_folder_is_fatal() {
        let dir = folder_with(&[]);
        let extractor = ScriptedExtractor::new(HashMap::new());
        let sink = MemorySink::default();
        let err = run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &no_log())
            .await
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::NoPdfFiles { .. }));
    }

    #[tokio::test]
    async fn files_processed_in_numeric_order_one_row_per_record() {
        let dir = folder_with(&["2.pdf", "1.pdf", "10.pdf"]);
        let record = r#"[{"상호": "가게"}]"#;
        let two_records = r#"[{"상호": "하나"}, {"상호": "둘"}]"#;
        let responses = HashMap::from([
            ("1.pdf".to_string(), vec![Some(record.to_string())]),
            ("2.pdf".to_string(), vec![Some(two_records.to_string())]),
            ("10.pdf".to_string(), vec![Some(record.to_string())]),
        ]);
        let extractor = ScriptedExtractor::new(responses);
        let sink = MemorySink::default();

        let report =
            run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &no_log())
                .await
                .expect("run");

        assert_eq!(report.total_files, 3);
        assert_eq!(report.successful_files, 3);
        assert_eq!(report.rows_appended, 4);

        let rows = sink.rows.lock().unwrap();
        // Provenance column reflects numeric processing order 1, 2, 10.
        let stems: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(stems, vec!["1", "2", "2", "10"]);
        // Within-document row numbers restart per file.
        assert_eq!(rows[1][1], "1");
        assert_eq!(rows[2][1], "2");
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let dir = folder_with(&["1.pdf"]);
        let responses = HashMap::from([(
            "1.pdf".to_string(),
            vec![None, Some(r#"[{"상호": "가게"}]"#.to_string())],
        )]);
        let extractor = ScriptedExtractor::new(responses);
        let sink = MemorySink::default();

        let report =
            run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &no_log())
                .await
                .expect("run");

        assert_eq!(extractor.calls_for("1.pdf"), 2);
        assert_eq!(report.successful_files, 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_log_error_and_continue() {
        let dir = folder_with(&["1.pdf", "2.pdf"]);
        let responses = HashMap::from([
            // 1.pdf always fails; 2.pdf succeeds.
            ("1.pdf".to_string(), vec![None, None, None]),
            (
                "2.pdf".to_string(),
                vec![Some(r#"[{"상호": "가게"}]"#.to_string())],
            ),
        ]);
        let extractor = ScriptedExtractor::new(responses);
        let sink = MemorySink::default();

        let report =
            run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &no_log())
                .await
                .expect("run continues past the bad file");

        assert_eq!(extractor.calls_for("1.pdf"), 3, "default max_retries");
        assert_eq!(report.failed_files, 1);
        assert_eq!(report.successful_files, 1);
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "1.pdf");
    }

    #[tokio::test]
    async fn uncoercible_output_counts_as_attempt_failure() {
        let dir = folder_with(&["1.pdf"]);
        let prose = "I see a document but cannot produce JSON.";
        let responses = HashMap::from([(
            "1.pdf".to_string(),
            vec![
                Some(prose.to_string()),
                Some(r#"[{"상호": "가게"}]"#.to_string()),
            ],
        )]);
        let extractor = ScriptedExtractor::new(responses);
        let sink = MemorySink::default();

        let report =
            run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &no_log())
                .await
                .expect("run");

        assert_eq!(extractor.calls_for("1.pdf"), 2, "bad output must retry");
        assert_eq!(report.successful_files, 1);
    }

    #[tokio::test]
    async fn worker_log_lines_carry_phase_markers() {
        let dir = folder_with(&["1.pdf"]);
        let responses = HashMap::from([(
            "1.pdf".to_string(),
            vec![Some(r#"[{"상호": "가게"}]"#.to_string())],
        )]);
        let extractor = ScriptedExtractor::new(responses);
        let sink = MemorySink::default();
        let lines: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let log = |line: &str| lines.lock().unwrap().push(line.to_string());

        run_extraction_folder(dir.path(), &extractor, &sink, &fast_config(), &log)
            .await
            .expect("run");

        let lines = lines.into_inner().unwrap();
        let joined = lines.join("\n");
        for marker in [
            "initialized",
            "processing started",
            "analysis started",
            "analyzing",
            "uploading rows",
            "fully processed",
            "all files processed",
        ] {
            assert!(joined.contains(marker), "missing marker: {marker}");
        }
        // Every line is timestamped for the stdout protocol.
        assert!(lines.iter().all(|l| l.starts_with('[')));
    }
}
