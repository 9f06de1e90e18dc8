//! In-memory job tracking: one record per asynchronous unit of work.
//!
//! A [`JobTracker`] is an owned service object constructed at process
//! start — not a module-level singleton — holding a map of job id to
//! [`Job`] behind one coarse mutex. State is small and updates are
//! infrequent relative to job duration, so a single lock for all reads and
//! writes is sufficient; there are no per-job locks.
//!
//! Job state is deliberately ephemeral: nothing is persisted, and a
//! process restart clears every record. Jobs are never deleted while the
//! process lives.
//!
//! Only the worker that owns a job updates it. Concurrent jobs are
//! independent and touch disjoint records.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::logstream::LogBroker;
use crate::progress::ProgressSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Opaque job identifier (UUID v4).
pub type JobId = String;

/// Lifecycle state of a tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Terminal states are sticky: nothing transitions out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The observable record of one asynchronous unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// 0–100; non-decreasing until a terminal state is reached.
    pub progress: u8,
    /// Latest human-readable status line.
    pub message: String,
    /// Present only when failed.
    pub error: Option<String>,
    /// Rolling tail of recent output lines (authoritative snapshot; the
    /// live stream is lossy).
    pub log_output: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Present only when completed; payload varies by job kind.
    pub result: Option<serde_json::Value>,
}

/// Fields a worker may change on its job in one update.
///
/// `None` leaves the previous value in place for the optional fields;
/// status/progress/message are always replaced.
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub error: Option<String>,
    pub log_output: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Process-wide job registry. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct JobTracker {
    inner: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh `pending` job and return its id.
    ///
    /// The caller is expected to hand the id to a background task and
    /// return immediately; `create` itself never blocks on work.
    pub fn create(&self, initial_message: impl Into<String>) -> JobId {
        let id = uuid::Uuid::new_v4().to_string();
        let job = Job {
            id: id.clone(),
            status: JobStatus::Pending,
            progress: 0,
            message: initial_message.into(),
            error: None,
            log_output: None,
            timestamp: Utc::now(),
            result: None,
        };
        self.inner.lock().unwrap().insert(id.clone(), job);
        id
    }

    /// Replace a job's mutable fields. Last write wins under the lock.
    ///
    /// Two guards are enforced here rather than trusted to callers:
    /// terminal states are sticky (updates against a completed or failed
    /// job are dropped), and progress never decreases while running.
    pub fn update(
        &self,
        id: &str,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
        extra: JobUpdate,
    ) {
        let mut map = self.inner.lock().unwrap();
        let Some(job) = map.get_mut(id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }
        job.status = status;
        job.progress = if status.is_terminal() {
            progress.min(100)
        } else {
            progress.min(100).max(job.progress)
        };
        job.message = message.into();
        job.timestamp = Utc::now();
        if let Some(e) = extra.error {
            job.error = Some(e);
        }
        if let Some(l) = extra.log_output {
            job.log_output = Some(l);
        }
        if let Some(r) = extra.result {
            job.result = Some(r);
        }
    }

    /// Fetch a snapshot of the job record.
    pub fn get(&self, id: &str) -> Result<Job, PipelineError> {
        self.inner
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::JobNotFound { id: id.to_string() })
    }

    /// Current status only, without cloning the whole record.
    pub fn status_of(&self, id: &str) -> Option<JobStatus> {
        self.inner.lock().unwrap().get(id).map(|j| j.status)
    }
}

/// Bridges the redaction engine's [`ProgressSink`] to a tracked job.
struct TrackerSink {
    tracker: JobTracker,
    job_id: JobId,
}

impl ProgressSink for TrackerSink {
    fn on_progress(&self, status: JobStatus, percent: u8, message: &str) {
        self.tracker
            .update(&self.job_id, status, percent, message, JobUpdate::default());
    }
}

/// Trigger a redaction run on a background task.
///
/// Returns the job id immediately; the run itself executes under
/// `spawn_blocking` (PDF mutation is synchronous, CPU- and file-bound).
pub fn spawn_redaction(tracker: &JobTracker, config: PipelineConfig) -> JobId {
    let job_id = tracker.create("Waiting to start redaction");
    let sink: Arc<dyn ProgressSink> = Arc::new(TrackerSink {
        tracker: tracker.clone(),
        job_id: job_id.clone(),
    });
    let tracker = tracker.clone();
    let id = job_id.clone();

    tokio::spawn(async move {
        let run_sink = Arc::clone(&sink);
        let result =
            tokio::task::spawn_blocking(move || crate::redact::redact_all(&config, &*run_sink))
                .await;

        match result {
            Ok(Ok(outcome)) => {
                let payload = serde_json::to_value(&outcome).unwrap_or(serde_json::Value::Null);
                tracker.update(
                    &id,
                    JobStatus::Completed,
                    100,
                    format!("Redaction complete: {} files processed", outcome.total_processed),
                    JobUpdate {
                        result: Some(payload),
                        ..Default::default()
                    },
                );
                info!(job = %id, files = outcome.total_processed, "redaction job finished");
            }
            Ok(Err(e)) => {
                let msg = e.to_string();
                error!(job = %id, error = %msg, "redaction job failed");
                tracker.update(
                    &id,
                    JobStatus::Failed,
                    0,
                    String::new(),
                    JobUpdate {
                        error: Some(msg),
                        ..Default::default()
                    },
                );
            }
            Err(join_err) => {
                let msg = format!("redaction task panicked: {join_err}");
                error!(job = %id, "{msg}");
                tracker.update(
                    &id,
                    JobStatus::Failed,
                    0,
                    String::new(),
                    JobUpdate {
                        error: Some(msg),
                        ..Default::default()
                    },
                );
            }
        }
    });

    job_id
}

/// Trigger a supervised extraction run on a background task.
///
/// Validates up front that the target folder exists and holds at least one
/// `.pdf`, and that an extraction command is configured — those failures
/// belong to the caller, not to a job record. Past validation, the job id
/// is returned immediately and the external worker runs unsupervised by
/// the caller.
pub fn spawn_extraction(
    tracker: &JobTracker,
    broker: &LogBroker,
    config: PipelineConfig,
) -> Result<JobId, PipelineError> {
    let target = &config.target_folder;
    if !target.exists() {
        return Err(PipelineError::FolderNotFound {
            path: target.clone(),
        });
    }
    let pdf_count = count_pdfs(target)?;
    if pdf_count == 0 {
        return Err(PipelineError::NoPdfFiles {
            path: target.clone(),
        });
    }
    if config.extract_command.is_none() {
        return Err(PipelineError::ExtractCommandMissing);
    }

    let job_id = tracker.create(format!("Waiting to extract {pdf_count} files"));
    let tracker = tracker.clone();
    let broker = broker.clone();
    let id = job_id.clone();

    tokio::spawn(async move {
        crate::extract::supervise::run_supervised(&tracker, &broker, &id, &config).await;
    });

    Ok(job_id)
}

fn count_pdfs(folder: &Path) -> Result<usize, PipelineError> {
    let entries = std::fs::read_dir(folder).map_err(|source| PipelineError::Io {
        path: folder.to_path_buf(),
        source,
    })?;
    let mut count = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().to_lowercase().ends_with(".pdf") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_inserts_pending_job() {
        let tracker = JobTracker::new();
        let id = tracker.create("queued");
        let job = tracker.get(&id).expect("job exists");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.message, "queued");
        assert!(job.error.is_none());
        assert!(job.result.is_none());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let tracker = JobTracker::new();
        let err = tracker.get("nope").expect_err("must fail");
        assert!(matches!(err, PipelineError::JobNotFound { .. }));
    }

    #[test]
    fn progress_is_monotonic_while_running() {
        let tracker = JobTracker::new();
        let id = tracker.create("queued");
        tracker.update(&id, JobStatus::Running, 40, "working", JobUpdate::default());
        tracker.update(&id, JobStatus::Running, 20, "hiccup", JobUpdate::default());
        let job = tracker.get(&id).expect("job");
        assert_eq!(job.progress, 40, "progress must never decrease");
        assert_eq!(job.message, "hiccup", "message still updates");
    }

    #[test]
    fn terminal_states_are_sticky() {
        let tracker = JobTracker::new();
        let id = tracker.create("queued");
        tracker.update(
            &id,
            JobStatus::Failed,
            0,
            "",
            JobUpdate {
                error: Some("boom".into()),
                ..Default::default()
            },
        );
        tracker.update(&id, JobStatus::Running, 50, "zombie", JobUpdate::default());
        let job = tracker.get(&id).expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn failed_job_may_report_zero_progress() {
        let tracker = JobTracker::new();
        let id = tracker.create("queued");
        tracker.update(&id, JobStatus::Running, 70, "almost", JobUpdate::default());
        tracker.update(
            &id,
            JobStatus::Failed,
            0,
            "",
            JobUpdate {
                error: Some("died".into()),
                ..Default::default()
            },
        );
        let job = tracker.get(&id).expect("job");
        // The monotonicity guarantee ends at the terminal transition.
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn status_serialises_lowercase() {
        let s = serde_json::to_string(&JobStatus::Running).expect("serialise");
        assert_eq!(s, "\"running\"");
    }

    #[test]
    fn clones_share_state() {
        let tracker = JobTracker::new();
        let id = tracker.create("queued");
        let clone = tracker.clone();
        clone.update(&id, JobStatus::Running, 10, "seen", JobUpdate::default());
        assert_eq!(tracker.get(&id).unwrap().status, JobStatus::Running);
    }
}
