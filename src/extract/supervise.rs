//! Supervision of the external extraction worker.
//!
//! One supervisor task owns one extraction job: it spawns the configured
//! worker command, reads its line-oriented output as it arrives, and tees
//! every line into two places at once — the log broker (full-fidelity live
//! feed) and the job tracker (coarse status, heuristic progress, trailing
//! log snapshot).
//!
//! The worker is waited on without any timeout: extraction jobs may run
//! arbitrarily long, and once started there is no caller-initiated
//! cancellation. The job completes only on a zero exit code; any other
//! exit, or a supervision error, fails the job with the accumulated output
//! kept for diagnosis. The broker queue is released on every exit path.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::extract::hint;
use crate::jobs::{JobStatus, JobTracker, JobUpdate};
use crate::logstream::LogBroker;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Run one supervised extraction job to completion.
///
/// Never returns an error to the caller: every failure mode ends in a
/// `failed` job record instead, because by the time this runs the caller
/// has already been handed the job id.
pub async fn run_supervised(
    tracker: &JobTracker,
    broker: &LogBroker,
    job_id: &str,
    config: &PipelineConfig,
) {
    broker.open(job_id);
    let outcome = supervise(tracker, broker, job_id, config).await;
    // The queue dies with the producer, success or not.
    broker.close(job_id);

    if let Err(e) = outcome {
        let msg = e.to_string();
        error!(job = %job_id, error = %msg, "extraction supervision failed");
        broker.publish(job_id, stamped(&format!("extraction error: {msg}")));
        tracker.update(
            job_id,
            JobStatus::Failed,
            0,
            "Extraction failed",
            JobUpdate {
                error: Some(msg),
                ..Default::default()
            },
        );
    }
}

async fn supervise(
    tracker: &JobTracker,
    broker: &LogBroker,
    job_id: &str,
    config: &PipelineConfig,
) -> Result<(), PipelineError> {
    let command = config
        .extract_command
        .as_ref()
        .ok_or(PipelineError::ExtractCommandMissing)?;
    let (program, args) = command
        .split_first()
        .ok_or(PipelineError::ExtractCommandMissing)?;

    tracker.update(
        job_id,
        JobStatus::Running,
        10,
        format!("Launching extraction worker: {program}"),
        JobUpdate::default(),
    );

    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| PipelineError::SpawnFailed {
            command: program.clone(),
            source,
        })?;

    info!(job = %job_id, worker = %program, "extraction worker spawned");

    // Merge stdout and stderr into one ordered-enough line feed. Exact
    // interleaving across the two pipes is not guaranteed and does not
    // matter for a human-facing progress feed.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx.clone());
    }
    drop(tx);

    let mut output_lines: Vec<String> = Vec::new();
    while let Some(line) = rx.recv().await {
        output_lines.push(line.clone());
        broker.publish(job_id, &line);

        let progress = hint::progress_hint(&line, output_lines.len());
        let message = hint::salient_message(&line)
            .unwrap_or_else(|| "Extraction in progress…".to_string());
        let tail_start = output_lines.len().saturating_sub(config.log_tail_lines);
        tracker.update(
            job_id,
            JobStatus::Running,
            progress,
            message,
            JobUpdate {
                log_output: Some(output_lines[tail_start..].join("\n")),
                ..Default::default()
            },
        );
    }

    // No timeout by design: the worker owns the pace.
    let status = child.wait().await.map_err(|source| PipelineError::Io {
        path: std::path::PathBuf::from(program),
        source,
    })?;

    let full_output = output_lines.join("\n");
    if status.success() {
        let done = stamped("extraction run fully finished");
        broker.publish(job_id, &done);
        tracker.update(
            job_id,
            JobStatus::Completed,
            100,
            "Extraction complete",
            JobUpdate {
                log_output: Some(full_output.clone()),
                result: Some(serde_json::json!({
                    "output": full_output,
                    "success": true,
                })),
                ..Default::default()
            },
        );
        info!(job = %job_id, "extraction job completed");
    } else {
        let failed = stamped("extraction run failed");
        broker.publish(job_id, &failed);
        tracker.update(
            job_id,
            JobStatus::Failed,
            0,
            "Extraction failed",
            JobUpdate {
                error: Some(format!("extraction worker exited with {status}")),
                log_output: Some(full_output),
                ..Default::default()
            },
        );
        error!(job = %job_id, %status, "extraction worker exited non-zero");
    }

    Ok(())
}

/// Pump one child pipe into the merged line channel, dropping blank lines.
fn forward_lines(pipe: impl AsyncRead + Unpin + Send + 'static, tx: mpsc::Sender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            if tx.send(line).await.is_err() {
                break;
            }
        }
    });
}

fn stamped(message: &str) -> String {
    format!("[{}] {message}", chrono::Local::now().format("%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logstream::LogBroker;

    fn config_with_command(cmd: &[&str]) -> PipelineConfig {
        PipelineConfig::builder()
            .extract_command(cmd.iter().copied())
            .build()
            .expect("config")
    }

    #[tokio::test]
    async fn successful_worker_completes_job() {
        let tracker = JobTracker::new();
        let broker = LogBroker::new(100);
        let id = tracker.create("queued");
        let config = config_with_command(&[
            "sh",
            "-c",
            "echo 'worker initialized'; echo 'all files processed'",
        ]);

        run_supervised(&tracker, &broker, &id, &config).await;

        let job = tracker.get(&id).expect("job");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let log = job.log_output.expect("log output");
        assert!(log.contains("worker initialized"));
        assert!(log.contains("all files processed"));
        let result = job.result.expect("result payload");
        assert_eq!(result["success"], serde_json::json!(true));
        // Queue released after completion.
        assert!(broker.depth(&id).is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_fails_job_and_keeps_output() {
        let tracker = JobTracker::new();
        let broker = LogBroker::new(100);
        let id = tracker.create("queued");
        let config = config_with_command(&["sh", "-c", "echo 'partial work done'; exit 3"]);

        run_supervised(&tracker, &broker, &id, &config).await;

        let job = tracker.get(&id).expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.expect("error").contains("exited with"));
        assert!(
            job.log_output.expect("log output").contains("partial work done"),
            "output before failure must be retained"
        );
        assert!(broker.depth(&id).is_none());
    }

    #[tokio::test]
    async fn stderr_lines_are_captured_too() {
        let tracker = JobTracker::new();
        let broker = LogBroker::new(100);
        let id = tracker.create("queued");
        let config = config_with_command(&["sh", "-c", "echo 'warning: slow backend' >&2"]);

        run_supervised(&tracker, &broker, &id, &config).await;

        let job = tracker.get(&id).expect("job");
        assert!(job
            .log_output
            .expect("log output")
            .contains("warning: slow backend"));
    }

    #[tokio::test]
    async fn unspawnable_command_fails_job() {
        let tracker = JobTracker::new();
        let broker = LogBroker::new(100);
        let id = tracker.create("queued");
        let config = config_with_command(&["/no/such/binary-here"]);

        run_supervised(&tracker, &broker, &id, &config).await;

        let job = tracker.get(&id).expect("job");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.expect("error").contains("spawn"));
        assert!(broker.depth(&id).is_none());
    }

    #[tokio::test]
    async fn missing_command_fails_job() {
        let tracker = JobTracker::new();
        let broker = LogBroker::new(100);
        let id = tracker.create("queued");
        let config = PipelineConfig::default();

        run_supervised(&tracker, &broker, &id, &config).await;

        let job = tracker.get(&id).expect("job");
        assert_eq!(job.status, JobStatus::Failed);
    }
}
