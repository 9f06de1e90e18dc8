//! Live log fan-out: per-job bounded queues feeding a push stream.
//!
//! Each running job that produces line-oriented output owns one bounded
//! FIFO queue, created when the job's worker starts and destroyed when it
//! ends — success or failure. The bound is a deliberate memory ceiling:
//! when a queue is full the *oldest* line is evicted to admit the newest
//! (drop-oldest backpressure; producers never block, consumers never cause
//! unbounded growth).
//!
//! This is an at-least-once, possibly-lossy feed for humans watching
//! progress — not an audit log. The authoritative trailing log is the job
//! record's `log_output` snapshot, updated alongside progress by the
//! supervisor.

use crate::jobs::{JobId, JobStatus, JobTracker};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// One event on a job's live log stream.
///
/// Serialises as `{"type": "log" | "status" | "error" | "close", ...}` —
/// the wire shape a server-push endpoint forwards verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEvent {
    /// One output line from the job's worker.
    Log { message: String },
    /// The job reached a terminal state before or during the stream.
    Status { status: JobStatus },
    /// The stream itself failed; carries the reason.
    Error { message: String },
    /// Always the final event of every subscription.
    Close,
}

/// Per-process fan-out of job output lines. Cheap to clone; clones share
/// state.
#[derive(Clone)]
pub struct LogBroker {
    queues: Arc<Mutex<HashMap<JobId, VecDeque<String>>>>,
    capacity: usize,
}

impl LogBroker {
    /// `capacity` is the per-job line bound (drop-oldest on overflow).
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Create the queue for a job about to produce output.
    pub fn open(&self, job_id: &str) {
        self.queues
            .lock()
            .unwrap()
            .insert(job_id.to_string(), VecDeque::with_capacity(64));
    }

    /// Tear down a job's queue. Idempotent; called by the supervisor on
    /// every exit path.
    pub fn close(&self, job_id: &str) {
        self.queues.lock().unwrap().remove(job_id);
    }

    /// Append one line to a job's queue, evicting the oldest line when
    /// full. Non-blocking; a no-op when the job has no active queue (not
    /// started, or already finished and torn down).
    pub fn publish(&self, job_id: &str, line: impl Into<String>) {
        let mut queues = self.queues.lock().unwrap();
        let Some(queue) = queues.get_mut(job_id) else {
            return;
        };
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(line.into());
    }

    /// Pop the next pending line, if any.
    fn pop(&self, job_id: &str) -> PopOutcome {
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(job_id) {
            Some(queue) => match queue.pop_front() {
                Some(line) => PopOutcome::Line(line),
                None => PopOutcome::Empty,
            },
            None => PopOutcome::NoQueue,
        }
    }

    /// Number of lines currently buffered for a job (None: no queue).
    pub fn depth(&self, job_id: &str) -> Option<usize> {
        self.queues.lock().unwrap().get(job_id).map(VecDeque::len)
    }

    /// Subscribe to a job's live output.
    ///
    /// The stream first replays the job's recorded `log_output` tail (so a
    /// late-joining client catches up), then yields newly published lines,
    /// polling every `poll_interval`. Termination, in priority order:
    ///
    /// 1. The queue is gone and the job's tracked status is terminal —
    ///    one `status` event, then `close`.
    /// 2. `max_idle_polls` consecutive polls saw no data — `close`
    ///    regardless of job state, so the connection is always eventually
    ///    released.
    ///
    /// Every stream ends with exactly one [`LogEvent::Close`].
    pub fn subscribe(
        &self,
        job_id: &str,
        tracker: &JobTracker,
        poll_interval: Duration,
        max_idle_polls: u32,
    ) -> impl Stream<Item = LogEvent> + Send + 'static {
        let (tx, rx) = tokio::sync::mpsc::channel::<LogEvent>(64);
        let broker = self.clone();
        let tracker = tracker.clone();
        let job_id = job_id.to_string();

        tokio::spawn(async move {
            // Catch-up replay from the authoritative snapshot.
            if let Ok(job) = tracker.get(&job_id) {
                if let Some(tail) = job.log_output {
                    for line in tail.lines().filter(|l| !l.trim().is_empty()) {
                        if tx
                            .send(LogEvent::Log {
                                message: line.to_string(),
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }

            let mut idle_polls: u32 = 0;
            while idle_polls < max_idle_polls {
                match broker.pop(&job_id) {
                    PopOutcome::Line(message) => {
                        idle_polls = 0;
                        if tx.send(LogEvent::Log { message }).await.is_err() {
                            return;
                        }
                    }
                    PopOutcome::Empty => {
                        idle_polls += 1;
                        tokio::time::sleep(poll_interval).await;
                    }
                    PopOutcome::NoQueue => {
                        // Worker finished (or never started). If the job is
                        // terminal, report that and stop; otherwise keep
                        // waiting — the queue may not exist yet.
                        if let Some(status) = tracker.status_of(&job_id) {
                            if status.is_terminal() {
                                let _ = tx.send(LogEvent::Status { status }).await;
                                break;
                            }
                        }
                        idle_polls += 1;
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }

            if idle_polls >= max_idle_polls {
                debug!(job = %job_id, "log stream idle ceiling reached, closing");
            }
            let _ = tx.send(LogEvent::Close).await;
        });

        ReceiverStream::new(rx)
    }
}

enum PopOutcome {
    Line(String),
    Empty,
    NoQueue,
}
