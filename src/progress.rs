//! Progress-sink trait for batch run events.
//!
//! Inject an [`Arc<dyn ProgressSink>`] into [`crate::redact::redact_all`]
//! (or let [`crate::jobs::spawn_redaction`] wire one to the job tracker) to
//! receive status/percent/message updates as a run advances.
//!
//! # Why a sink instead of channels?
//!
//! The sink is the least-invasive integration point: callers can forward
//! updates to the in-memory job tracker, a terminal progress bar, or a
//! push stream — without the redaction engine knowing anything about how
//! the host application surfaces progress. The trait is `Send + Sync`
//! because runs execute on background tasks.

use crate::jobs::JobStatus;
use std::sync::Arc;

/// Called by a batch run as it advances.
///
/// `percent` is 0–100 and non-decreasing within one run. `message` is a
/// human-readable status line, already formatted.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, status: JobStatus, percent: u8, message: &str);
}

/// A no-op sink for callers that don't need progress events.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn on_progress(&self, _status: JobStatus, _percent: u8, _message: &str) {}
}

/// Convenience alias matching the type the run entry points accept.
pub type SharedProgressSink = Arc<dyn ProgressSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        events: Mutex<Vec<(JobStatus, u8, String)>>,
    }

    impl ProgressSink for Recording {
        fn on_progress(&self, status: JobStatus, percent: u8, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push((status, percent, message.to_string()));
        }
    }

    #[test]
    fn noop_sink_does_not_panic() {
        let sink = NoopProgressSink;
        sink.on_progress(JobStatus::Running, 50, "half way");
        sink.on_progress(JobStatus::Completed, 100, "done");
    }

    #[test]
    fn recording_sink_receives_events() {
        let sink = Recording {
            events: Mutex::new(Vec::new()),
        };
        sink.on_progress(JobStatus::Running, 10, "scanning");
        sink.on_progress(JobStatus::Running, 90, "finalising");
        sink.on_progress(JobStatus::Completed, 100, "done");

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].1, 10);
        assert_eq!(events[2].0, JobStatus::Completed);
    }

    #[test]
    fn arc_dyn_sink_works() {
        let sink: SharedProgressSink = Arc::new(NoopProgressSink);
        sink.on_progress(JobStatus::Pending, 0, "queued");
    }
}
