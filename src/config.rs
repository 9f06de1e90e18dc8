//! Configuration types for the redaction-and-extraction pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across tasks, serialise them for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One rectangular region to permanently blank on every document's first
/// page.
///
/// Coordinates are top-left-origin page points (`y` grows downward, the
/// convention the region set was measured in); the redaction engine
/// converts to PDF bottom-left space per page using the MediaBox.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionArea {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RedactionArea {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// The default region set: name, date of birth, and business registration
/// number on the first page of the standard tax-guidance notice layout.
pub fn default_redaction_areas() -> Vec<RedactionArea> {
    vec![
        // Name
        RedactionArea::new(190.0, 122.0, 270.0, 135.0),
        // Date of birth
        RedactionArea::new(430.0, 122.0, 510.0, 135.0),
        // Business registration number
        RedactionArea::new(60.0, 255.0, 170.0, 355.0),
    ]
}

/// Configuration for one pipeline instance.
///
/// # Example
/// ```rust
/// use taxdoc_redact::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .source_folder("pdfs")
///     .target_folder("masked-pdfs")
///     .batch_size(25)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Folder holding the original scanned PDFs. Read-only. Default: `pdfs`.
    pub source_folder: PathBuf,

    /// Folder receiving numbered, redacted outputs and the mapping
    /// artifact. Cleared of stale `.pdf` files on every run. Default:
    /// `masked-pdfs`.
    pub target_folder: PathBuf,

    /// Files per redaction batch. Default: 50.
    ///
    /// Batching bounds peak memory and open-file count and gives natural
    /// progress checkpoints. Processing stays strictly sequential within
    /// and across batches — this is not a parallelism knob.
    pub batch_size: usize,

    /// Regions blanked on every document's first page. Uniform across one
    /// run; no per-file customisation.
    pub redaction_areas: Vec<RedactionArea>,

    /// External extraction worker: program followed by its arguments.
    /// `None` means extraction jobs cannot be started.
    pub extract_command: Option<Vec<String>>,

    /// Maximum attempts per file for the extraction backend call.
    /// Default: 3.
    pub max_retries: u32,

    /// Fixed delay between extraction retry attempts, in milliseconds.
    /// Default: 5000.
    ///
    /// Fixed rather than exponential: retries here paper over transient
    /// vision-API hiccups on a pipeline that is already minutes long, so a
    /// constant pause is simpler and plenty.
    pub retry_backoff_ms: u64,

    /// Per-job live-log queue capacity in lines. Default: 1000.
    ///
    /// When full, the oldest line is dropped to admit the newest. Slow
    /// stream consumers must never grow memory unboundedly.
    pub log_queue_capacity: usize,

    /// Subscriber poll interval for the live log stream, in milliseconds.
    /// Default: 500.
    pub stream_poll_ms: u64,

    /// Consecutive empty polls before a log-stream subscription gives up
    /// and closes, releasing the connection. Default: 300 (~2.5 min at the
    /// default poll interval).
    pub stream_max_idle_polls: u32,

    /// Trailing output lines mirrored into the job record's `log_output`
    /// snapshot. Default: 50.
    pub log_tail_lines: usize,

    /// Path to the extraction backend's credentials file, if any. Only its
    /// configured-ness and on-disk presence are reported by the health
    /// check; the file is never read here.
    pub credentials_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_folder: PathBuf::from("pdfs"),
            target_folder: PathBuf::from("masked-pdfs"),
            batch_size: 50,
            redaction_areas: default_redaction_areas(),
            extract_command: None,
            max_retries: 3,
            retry_backoff_ms: 5000,
            log_queue_capacity: 1000,
            stream_poll_ms: 500,
            stream_max_idle_polls: 300,
            log_tail_lines: 50,
            credentials_path: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn source_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source_folder = path.into();
        self
    }

    pub fn target_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.target_folder = path.into();
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn redaction_areas(mut self, areas: Vec<RedactionArea>) -> Self {
        self.config.redaction_areas = areas;
        self
    }

    pub fn extract_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extract_command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn log_queue_capacity(mut self, n: usize) -> Self {
        self.config.log_queue_capacity = n.max(1);
        self
    }

    pub fn stream_poll_ms(mut self, ms: u64) -> Self {
        self.config.stream_poll_ms = ms.max(1);
        self
    }

    pub fn stream_max_idle_polls(mut self, n: u32) -> Self {
        self.config.stream_max_idle_polls = n.max(1);
        self
    }

    pub fn log_tail_lines(mut self, n: usize) -> Self {
        self.config.log_tail_lines = n.max(1);
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.batch_size == 0 {
            return Err(PipelineError::InvalidConfig("batch_size must be ≥ 1".into()));
        }
        if c.source_folder == c.target_folder {
            return Err(PipelineError::InvalidConfig(
                "source and target folders must differ (the target is cleared on every run)".into(),
            ));
        }
        if let Some(cmd) = &c.extract_command {
            if cmd.is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "extract_command must name a program".into(),
                ));
            }
        }
        for (i, a) in c.redaction_areas.iter().enumerate() {
            if a.width() <= 0.0 || a.height() <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "redaction area {i} is degenerate: {a:?}"
                )));
            }
        }
        Ok(self.config)
    }
}
