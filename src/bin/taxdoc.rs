//! CLI binary for taxdoc-redact.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use taxdoc_redact::{
    archive, health_check, jobs, reconcile, redact_all, scan, JobStatus, JobTracker, LogBroker,
    LogEvent, PipelineConfig, ProgressSink,
};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "taxdoc",
    version,
    about = "Batch-redact scanned tax-document PDFs and drive field extraction"
)]
struct Cli {
    /// Folder holding the original scanned PDFs
    #[arg(long, global = true, default_value = "pdfs", env = "TAXDOC_SOURCE")]
    source: PathBuf,

    /// Folder receiving numbered, redacted outputs
    #[arg(long, global = true, default_value = "masked-pdfs", env = "TAXDOC_TARGET")]
    target: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the source folder's PDFs in processing order
    Scan,
    /// Redact every source PDF into the target folder
    Redact {
        /// Files per batch
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
    },
    /// Run the extraction worker against the target folder, streaming its log
    Extract {
        /// Worker command and arguments (after --)
        #[arg(last = true, required = true)]
        worker: Vec<String>,
    },
    /// Print the ordered personal-info entries for the current run
    Reconcile,
    /// Bundle the target folder's outputs into a ZIP
    Archive {
        /// Output path; defaults to a timestamped name in the current folder
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Report folder and extraction wiring status
    Health,
}

/// Terminal progress sink: one bar over the run's 0–100 percent scale.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Redacting");
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&self, _status: JobStatus, percent: u8, message: &str) {
        self.bar.set_position(percent as u64);
        self.bar.set_message(message.to_string());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let builder = PipelineConfig::builder()
        .source_folder(&cli.source)
        .target_folder(&cli.target);

    match cli.command {
        Commands::Scan => {
            let config = builder.build()?;
            let result = scan(&config.source_folder).context("scan failed")?;
            for file in &result.files {
                println!("{:>10}  {}", file.size_bytes, file.filename);
            }
            println!(
                "{}",
                bold(&format!(
                    "{} files, {} bytes total",
                    result.count, result.total_size_bytes
                ))
            );
        }

        Commands::Redact { batch_size } => {
            let config = builder.batch_size(batch_size).build()?;
            let sink = Arc::new(BarSink::new());
            let run_sink = Arc::clone(&sink);
            let outcome =
                tokio::task::spawn_blocking(move || redact_all(&config, &*run_sink))
                    .await
                    .context("redaction task panicked")??;
            sink.bar.finish_and_clear();

            println!(
                "{} {}",
                green("✓"),
                bold(&format!(
                    "{} files redacted into {}",
                    outcome.total_processed,
                    outcome.target_folder.display()
                ))
            );
            for failure in &outcome.failures {
                println!("  {} {}", red("✗"), failure);
            }
            if !outcome.failures.is_empty() {
                println!("{}", dim(&format!("{} files skipped", outcome.failures.len())));
            }
        }

        Commands::Extract { worker } => {
            let config = builder.extract_command(worker).build()?;
            let tracker = JobTracker::new();
            let broker = LogBroker::new(config.log_queue_capacity);
            let poll = std::time::Duration::from_millis(config.stream_poll_ms);
            let max_idle = config.stream_max_idle_polls;

            let job_id = jobs::spawn_extraction(&tracker, &broker, config)
                .context("could not start extraction")?;
            println!("{}", dim(&format!("job {job_id}")));

            let mut stream = broker.subscribe(&job_id, &tracker, poll, max_idle);
            while let Some(event) = stream.next().await {
                match event {
                    LogEvent::Log { message } => println!("{message}"),
                    LogEvent::Status { status } => {
                        println!("{}", dim(&format!("job finished: {status:?}")))
                    }
                    LogEvent::Error { message } => println!("{} {message}", red("stream error:")),
                    LogEvent::Close => break,
                }
            }

            let job = tracker.get(&job_id)?;
            match job.status {
                JobStatus::Completed => {
                    println!("{} {}", green("✓"), bold("extraction complete"));
                }
                status => {
                    let detail = job.error.unwrap_or_else(|| format!("{status:?}"));
                    bail!("extraction did not complete: {detail}");
                }
            }
        }

        Commands::Reconcile => {
            let config = builder.build()?;
            let entries = reconcile(&config.source_folder, &config.target_folder)?;
            for entry in &entries {
                println!("{:>4}  {:4}  {}", entry.order, entry.code, entry.original_filename);
            }
            println!("{}", bold(&format!("{} entries", entries.len())));
        }

        Commands::Archive { output } => {
            let config = builder.build()?;
            let output = output.unwrap_or_else(|| PathBuf::from(archive::default_bundle_name()));
            let summary = archive::bundle_target(&config.target_folder, &output)?;
            println!(
                "{} {}",
                green("✓"),
                bold(&format!(
                    "{} PDFs{} → {}",
                    summary.pdf_count,
                    if summary.includes_mapping {
                        " + mapping"
                    } else {
                        ""
                    },
                    summary.output_path.display()
                ))
            );
        }

        Commands::Health => {
            let config = builder.build()?;
            let report = health_check(&config);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
