//! Operational health report.
//!
//! Answers "is this instance wired up?" — folder existence and counts,
//! whether an extraction command and credentials are configured, and
//! whether the credentials file is on disk. Presence only: nothing here
//! validates credentials or talks to any backend.

use crate::config::PipelineConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct FolderHealth {
    pub path: PathBuf,
    pub exists: bool,
    pub pdf_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionHealth {
    pub command_configured: bool,
    pub credentials_configured: bool,
    pub credentials_present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub source: FolderHealth,
    pub target: FolderHealth,
    pub extraction: ExtractionHealth,
    pub batch_size: usize,
}

/// Snapshot the instance's wiring.
pub fn check(config: &PipelineConfig) -> HealthReport {
    let credentials_present = config
        .credentials_path
        .as_deref()
        .map(Path::exists)
        .unwrap_or(false);

    HealthReport {
        status: "healthy",
        timestamp: Utc::now(),
        source: folder_health(&config.source_folder),
        target: folder_health(&config.target_folder),
        extraction: ExtractionHealth {
            command_configured: config.extract_command.is_some(),
            credentials_configured: config.credentials_path.is_some(),
            credentials_present,
        },
        batch_size: config.batch_size,
    }
}

fn folder_health(path: &Path) -> FolderHealth {
    let exists = path.exists();
    let pdf_count = if exists {
        fs::read_dir(path)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| {
                        e.file_name()
                            .to_string_lossy()
                            .to_lowercase()
                            .ends_with(".pdf")
                    })
                    .count()
            })
            .unwrap_or(0)
    } else {
        0
    };
    FolderHealth {
        path: path.to_path_buf(),
        exists,
        pdf_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reports_folder_counts() {
        let source = TempDir::new().expect("source");
        let target_parent = TempDir::new().expect("target parent");
        std::fs::write(source.path().join("1.pdf"), b"x").expect("write");
        std::fs::write(source.path().join("notes.txt"), b"x").expect("write");

        let config = PipelineConfig::builder()
            .source_folder(source.path())
            .target_folder(target_parent.path().join("missing"))
            .build()
            .expect("config");

        let report = check(&config);
        assert_eq!(report.status, "healthy");
        assert!(report.source.exists);
        assert_eq!(report.source.pdf_count, 1);
        assert!(!report.target.exists);
        assert_eq!(report.target.pdf_count, 0);
    }

    #[test]
    fn reports_extraction_wiring() {
        let creds = TempDir::new().expect("creds");
        let creds_file = creds.path().join("sa.json");
        std::fs::write(&creds_file, b"{}").expect("write");

        let config = PipelineConfig::builder()
            .extract_command(["worker"])
            .credentials_path(&creds_file)
            .build()
            .expect("config");
        let report = check(&config);
        assert!(report.extraction.command_configured);
        assert!(report.extraction.credentials_configured);
        assert!(report.extraction.credentials_present);

        let bare = check(&PipelineConfig::default());
        assert!(!bare.extraction.command_configured);
        assert!(!bare.extraction.credentials_configured);
        assert!(!bare.extraction.credentials_present);
    }

    #[test]
    fn report_serialises() {
        let report = check(&PipelineConfig::default());
        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["status"], "healthy");
        assert!(json["extraction"]["command_configured"].is_boolean());
    }
}
