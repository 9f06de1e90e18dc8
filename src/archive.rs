//! Bulk download: bundle a redaction run's outputs into one archive.
//!
//! Packages every `.pdf` in the target folder plus the mapping artifact
//! (when present) into a single ZIP for retrieval. The mapping rides
//! along deliberately: the numbered outputs are meaningless without it.

use crate::error::PipelineError;
use crate::mapping::MAPPING_FILE;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// What went into a bundle.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub output_path: PathBuf,
    pub pdf_count: usize,
    pub includes_mapping: bool,
}

/// Default archive filename, stamped to the second so repeated downloads
/// don't collide.
pub fn default_bundle_name() -> String {
    format!(
        "masked_pdfs_{}.zip",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Bundle the target folder's `.pdf` outputs and mapping into a ZIP at
/// `output_path`.
///
/// Fails when the target folder is missing or holds no PDFs — an empty
/// archive would only mask an operator mistake.
pub fn bundle_target(target_folder: &Path, output_path: &Path) -> Result<ArchiveSummary, PipelineError> {
    if !target_folder.exists() {
        return Err(PipelineError::FolderNotFound {
            path: target_folder.to_path_buf(),
        });
    }

    // Numeric order inside the archive, same as everywhere else.
    let pdfs = crate::redact::list_pdfs_ordered(target_folder)?;
    if pdfs.is_empty() {
        return Err(PipelineError::NoPdfFiles {
            path: target_folder.to_path_buf(),
        });
    }

    let file = File::create(output_path).map_err(|source| PipelineError::Io {
        path: output_path.to_path_buf(),
        source,
    })?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for name in &pdfs {
        add_file(&mut writer, &target_folder.join(name), name, options)?;
    }

    let mapping_path = target_folder.join(MAPPING_FILE);
    let includes_mapping = mapping_path.exists();
    if includes_mapping {
        add_file(&mut writer, &mapping_path, MAPPING_FILE, options)?;
    }

    writer
        .finish()
        .map_err(|e| PipelineError::ArchiveFailed(e.to_string()))?;

    info!(
        archive = %output_path.display(),
        pdfs = pdfs.len(),
        includes_mapping,
        "bundle written"
    );

    Ok(ArchiveSummary {
        output_path: output_path.to_path_buf(),
        pdf_count: pdfs.len(),
        includes_mapping,
    })
}

fn add_file(
    writer: &mut ZipWriter<File>,
    path: &Path,
    entry_name: &str,
    options: SimpleFileOptions,
) -> Result<(), PipelineError> {
    writer
        .start_file(entry_name, options)
        .map_err(|e| PipelineError::ArchiveFailed(e.to_string()))?;
    let mut source = File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    io::copy(&mut source, writer).map_err(|e| PipelineError::ArchiveFailed(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_target_fails() {
        let out = TempDir::new().expect("out");
        let err = bundle_target(Path::new("/not/here"), &out.path().join("a.zip"))
            .expect_err("must fail");
        assert!(matches!(err, PipelineError::FolderNotFound { .. }));
    }

    #[test]
    fn empty_target_fails() {
        let target = TempDir::new().expect("target");
        let out = TempDir::new().expect("out");
        let err =
            bundle_target(target.path(), &out.path().join("a.zip")).expect_err("must fail");
        assert!(matches!(err, PipelineError::NoPdfFiles { .. }));
    }

    #[test]
    fn bundle_contains_pdfs_and_mapping() {
        let target = TempDir::new().expect("target");
        let out = TempDir::new().expect("out");
        for name in ["1.pdf", "2.pdf"] {
            std::fs::write(target.path().join(name), b"pdf bytes").expect("write");
        }
        std::fs::write(target.path().join(MAPPING_FILE), b"[]").expect("write");

        let zip_path = out.path().join("bundle.zip");
        let summary = bundle_target(target.path(), &zip_path).expect("bundle");
        assert_eq!(summary.pdf_count, 2);
        assert!(summary.includes_mapping);

        let mut archive =
            zip::ZipArchive::new(File::open(&zip_path).expect("open")).expect("read zip");
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect();
        assert_eq!(names, vec!["1.pdf", "2.pdf", MAPPING_FILE]);
    }

    #[test]
    fn bundle_without_mapping_still_works() {
        let target = TempDir::new().expect("target");
        let out = TempDir::new().expect("out");
        std::fs::write(target.path().join("1.pdf"), b"pdf bytes").expect("write");

        let summary =
            bundle_target(target.path(), &out.path().join("b.zip")).expect("bundle");
        assert_eq!(summary.pdf_count, 1);
        assert!(!summary.includes_mapping);
    }

    #[test]
    fn default_name_is_zip() {
        let name = default_bundle_name();
        assert!(name.starts_with("masked_pdfs_"));
        assert!(name.ends_with(".zip"));
    }
}
