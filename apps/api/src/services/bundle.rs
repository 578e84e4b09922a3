//! Print bundle: every PDF of a prescription in one ZIP archive.
//!
//! Entry order is main PDF, extra copy (when flagged), then e-tickets by id.
//! All files are checked before the archive is built, so a missing file
//! never yields a partial download.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use apotek_core::filename;
use apotek_core::Id;
use apotek_db::{Database, PrescriptionRepository};

use crate::error::{ApiError, ApiResult};
use crate::services::artifact;

/// Download name sent in `Content-Disposition`.
pub const BUNDLE_FILENAME: &str = "pdfFiles.zip";

/// One archive member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Name inside the archive (the bare filename).
    pub name: String,
    pub path: PathBuf,
}

/// Lists the files of prescription `id` in archive order.
pub async fn collect(db: &Database, root: &Path, id: Id) -> ApiResult<Vec<BundleEntry>> {
    let mut conn = db.acquire().await?;
    let mut repo = PrescriptionRepository::new(&mut conn);

    let prescription = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::ReferenceNotFound(format!("prescription {} doesn't exists", id)))?;

    if prescription.pdf_url.is_empty() {
        return Err(ApiError::ArtifactMissing(format!(
            "prescription {} has no PDF",
            id
        )));
    }

    let mut entries = vec![BundleEntry {
        name: prescription.pdf_url.clone(),
        path: artifact::prescription_path(root, &prescription.pdf_url),
    }];

    if prescription.print_extra_pdf {
        entries.push(BundleEntry {
            name: filename::extra_filename(&prescription.pdf_url),
            path: artifact::extra_path(root, &prescription.pdf_url),
        });
    }

    for eticket in repo.get_etickets(id).await? {
        if eticket.pdf_url.is_empty() {
            return Err(ApiError::ArtifactMissing(format!(
                "e-ticket {} has no PDF",
                eticket.id
            )));
        }
        entries.push(BundleEntry {
            path: artifact::eticket_path(root, &eticket.pdf_url),
            name: eticket.pdf_url,
        });
    }

    Ok(entries)
}

/// Builds the archive in memory.
pub fn build_zip(entries: &[BundleEntry]) -> ApiResult<Vec<u8>> {
    if let Some(missing) = entries.iter().find(|entry| !entry.path.is_file()) {
        return Err(ApiError::ArtifactMissing(format!("{} not found", missing.name)));
    }

    let zip_error = |e: zip::result::ZipError| ApiError::Artifact(format!("ZIP write failed: {}", e));
    let io_error = |e: std::io::Error| ApiError::Artifact(format!("ZIP write failed: {}", e));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        let bytes = std::fs::read(&entry.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ApiError::ArtifactMissing(format!("{} not found", entry.name)),
            _ => io_error(e),
        })?;

        zip.start_file(entry.name.as_str(), options).map_err(zip_error)?;
        zip.write_all(&bytes).map_err(io_error)?;
        debug!(file = %entry.name, bytes = bytes.len(), "Added to print bundle");
    }

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

/// Collects and zips the PDFs of prescription `id`.
pub async fn assemble(db: &Database, root: &Path, id: Id) -> ApiResult<Vec<u8>> {
    let entries = collect(db, root, id).await?;

    tokio::task::spawn_blocking(move || build_zip(&entries))
        .await
        .map_err(|e| ApiError::Artifact(format!("bundle task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn archive_names(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_build_zip_keeps_order_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("p-a.pdf");
        let label = dir.path().join("e-b.pdf");
        std::fs::write(&main, "main").unwrap();
        std::fs::write(&label, "label").unwrap();

        let bytes = build_zip(&[
            BundleEntry {
                name: "p-a.pdf".to_string(),
                path: main,
            },
            BundleEntry {
                name: "e-b.pdf".to_string(),
                path: label,
            },
        ])
        .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes.clone())).unwrap();
        let mut content = String::new();
        archive.by_name("e-b.pdf").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "label");

        assert_eq!(archive_names(bytes), vec!["p-a.pdf", "e-b.pdf"]);
    }

    #[test]
    fn test_missing_file_fails_whole_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("p-a.pdf");
        std::fs::write(&main, "main").unwrap();

        let err = build_zip(&[
            BundleEntry {
                name: "p-a.pdf".to_string(),
                path: main,
            },
            BundleEntry {
                name: "e-gone.pdf".to_string(),
                path: dir.path().join("e-gone.pdf"),
            },
        ])
        .unwrap_err();

        assert!(matches!(err, ApiError::ArtifactMissing(msg) if msg == "e-gone.pdf not found"));
    }
}
