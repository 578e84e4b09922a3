//! # PDF Engine
//!
//! The engine turns a document from `apotek_core::document` into a file at
//! a path chosen by the caller. It owns layout and typography only; naming,
//! directories and bookkeeping belong to the artifact coordinator.
//!
//! ```text
//! PrescriptionDocument ──┐
//!                        ├──► PdfEngine ──► <static>/prescription/p-XXXXXX-XXXXXX.pdf
//! EticketDocument ───────┘                  <static>/eticket/e-XXXXXX-XXXXXX.pdf
//! ```

mod printpdf_engine;

use std::path::Path;

use apotek_core::document::{EticketDocument, PrescriptionDocument};

pub use printpdf_engine::PrintPdfEngine;

use crate::config::ApiConfig;
use crate::error::ApiError;

/// Failure while producing or moving a PDF file.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("PDF file I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(err: ArtifactError) -> Self {
        ApiError::Artifact(err.to_string())
    }
}

/// Letterhead printed above every prescription copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionHeader {
    pub company_name: String,
    pub pharmacist: String,
    pub pharmacist_license: String,
}

impl PrescriptionHeader {
    pub fn from_config(config: &ApiConfig) -> Self {
        PrescriptionHeader {
            company_name: config.company_name.clone(),
            pharmacist: config.pharmacist.clone(),
            pharmacist_license: config.pharmacist_license.clone(),
        }
    }

    /// "apt. Budi  SIPA 123", empty when neither is configured.
    pub fn pharmacist_line(&self) -> String {
        format!("{}  {}", self.pharmacist, self.pharmacist_license)
            .trim()
            .to_string()
    }
}

/// Renders prescription documents to files.
///
/// Implementations are blocking; callers run them on the request task since
/// a label is a few kilobytes.
pub trait PdfEngine: Send + Sync {
    /// Writes the main (or extra) prescription PDF to `path`.
    fn render_prescription(
        &self,
        doc: &PrescriptionDocument,
        header: &PrescriptionHeader,
        path: &Path,
    ) -> Result<(), ArtifactError>;

    /// Writes one e-ticket label to `path`.
    fn render_eticket(&self, doc: &EticketDocument, path: &Path) -> Result<(), ArtifactError>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pharmacist_line() {
        let header = PrescriptionHeader::from_config(&ApiConfig::for_static_dir("/tmp"));
        assert_eq!(header.company_name, "Apotek Sehat");
        assert_eq!(header.pharmacist_line(), "apt. Budi  SIPA 123");

        let empty = PrescriptionHeader {
            company_name: "Apotek".to_string(),
            pharmacist: String::new(),
            pharmacist_license: String::new(),
        };
        assert_eq!(empty.pharmacist_line(), "");
    }
}
