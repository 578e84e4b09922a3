//! # Artifact Coordinator
//!
//! Owns the PDF files a single register/modify transaction produces.
//!
//! ## Lifecycle
//! ```text
//! begin tx ──► ArtifactCoordinator::new()
//!                 │
//!                 ├── render_eticket()        e-XXXXXX-XXXXXX.pdf   (tracked)
//!                 ├── render_prescription()   p-XXXXXX-XXXXXX.pdf   (tracked)
//!                 ├── rerender_prescription() p-....pdf.tmp         (staged)
//!                 └── render_extra()          extra/ep-....pdf      (tracked)
//!                 │
//!        ┌────────┴─────────┐
//!        ▼                  ▼
//!   tx.commit()        tx.rollback()
//!   commit():          rollback():
//!   - rename staged    - remove tracked and staged files
//!   - drop obsolete
//! ```
//!
//! ## Directory Layout
//! ```text
//! <static>/prescription/p-XXXXXX-XXXXXX.pdf
//! <static>/prescription/extra/ep-XXXXXX-XXXXXX.pdf
//! <static>/eticket/e-XXXXXX-XXXXXX.pdf
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::SqliteConnection;
use tracing::{debug, warn};

use apotek_core::document::{EticketDocument, PrescriptionDocument};
use apotek_core::filename::{self, ArtifactKind};
use apotek_db::PrescriptionRepository;

use crate::error::ApiResult;
use crate::pdf::{ArtifactError, PdfEngine, PrescriptionHeader};

const PRESCRIPTION_DIR: &str = "prescription";
const EXTRA_DIR: &str = "extra";
const ETICKET_DIR: &str = "eticket";
const STAGING_SUFFIX: &str = ".tmp";

// =============================================================================
// Paths
// =============================================================================

/// `<root>/prescription/<name>`
pub fn prescription_path(root: &Path, name: &str) -> PathBuf {
    root.join(PRESCRIPTION_DIR).join(name)
}

/// `<root>/prescription/extra/e<name>`
pub fn extra_path(root: &Path, main_name: &str) -> PathBuf {
    root.join(PRESCRIPTION_DIR)
        .join(EXTRA_DIR)
        .join(filename::extra_filename(main_name))
}

/// `<root>/eticket/<name>`
pub fn eticket_path(root: &Path, name: &str) -> PathBuf {
    root.join(ETICKET_DIR).join(name)
}

/// Creates the three artifact directories below `root`.
pub fn ensure_layout(root: &Path) -> Result<(), ArtifactError> {
    for dir in [
        root.join(PRESCRIPTION_DIR).join(EXTRA_DIR),
        root.join(ETICKET_DIR),
    ] {
        std::fs::create_dir_all(&dir).map_err(|e| ArtifactError::io(&dir, e))?;
    }
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

fn directory_of(kind: ArtifactKind, root: &Path, name: &str) -> PathBuf {
    match kind {
        ArtifactKind::Prescription => prescription_path(root, name),
        ArtifactKind::Eticket => eticket_path(root, name),
    }
}

// =============================================================================
// Coordinator
// =============================================================================

/// Renders PDFs inside a transaction and settles them when it ends.
pub struct ArtifactCoordinator {
    engine: Arc<dyn PdfEngine>,
    root: PathBuf,
    header: PrescriptionHeader,
    /// Source of candidate filenames.
    rng: StdRng,
    /// Files that exist only because of this unit of work.
    written: Vec<PathBuf>,
    /// (staging file, final path) pairs moved into place on commit.
    staged: Vec<(PathBuf, PathBuf)>,
    /// Files replaced by this unit of work, removed on commit.
    obsolete: Vec<PathBuf>,
}

impl ArtifactCoordinator {
    pub fn new(engine: Arc<dyn PdfEngine>, root: impl Into<PathBuf>, header: PrescriptionHeader) -> Self {
        ArtifactCoordinator {
            engine,
            root: root.into(),
            header,
            rng: StdRng::from_entropy(),
            written: Vec::new(),
            staged: Vec::new(),
            obsolete: Vec::new(),
        }
    }

    /// Draws filenames from `rng` instead of an entropy-seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Picks a filename that neither the kind's table nor the disk knows.
    pub async fn allocate(&mut self, conn: &mut SqliteConnection, kind: ArtifactKind) -> ApiResult<String> {
        loop {
            let candidate = filename::generate_with(kind, &mut self.rng);

            let taken = PrescriptionRepository::new(&mut *conn)
                .is_pdf_url_exist(kind, &candidate)
                .await?;

            if !taken && !directory_of(kind, &self.root, &candidate).exists() {
                return Ok(candidate);
            }

            debug!(file = %candidate, "Filename collision, regenerating");
        }
    }

    /// Renders a new main prescription PDF and returns its filename.
    pub async fn render_prescription(
        &mut self,
        conn: &mut SqliteConnection,
        doc: &PrescriptionDocument,
    ) -> ApiResult<String> {
        let name = self.allocate(conn, ArtifactKind::Prescription).await?;
        let path = prescription_path(&self.root, &name);

        self.written.push(path.clone());
        self.engine.render_prescription(doc, &self.header, &path)?;

        debug!(file = %name, number = doc.number, "Prescription PDF written");
        Ok(name)
    }

    /// Renders the main PDF again under `existing`.
    ///
    /// The current file stays untouched until [`commit`](Self::commit).
    pub fn rerender_prescription(&mut self, doc: &PrescriptionDocument, existing: &str) -> Result<(), ArtifactError> {
        let target = prescription_path(&self.root, existing);
        let staging = staging_path(&target);

        self.written.push(staging.clone());
        self.engine.render_prescription(doc, &self.header, &staging)?;
        self.staged.push((staging, target));
        Ok(())
    }

    /// Renders the extra copy next to the main PDF named `main_name`.
    ///
    /// An existing copy is replaced on commit.
    pub fn render_extra(&mut self, doc: &PrescriptionDocument, main_name: &str) -> Result<(), ArtifactError> {
        let target = extra_path(&self.root, main_name);
        let replacing = target.exists();
        let path = if replacing { staging_path(&target) } else { target.clone() };

        if let Err(e) = self.engine.render_prescription(doc, &self.header, &path) {
            // Failure here is not fatal to the transaction; leave nothing behind.
            if path.exists() {
                if let Err(io) = std::fs::remove_file(&path) {
                    warn!(file = %path.display(), error = %io, "Failed to remove partial extra PDF");
                }
            }
            return Err(e);
        }

        self.written.push(path.clone());
        if replacing {
            self.staged.push((path, target));
        }

        Ok(())
    }

    /// Renders one e-ticket label and returns its filename.
    pub async fn render_eticket(&mut self, conn: &mut SqliteConnection, doc: &EticketDocument) -> ApiResult<String> {
        let name = self.allocate(conn, ArtifactKind::Eticket).await?;
        let path = eticket_path(&self.root, &name);

        self.written.push(path.clone());
        self.engine.render_eticket(doc, &path)?;

        debug!(file = %name, number = doc.number, set_number = doc.set_number, "E-ticket PDF written");
        Ok(name)
    }

    /// Marks an e-ticket file for removal once the transaction commits.
    pub fn retire_eticket(&mut self, name: &str) {
        if !name.is_empty() {
            self.obsolete.push(eticket_path(&self.root, name));
        }
    }

    /// Marks the extra copy of `main_name` for removal once the transaction commits.
    pub fn retire_extra(&mut self, main_name: &str) {
        if !main_name.is_empty() {
            self.obsolete.push(extra_path(&self.root, main_name));
        }
    }

    /// Settles files after the database transaction committed.
    ///
    /// The rows already point at the final names, so file moves that fail
    /// here are logged rather than returned.
    pub fn commit(mut self) {
        for (staging, target) in std::mem::take(&mut self.staged) {
            if let Err(e) = std::fs::rename(&staging, &target) {
                warn!(file = %target.display(), error = %e, "Failed to move regenerated PDF into place");
            }
        }

        for path in std::mem::take(&mut self.obsolete) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(file = %path.display(), error = %e, "Failed to remove replaced PDF");
                }
            }
        }

        self.written.clear();
    }

    /// Removes every file this unit of work wrote.
    pub fn rollback(mut self) {
        for path in std::mem::take(&mut self.written) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(file = %path.display(), "Removed PDF after rollback"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove PDF after rollback"),
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::testing::RecordingPdfEngine;
    use crate::services::prescription::PrescriptionService;
    use crate::test_support::{register_payload, TestApp};
    use apotek_db::Database;
    use apotek_db::DbConfig;
    use chrono::{FixedOffset, TimeZone};

    fn header() -> PrescriptionHeader {
        PrescriptionHeader {
            company_name: "Apotek".to_string(),
            pharmacist: String::new(),
            pharmacist_license: String::new(),
        }
    }

    fn document() -> PrescriptionDocument {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        PrescriptionDocument {
            number: 7,
            date: offset.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
            patient_name: "Alice".to_string(),
            patient_age: 30,
            doctor_name: "Dr. B".to_string(),
            sets: vec![],
        }
    }

    fn coordinator(root: &Path) -> ArtifactCoordinator {
        ensure_layout(root).unwrap();
        ArtifactCoordinator::new(Arc::new(RecordingPdfEngine::default()), root, header())
    }

    /// First two names a coordinator seeded with `seed` will try.
    fn seeded_candidates(kind: ArtifactKind, seed: u64) -> (String, String) {
        let mut rng = StdRng::seed_from_u64(seed);
        (filename::generate_with(kind, &mut rng), filename::generate_with(kind, &mut rng))
    }

    #[tokio::test]
    async fn test_allocate_skips_name_already_in_database() {
        let app = TestApp::new().await;
        let created = PrescriptionService::new(app.state.clone())
            .register(&app.admin, &register_payload(7, "1"))
            .await
            .unwrap();
        let id = app.prescription_id(7).await;
        let (first, second) = seeded_candidates(ArtifactKind::Prescription, 11);

        let mut conn = app.state.db.acquire().await.unwrap();
        PrescriptionRepository::new(&mut conn)
            .update_pdf_url(ArtifactKind::Prescription, id, &first)
            .await
            .unwrap();
        assert!(!app.prescription_file(&first).exists());
        assert_ne!(created.prescription_pdf, first);

        let mut artifacts = coordinator(app.root()).with_rng(StdRng::seed_from_u64(11));
        let name = artifacts.allocate(&mut conn, ArtifactKind::Prescription).await.unwrap();

        assert_ne!(name, first);
        assert_eq!(name, second);
    }

    #[tokio::test]
    async fn test_allocate_skips_name_already_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let (first, second) = seeded_candidates(ArtifactKind::Eticket, 5);

        let mut artifacts = coordinator(dir.path()).with_rng(StdRng::seed_from_u64(5));
        std::fs::write(eticket_path(dir.path(), &first), "stray").unwrap();

        let name = artifacts.allocate(&mut conn, ArtifactKind::Eticket).await.unwrap();
        assert_ne!(name, first);
        assert_eq!(name, second);
    }

    #[test]
    fn test_paths() {
        let root = Path::new("/srv/pdf");
        assert_eq!(
            prescription_path(root, "p-a.pdf"),
            PathBuf::from("/srv/pdf/prescription/p-a.pdf")
        );
        assert_eq!(
            extra_path(root, "p-a.pdf"),
            PathBuf::from("/srv/pdf/prescription/extra/ep-a.pdf")
        );
        assert_eq!(eticket_path(root, "e-a.pdf"), PathBuf::from("/srv/pdf/eticket/e-a.pdf"));
    }

    #[tokio::test]
    async fn test_rollback_removes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let mut artifacts = coordinator(dir.path());
        let name = artifacts.render_prescription(&mut conn, &document()).await.unwrap();
        artifacts.render_extra(&document(), &name).unwrap();

        let main = prescription_path(dir.path(), &name);
        let extra = extra_path(dir.path(), &name);
        assert!(main.exists());
        assert!(extra.exists());
        assert!(filename::is_well_formed(ArtifactKind::Prescription, &name));

        artifacts.rollback();
        assert!(!main.exists());
        assert!(!extra.exists());
    }

    #[tokio::test]
    async fn test_rerender_replaces_file_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).unwrap();
        let target = prescription_path(dir.path(), "p-AAAAAA-BBBBBB.pdf");
        std::fs::write(&target, "old").unwrap();

        let engine = Arc::new(RecordingPdfEngine::default());
        let mut artifacts = ArtifactCoordinator::new(engine.clone(), dir.path(), header());
        artifacts.rerender_prescription(&document(), "p-AAAAAA-BBBBBB.pdf").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(engine.prescription_count(), 1);
        assert_eq!(engine.last_prescription().map(|doc| doc.number), Some(7));

        artifacts.commit();
        assert_ne!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(!staging_path(&target).exists());
    }

    #[tokio::test]
    async fn test_rerender_rollback_keeps_old_file() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).unwrap();
        let target = prescription_path(dir.path(), "p-AAAAAA-BBBBBB.pdf");
        std::fs::write(&target, "old").unwrap();

        let mut artifacts = coordinator(dir.path());
        artifacts.rerender_prescription(&document(), "p-AAAAAA-BBBBBB.pdf").unwrap();
        artifacts.retire_eticket("e-CCCCCC-DDDDDD.pdf");
        artifacts.rollback();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(!staging_path(&target).exists());
    }

    #[tokio::test]
    async fn test_commit_removes_retired_etickets() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).unwrap();
        let old = eticket_path(dir.path(), "e-CCCCCC-DDDDDD.pdf");
        std::fs::write(&old, "old").unwrap();

        let mut artifacts = coordinator(dir.path());
        artifacts.retire_eticket("e-CCCCCC-DDDDDD.pdf");
        artifacts.retire_eticket("");
        artifacts.commit();

        assert!(!old.exists());
    }
}
