//! # Schema Migrations
//!
//! The SQL files under `migrations/sqlite/` are compiled into the binary and
//! applied by [`Database::new`](crate::Database::new):
//!
//! ```text
//! 001_catalog.sql       users, customers, invoices, doctors, patients,
//!                       units, medicines, set vocabularies
//! 002_prescription.sql  prescription, eticket, set and medicine items,
//!                       per-day number index (live rows only)
//! 003_audit_log.sql     append-only audit_log
//! ```
//!
//! Applied files are recorded in `_sqlx_migrations` with their checksum, so an
//! edited migration fails startup. Schema changes go into a new numbered file.

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded in `_sqlx_migrations`.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(count = MIGRATOR.migrations.len(), "Schema up to date");
    Ok(())
}

/// (embedded, applied) counts. A missing bookkeeping table counts as zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((MIGRATOR.migrations.len(), usize::try_from(applied).unwrap_or(0)))
}
