//! # SQLite Pool
//!
//! One [`Database`] handle is shared by every request of the API server.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database::new(DbConfig)                                                │
//! │      ├── open apotek.db (WAL, foreign keys, busy timeout)               │
//! │      └── apply migrations/sqlite/*.sql                                  │
//! │                                                                         │
//! │  list / detail / print       ──► db.acquire() ──► PoolConnection        │
//! │  register / modify / delete  ──► db.begin()   ──► Transaction           │
//! │                                                     │                   │
//! │          BEGIN IMMEDIATE; commit on success, rolled back on drop        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories borrow a `&mut SqliteConnection`, so the same repository code
//! runs on a pooled connection or inside a transaction.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;

/// How long a writer waits for the SQLite write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const BEGIN_WRITE: &str = "BEGIN IMMEDIATE";

// =============================================================================
// Configuration
// =============================================================================

/// Where the prescription database lives and how many connections it gets.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Default: 5
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// File-backed database, created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Private in-memory database for tests.
    ///
    /// Every connection to `:memory:` opens a fresh database, so the pool is
    /// pinned to a single connection. Callers must drop a checked-out
    /// connection before acquiring the next one.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Cloneable handle to the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening prescription database");

        let url = format!("sqlite://{}?mode=rwc", config.database_path.display());
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        // WAL needs a real file next to the database.
        if !config.is_in_memory() {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout)
            // An idle in-memory connection must never be reaped.
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        migrations::run_migrations(&pool).await?;
        info!(max_connections = config.max_connections, "Database ready");

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Checks out a pooled connection for read-only work.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Starts a write unit of work. Dropping it without `commit` rolls it back.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`). A deferred
    /// transaction that reads first and writes later cannot wait for the lock
    /// in WAL mode and fails with `database is locked` instead.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin_with(BEGIN_WRITE)
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    /// `true` when a trivial query succeeds; backs `GET /health`.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// (embedded, applied) migration counts.
    pub async fn migration_status(&self) -> DbResult<(usize, usize)> {
        migrations::migration_status(&self.pool).await
    }
}
