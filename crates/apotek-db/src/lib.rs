//! # apotek-db: Database Layer for Apotek
//!
//! This crate provides database access for the Apotek prescription backend.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Apotek Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler (POST /prescription)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     apotek-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ Prescription   │    │ 001_catalog  │  │   │
//! │  │   │ SqlitePool    │◄───│ Catalog        │    │ 002_presc..  │  │   │
//! │  │   │ begin/acquire │    │ Stock, Audit   │    │ 003_audit    │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ./data/apotek.db                                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`password`] - Argon2 hashing for user credentials
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use apotek_db::{Database, DbConfig, PrescriptionRepository};
//!
//! let db = Database::new(DbConfig::new("data/apotek.db")).await?;
//!
//! let mut conn = db.acquire().await?;
//! let detail = PrescriptionRepository::new(&mut conn).get_detail(42).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod password;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::audit::{AuditAction, AuditEntry, AuditRepository};
pub use repository::catalog::{CatalogRepository, NamedSubject, NewMedicine, UserCredentials, Vocabulary};
pub use repository::prescription::{ListFilter, PrescriptionRepository};
pub use repository::stock::StockRepository;
