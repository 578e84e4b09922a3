//! # apotek-core: Pure Prescription Logic
//!
//! This crate holds the prescription rules of the Apotek backend as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Apotek Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Web client                                   │   │
//! │  │   Register ──► List ──► Detail ──► Modify/Delete ──► Print      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ HTTP + JSON                            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │   PrescriptionService, ArtifactCoordinator, PrintBundle         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ apotek-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │ quantity │ │   date   │ │  stock   │ │   validation     │  │   │
//! │  │   │ "1/2"    │ │ +0700WIB │ │  units   │ │   payloads       │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  types   │ │ payload  │ │ filename │ │    document      │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apotek-db (Database Layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types and read models
//! - [`payload`] - JSON request/response shapes
//! - [`quantity`] - Decimal/fraction quantity parser and renderer
//! - [`date`] - `YYYY-MM-DD ±HHMMTZ` dates and day windows
//! - [`stock`] - Unit conversion and stock checks
//! - [`selector`] - Listing filters
//! - [`filename`] - Random PDF filenames
//! - [`document`] - PDF content (prescription and e-ticket)
//! - [`validation`] - Payload validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use apotek_core::quantity;
//!
//! let half = quantity::parse("1/2").unwrap();
//! assert_eq!(half, 0.5);
//! assert_eq!(quantity::render(half), "1/2");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod date;
pub mod document;
pub mod error;
pub mod filename;
pub mod payload;
pub mod quantity;
pub mod selector;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;
