//! # apotek-api: Prescription HTTP Service
//!
//! Axum server exposing the prescription workflow of the pharmacy backend.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP request                                                           │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  CorsLayer ─► TraceLayer ─► routes ─► AuthUser (Bearer JWT)             │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                      PrescriptionService                                │
//! │                      │         │          │                             │
//! │                      ▼         ▼          ▼                             │
//! │               apotek-core  apotek-db  ArtifactCoordinator ─► PdfEngine  │
//! │               (rules)      (sqlx)     (static/prescription, eticket)    │
//! │                                                                         │
//! │  Errors surface as {"error": "..."} with a 400 / 404 / 500 status.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod pdf;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
