//! Use cases behind the HTTP handlers.
//!
//! - [`prescription`] - register, list, detail, delete, modify
//! - [`artifact`] - PDF files produced inside a transaction
//! - [`bundle`] - ZIP of a prescription's PDFs for printing

pub mod artifact;
pub mod bundle;
pub mod prescription;
