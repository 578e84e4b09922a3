//! # Error Types
//!
//! Domain errors for prescription logic.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Error Hierarchy                                  │
//! │                                                                         │
//! │  CoreError (business logic errors)                                     │
//! │  ├── InvalidQuantity   - "1/0", "abc"                                  │
//! │  ├── InvalidDate       - not "YYYY-MM-DD ±HHMMTZ"                      │
//! │  ├── UnknownUnit       - unit is none of the medicine's three units    │
//! │  ├── InsufficientStock - requested base amount > on hand               │
//! │  ├── UnknownEticketSize - size other than "7x4" / "7x5"                │
//! │  └── Validation(ValidationError)                                       │
//! │                                                                         │
//! │  ValidationError (input validation errors)                             │
//! │  ├── Required          - Field is empty                                │
//! │  ├── TooLong           - String exceeds max length                     │
//! │  ├── MustBePositive    - Number must be > 0                            │
//! │  ├── MustNotBeNegative - Number must be >= 0                           │
//! │  ├── InvalidFormat     - Wrong format                                  │
//! │  └── NotAllowed        - Value not in allowed set                      │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ApiError → HTTP response          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A quantity string could not be turned into a number.
    ///
    /// ## When This Occurs
    /// - Non-numeric input ("abc")
    /// - Fraction with a zero denominator ("1/0")
    /// - NaN or infinite values
    #[error("invalid quantity '{input}': {reason}")]
    InvalidQuantity { input: String, reason: String },

    /// A date string does not follow `YYYY-MM-DD ±HHMMTZ`.
    #[error("invalid date '{input}': {reason}")]
    InvalidDate { input: String, reason: String },

    /// The unit is neither the first, second nor third unit of the medicine.
    #[error("unknown unit name for {medicine}")]
    UnknownUnit { medicine: String },

    /// Requested amount (in the medicine's first unit) exceeds what is on hand.
    ///
    /// ## User Workflow
    /// ```text
    /// Prescription line: Amox, qty "1/2", unit "tab"
    ///      │
    ///      ▼
    /// base amount = 0.5 tab, on hand = 0.3 tab
    ///      │
    ///      ▼
    /// InsufficientStock { medicine: "Amox", available: 0.3, requested: 0.5 }
    /// ```
    #[error("insufficient stock for {medicine}: available {available}, requested {requested}")]
    InsufficientStock {
        medicine: String,
        available: f64,
        requested: f64,
    },

    /// E-ticket label size is not one of the supported formats.
    #[error("unknown e-ticket size: {0}")]
    UnknownEticketSize(String),

    /// Validation error (wraps ValidationError).
    #[error("{0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when a request payload doesn't meet requirements.
/// They are raised before any database work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be zero or greater.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            medicine: "Amox".to_string(),
            available: 0.3,
            requested: 0.5,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for Amox: available 0.3, requested 0.5"
        );

        let err = CoreError::UnknownUnit {
            medicine: "Amox".to_string(),
        };
        assert_eq!(err.to_string(), "unknown unit name for Amox");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("patientName").into();

        match core_err {
            CoreError::Validation(ValidationError::Required { field }) => {
                assert_eq!(field, "patientName");
            }
            _ => panic!("Expected Validation error"),
        }
    }
}
