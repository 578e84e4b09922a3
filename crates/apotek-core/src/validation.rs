//! # Validation Module
//!
//! Request payload validation for prescriptions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP extractor (axum Json)                                   │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required fields, non-negative amounts                             │
//! │  ├── At least one set, at least one medicine per set                   │
//! │  └── E-ticket present and sized when printEticket is set               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── Partial UNIQUE index (number per day)                             │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation is a plain set of functions handed to the service at
//! construction through [`PayloadValidator`], never a process-wide object.

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::payload::{MedicineItemPayload, RegisterPrescriptionPayload, SetItemPayload};
use crate::quantity;
use crate::types::EticketSize;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted free-text name (patients, doctors, vocabulary).
pub const MAX_NAME_LEN: usize = 200;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a required, length-bounded text field.
///
/// ## Example
/// ```rust
/// use apotek_core::validation::validate_name;
///
/// assert!(validate_name("doctorName", "Dr. B").is_ok());
/// assert!(validate_name("doctorName", "   ").is_err());
/// ```
pub fn validate_name(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a monetary or quantity amount (zero allowed).
pub fn validate_amount(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be a finite number".to_string(),
        });
    }

    if value < 0.0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a business number (prescription, invoice, e-ticket).
pub fn validate_number(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Payload Validators
// =============================================================================

/// Validates a registration (or modification) payload.
///
/// Date strings and quantity strings are only checked for presence here;
/// their syntax errors are reported as parse errors when the service
/// decodes them.
pub fn validate_register_payload(payload: &RegisterPrescriptionPayload) -> CoreResult<()> {
    validate_number("invoice.number", payload.invoice.number)?;
    validate_name("invoice.customerName", &payload.invoice.customer_name)?;
    validate_name("invoice.invoiceDate", &payload.invoice.invoice_date)?;

    validate_number("number", payload.number)?;
    validate_name("prescriptionDate", &payload.prescription_date)?;
    validate_name("patientName", &payload.patient_name)?;
    if payload.patient_age < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "patientAge".to_string(),
        }
        .into());
    }
    validate_name("doctorName", &payload.doctor_name)?;

    validate_amount("qty", payload.qty)?;
    validate_amount("price", payload.price)?;
    validate_amount("totalPrice", payload.total_price)?;

    if payload.set_items.is_empty() {
        return Err(ValidationError::required("setItems").into());
    }

    for set_item in &payload.set_items {
        validate_set_item(set_item)?;
    }

    Ok(())
}

fn validate_set_item(set_item: &SetItemPayload) -> CoreResult<()> {
    validate_name("mf", &set_item.mf)?;
    validate_name("dose", &set_item.dose)?;
    validate_name("setUnit", &set_item.set_unit)?;
    validate_name("consumeTime", &set_item.consume_time)?;
    validate_name("det", &set_item.det)?;
    validate_name("usage", &set_item.usage)?;

    if set_item.print_eticket {
        let eticket = set_item
            .eticket
            .as_ref()
            .ok_or_else(|| ValidationError::required("eticket"))?;
        validate_number("eticket.number", eticket.number)?;
        validate_amount("eticket.medicineQty", eticket.medicine_qty)?;
        eticket.size.parse::<EticketSize>()?;
    }

    if set_item.medicine_lists.is_empty() {
        return Err(ValidationError::required("medicineLists").into());
    }

    for medicine in &set_item.medicine_lists {
        validate_medicine_item(medicine)?;
    }

    Ok(())
}

fn validate_medicine_item(item: &MedicineItemPayload) -> CoreResult<()> {
    validate_name("medicineBarcode", &item.medicine_barcode)?;
    validate_name("unit", &item.unit)?;
    validate_name("qty", &item.qty)?;
    validate_amount("price", item.price)?;
    validate_amount("discountPercentage", item.discount_percentage)?;
    validate_amount("discountAmount", item.discount_amount)?;
    validate_amount("subtotal", item.subtotal)?;
    Ok(())
}

/// Parses a medicine quantity and rejects negative values.
pub fn parse_quantity(input: &str) -> CoreResult<f64> {
    let value = quantity::parse(input)?;

    if value < 0.0 {
        return Err(CoreError::InvalidQuantity {
            input: input.to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    Ok(value)
}

// =============================================================================
// Injectable Validator
// =============================================================================

/// Validation seam injected into the prescription service.
pub trait PayloadValidator: Send + Sync {
    fn validate_register(&self, payload: &RegisterPrescriptionPayload) -> CoreResult<()>;
}

/// Default rules from this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl PayloadValidator for DefaultValidator {
    fn validate_register(&self, payload: &RegisterPrescriptionPayload) -> CoreResult<()> {
        validate_register_payload(payload)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{EticketPayload, InvoiceLocator};

    fn payload() -> RegisterPrescriptionPayload {
        RegisterPrescriptionPayload {
            invoice: InvoiceLocator {
                number: 100,
                customer_name: "ACME".to_string(),
                invoice_date: "2024-06-03 +0700WIB".to_string(),
            },
            number: 7,
            prescription_date: "2024-06-03 +0700WIB".to_string(),
            patient_name: "Alice".to_string(),
            patient_age: 30,
            doctor_name: "Dr. B".to_string(),
            qty: 10.0,
            price: 1000.0,
            total_price: 10000.0,
            description: String::new(),
            print_extra: false,
            set_items: vec![SetItemPayload {
                medicine_lists: vec![MedicineItemPayload {
                    medicine_barcode: "BX1".to_string(),
                    medicine_name: "Amox".to_string(),
                    qty: "1".to_string(),
                    unit: "tab".to_string(),
                    price: 100.0,
                    discount_percentage: 0.0,
                    discount_amount: 0.0,
                    subtotal: 1000.0,
                }],
                mf: "mf da".to_string(),
                dose: "3x1".to_string(),
                set_unit: "cap".to_string(),
                consume_time: "pc".to_string(),
                det: "3x".to_string(),
                usage: "sakit".to_string(),
                must_finish: false,
                print_eticket: true,
                eticket: Some(EticketPayload {
                    number: 1,
                    medicine_qty: 10.0,
                    size: "7x4".to_string(),
                }),
            }],
        }
    }

    #[test]
    fn test_valid_payload() {
        assert!(validate_register_payload(&payload()).is_ok());
        assert!(DefaultValidator.validate_register(&payload()).is_ok());
    }

    #[test]
    fn test_empty_sets_rejected() {
        let mut p = payload();
        p.set_items.clear();
        assert!(validate_register_payload(&p).is_err());

        let mut p = payload();
        p.set_items[0].medicine_lists.clear();
        assert!(validate_register_payload(&p).is_err());
    }

    #[test]
    fn test_eticket_rules() {
        let mut p = payload();
        p.set_items[0].eticket = None;
        assert!(validate_register_payload(&p).is_err());

        let mut p = payload();
        if let Some(eticket) = p.set_items[0].eticket.as_mut() {
            eticket.size = "9x9".to_string();
        }
        assert!(matches!(
            validate_register_payload(&p),
            Err(CoreError::UnknownEticketSize(_))
        ));

        let mut p = payload();
        p.set_items[0].print_eticket = false;
        p.set_items[0].eticket = None;
        assert!(validate_register_payload(&p).is_ok());
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut p = payload();
        p.total_price = -1.0;
        assert!(validate_register_payload(&p).is_err());

        let mut p = payload();
        p.set_items[0].medicine_lists[0].subtotal = f64::NAN;
        assert!(validate_register_payload(&p).is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("1/2").unwrap(), 0.5);
        assert!(parse_quantity("-1").is_err());
        assert!(parse_quantity("x").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("patientName", "Alice").is_ok());
        assert!(validate_name("patientName", "").is_err());
        assert!(validate_name("patientName", &"A".repeat(300)).is_err());
    }
}
