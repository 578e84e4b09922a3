//! # Request and Response Payloads
//!
//! JSON shapes exchanged with the web client. Field names are camelCase on
//! the wire.
//!
//! ## Registration Payload
//! ```text
//! RegisterPrescriptionPayload
//! ├── invoice { number, customerName, invoiceDate }
//! ├── number, prescriptionDate, patientName, patientAge, doctorName
//! ├── qty, price, totalPrice, description, printExtra
//! └── setItems[]
//!     ├── mf, dose, setUnit, consumeTime, det, usage
//!     ├── mustFinish, printEticket
//!     ├── eticket? { number, medicineQty, size }
//!     └── medicineLists[]
//!         └── medicineBarcode, medicineName, qty ("1/2"), unit,
//!             price, discountPercentage, discountAmount, subtotal
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Id;

// =============================================================================
// Registration / Modification
// =============================================================================

/// Locator of the invoice a prescription is billed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InvoiceLocator {
    pub number: i64,
    pub customer_name: String,
    /// `YYYY-MM-DD ±HHMMTZ`
    pub invoice_date: String,
}

/// One medicine line of a set item payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MedicineItemPayload {
    pub medicine_barcode: String,
    #[serde(default)]
    pub medicine_name: String,
    /// Decimal ("1.5") or fraction ("1/2").
    pub qty: String,
    pub unit: String,
    pub price: f64,
    #[serde(default)]
    pub discount_percentage: f64,
    #[serde(default)]
    pub discount_amount: f64,
    pub subtotal: f64,
}

/// E-ticket request attached to a set item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EticketPayload {
    pub number: i64,
    pub medicine_qty: f64,
    /// "7x4" or "7x5"
    pub size: String,
}

/// One dosing set of a registration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetItemPayload {
    pub medicine_lists: Vec<MedicineItemPayload>,
    pub mf: String,
    pub dose: String,
    pub set_unit: String,
    pub consume_time: String,
    pub det: String,
    pub usage: String,
    #[serde(default)]
    pub must_finish: bool,
    #[serde(default)]
    pub print_eticket: bool,
    #[serde(default)]
    pub eticket: Option<EticketPayload>,
}

/// Body of `POST /prescription` and `newData` of `PATCH /prescription`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterPrescriptionPayload {
    pub invoice: InvoiceLocator,
    pub number: i64,
    pub prescription_date: String,
    pub patient_name: String,
    pub patient_age: i64,
    pub doctor_name: String,
    pub qty: f64,
    pub price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub print_extra: bool,
    pub set_items: Vec<SetItemPayload>,
}

/// Body of `PATCH /prescription`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ModifyPrescriptionPayload {
    pub id: Id,
    pub new_data: RegisterPrescriptionPayload,
}

// =============================================================================
// Queries
// =============================================================================

/// Body of `POST /prescription/{params}/{val}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DateRangePayload {
    pub start_date: String,
    pub end_date: String,
}

/// Body of `POST /prescription/detail` and `POST /prescription/print`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrescriptionIdPayload {
    pub prescription_id: Id,
}

/// Body of `DELETE /prescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeletePrescriptionPayload {
    pub id: Id,
}

// =============================================================================
// Responses
// =============================================================================

/// Response of register and modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrescriptionArtifactsResponse {
    pub success: String,
    pub prescription_pdf: String,
    pub eticket_pdf: Vec<String>,
}

/// Plain confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MessageResponse {
    pub success: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
