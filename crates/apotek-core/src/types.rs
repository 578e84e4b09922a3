//! # Domain Types
//!
//! Core domain types for prescriptions and the catalog entries they refer to.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐ 1..N ┌──────────────────────┐ 1..N ┌────────────┐ │
//! │  │  Prescription   │─────►│ PrescriptionSetItem  │─────►│ Medicine   │ │
//! │  │  ─────────────  │      │ ──────────────────── │      │ Item       │ │
//! │  │  number (daily) │      │ mf, dose, set unit   │      │ qty (f64)  │ │
//! │  │  date (+offset) │      │ consume time, det    │      │ unit       │ │
//! │  │  pdf_url        │      │ usage, must_finish   │      │ subtotal   │ │
//! │  │  deleted_at     │      │ eticket_id ─────┐    │      └────────────┘ │
//! │  └─────────────────┘      └─────────────────┼────┘                     │
//! │                                       0..1  ▼                           │
//! │                               ┌─────────────────────┐                   │
//! │                               │      Eticket        │                   │
//! │                               │  size "7x4"/"7x5"   │                   │
//! │                               │  pdf_url            │                   │
//! │                               └─────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Rows use SQLite integer keys (`Id`). The business identifier of a
//! prescription is its `number`, unique per calendar day among rows that
//! are not soft-deleted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

/// Primary key type shared by every table.
pub type Id = i64;

// =============================================================================
// Users
// =============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    /// Administrators may delete prescriptions.
    pub admin: bool,
}

// =============================================================================
// Medicine
// =============================================================================

/// A stocked medicine with up to three units of measure.
///
/// ## Unit Conversion
/// `qty` is always kept in the first unit. The second and third units carry
/// a ratio to the first one:
/// ```text
/// first unit  "tab"   qty 1   → 1 tab
/// second unit "strip" ratio 10 → 10 tab
/// third unit  "box"   ratio 100 → 100 tab
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Id,
    pub barcode: String,
    pub name: String,
    /// On-hand quantity in the first unit.
    pub qty: f64,
    pub first_unit_id: Id,
    pub second_unit_id: Option<Id>,
    pub second_unit_to_first_unit_ratio: f64,
    pub third_unit_id: Option<Id>,
    pub third_unit_to_first_unit_ratio: f64,
}

// =============================================================================
// E-ticket Size
// =============================================================================

/// Label formats supported by the e-ticket printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EticketSize {
    /// 4 cm wide, 7 cm tall.
    #[serde(rename = "7x4")]
    Small,
    /// 5 cm wide, 7 cm tall.
    #[serde(rename = "7x5")]
    Large,
}

impl EticketSize {
    /// Wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EticketSize::Small => "7x4",
            EticketSize::Large => "7x5",
        }
    }

    /// Page size as (width, height) in millimetres.
    pub fn page_mm(&self) -> (f32, f32) {
        match self {
            EticketSize::Small => (40.0, 70.0),
            EticketSize::Large => (50.0, 70.0),
        }
    }

    /// Standard font size in points.
    pub fn font_size(&self) -> f32 {
        match self {
            EticketSize::Small => 9.0,
            EticketSize::Large => 10.0,
        }
    }

    /// Standard line height in millimetres.
    pub fn line_height_mm(&self) -> f32 {
        match self {
            EticketSize::Small => 6.0,
            EticketSize::Large => 7.0,
        }
    }
}

impl FromStr for EticketSize {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "7x4" => Ok(EticketSize::Small),
            "7x5" => Ok(EticketSize::Large),
            other => Err(CoreError::UnknownEticketSize(other.to_string())),
        }
    }
}

impl fmt::Display for EticketSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Prescription
// =============================================================================

/// A persisted prescription header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Id,
    pub invoice_id: Id,
    /// Business number, unique per calendar day among live rows.
    pub number: i64,
    /// Day-accurate date in the offset the client sent.
    pub prescription_date: DateTime<FixedOffset>,
    pub patient_id: Id,
    pub doctor_id: Id,
    pub qty: f64,
    pub price: f64,
    pub total_price: f64,
    pub description: String,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by_user_id: Id,
    pub pdf_url: String,
    pub print_extra_pdf: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_user_id: Option<Id>,
}

impl Prescription {
    /// Soft-deleted rows stay readable by id but leave every listing.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Header fields written on create and modify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrescription {
    pub invoice_id: Id,
    pub number: i64,
    pub prescription_date: DateTime<FixedOffset>,
    pub patient_id: Id,
    pub doctor_id: Id,
    pub qty: f64,
    pub price: f64,
    pub total_price: f64,
    pub description: String,
}

/// One dosing group of a prescription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionSetItem {
    pub id: Id,
    pub prescription_id: Id,
    pub mf_id: Id,
    pub dose_id: Id,
    pub set_unit_id: Id,
    pub consume_time_id: Id,
    pub det_id: Id,
    pub usage_id: Id,
    pub must_finish: bool,
    pub print_eticket: bool,
    /// Set once the e-ticket row exists.
    pub eticket_id: Option<Id>,
}

/// Columns of a set item before it has an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSetItem {
    pub prescription_id: Id,
    pub mf_id: Id,
    pub dose_id: Id,
    pub set_unit_id: Id,
    pub consume_time_id: Id,
    pub det_id: Id,
    pub usage_id: Id,
    pub must_finish: bool,
    pub print_eticket: bool,
}

/// One medicine line of a set item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionMedicineItem {
    pub id: Id,
    pub prescription_set_item_id: Id,
    pub medicine_id: Id,
    pub qty: f64,
    pub unit_id: Id,
    pub price: f64,
    pub discount_percentage: f64,
    pub discount_amount: f64,
    pub subtotal: f64,
}

/// Columns of a medicine item before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedicineItem {
    pub prescription_set_item_id: Id,
    pub medicine_id: Id,
    pub qty: f64,
    pub unit_id: Id,
    pub price: f64,
    pub discount_percentage: f64,
    pub discount_amount: f64,
    pub subtotal: f64,
}

/// Printable label for a set item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eticket {
    pub id: Id,
    pub prescription_id: Id,
    pub prescription_set_item_id: Id,
    pub number: i64,
    pub medicine_qty: f64,
    pub size: EticketSize,
    pub pdf_url: String,
}

/// Columns of an e-ticket before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEticket {
    pub prescription_id: Id,
    pub prescription_set_item_id: Id,
    pub number: i64,
    pub medicine_qty: f64,
    pub size: EticketSize,
}

// =============================================================================
// Read Models
// =============================================================================

/// Invoice summary embedded in listing rows and details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InvoiceSummary {
    pub number: i64,
    pub customer_name: String,
    pub total_price: f64,
    #[ts(type = "string")]
    pub invoice_date: DateTime<Utc>,
}

/// One row of a prescription listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrescriptionListing {
    pub id: Id,
    pub number: i64,
    #[ts(type = "string")]
    pub prescription_date: DateTime<FixedOffset>,
    pub patient_name: String,
    pub patient_age: i64,
    pub doctor_name: String,
    pub qty: f64,
    pub price: f64,
    pub total_price: f64,
    pub description: String,
    pub user_name: String,
    pub invoice: InvoiceSummary,
}

/// Patient as shown in a detail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PatientSummary {
    pub id: Id,
    pub name: String,
    pub age: i64,
}

/// A named reference (doctor, user) in a detail record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NamedRef {
    pub id: Id,
    pub name: String,
}

/// Medicine line inside a detail record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MedicineItemDetail {
    pub medicine_barcode: String,
    pub medicine_name: String,
    /// Display form, e.g. "1/2".
    pub qty_string: String,
    pub qty_float: f64,
    pub unit: String,
    pub price: f64,
    pub discount_percentage: f64,
    pub discount_amount: f64,
    pub subtotal: f64,
}

/// Set item inside a detail record, with vocabulary resolved to names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetItemDetail {
    pub id: Id,
    pub mf: String,
    pub dose: String,
    pub set_unit: String,
    pub consume_time: String,
    pub det: String,
    pub usage: String,
    pub must_finish: bool,
    pub print_eticket: bool,
    pub eticket_id: Option<Id>,
    pub medicine_items: Vec<MedicineItemDetail>,
}

/// Full prescription view returned by the detail endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PrescriptionDetail {
    pub id: Id,
    pub number: i64,
    #[ts(type = "string")]
    pub prescription_date: DateTime<FixedOffset>,
    pub qty: f64,
    pub price: f64,
    pub total_price: f64,
    pub description: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub last_modified: DateTime<Utc>,
    pub last_modified_by_user_name: String,
    pub presc_pdf_url: String,
    pub invoice: InvoiceSummary,
    pub patient: PatientSummary,
    pub doctor: NamedRef,
    pub user: NamedRef,
    pub medicine_sets: Vec<SetItemDetail>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eticket_size_from_str() {
        assert_eq!("7x4".parse::<EticketSize>().unwrap(), EticketSize::Small);
        assert_eq!("7x5".parse::<EticketSize>().unwrap(), EticketSize::Large);
        assert!(matches!(
            "8x4".parse::<EticketSize>(),
            Err(CoreError::UnknownEticketSize(s)) if s == "8x4"
        ));
    }

    #[test]
    fn test_eticket_size_serde() {
        let json = serde_json::to_string(&EticketSize::Large).unwrap();
        assert_eq!(json, "\"7x5\"");
        assert_eq!(EticketSize::Small.page_mm(), (40.0, 70.0));
    }
}
