//! # Stock Arithmetic
//!
//! Converts a prescribed `(unit, qty)` into the medicine's first unit and
//! checks it against what is on hand. Persisting the new level is the job
//! of the stock repository.
//!
//! ```text
//! Medicine "Amox": qty 30 tab, strip = 10 tab, box = 100 tab
//!
//! base_quantity(tab,   2)   =   2 tab
//! base_quantity(strip, 1.5) =  15 tab
//! base_quantity(box,   1)   = 100 tab   → check_stock fails (30 on hand)
//! ```
//!
//! Amounts are rounded to [`STOCK_DECIMALS`] places so fractional lines that
//! add up to the on-hand quantity compare equal to it (`0.1 + 0.2 == 0.3`).

use crate::error::{CoreError, CoreResult};
use crate::types::{Id, Medicine};

/// Decimal places kept for stock levels and demands. The stock repository
/// rounds stored levels to the same precision.
pub const STOCK_DECIMALS: i32 = 6;

/// Rounds `value` to [`STOCK_DECIMALS`] places.
pub fn round_amount(value: f64) -> f64 {
    let scale = 10f64.powi(STOCK_DECIMALS);
    (value * scale).round() / scale
}

/// Adds two amounts at stock precision.
pub fn add_amounts(a: f64, b: f64) -> f64 {
    round_amount(a + b)
}

/// Amount of `qty` in `unit_id`, expressed in the medicine's first unit.
pub fn base_quantity(medicine: &Medicine, unit_id: Id, qty: f64) -> CoreResult<f64> {
    let base = if medicine.first_unit_id == unit_id {
        qty
    } else if medicine.second_unit_id == Some(unit_id) {
        qty * medicine.second_unit_to_first_unit_ratio
    } else if medicine.third_unit_id == Some(unit_id) {
        qty * medicine.third_unit_to_first_unit_ratio
    } else {
        return Err(CoreError::UnknownUnit {
            medicine: medicine.name.clone(),
        });
    };

    Ok(round_amount(base))
}

/// Fails with [`CoreError::InsufficientStock`] when the request exceeds the
/// on-hand quantity.
pub fn check_stock(medicine: &Medicine, unit_id: Id, qty: f64) -> CoreResult<f64> {
    let requested = base_quantity(medicine, unit_id, qty)?;

    if requested > round_amount(medicine.qty) {
        return Err(CoreError::InsufficientStock {
            medicine: medicine.name.clone(),
            available: medicine.qty,
            requested,
        });
    }

    Ok(requested)
}

// =============================================================================
// Unit Tests
// =============================================================================
