//! # Quantity Parser
//!
//! Prescription quantities are typed by pharmacists as decimals ("1.5", "3")
//! or as fractions ("1/2", "3 / 4"). They are stored as `f64` and rendered
//! back for display.
//!
//! ```text
//! parse("1/2")  = 0.5      render(0.5)   = "1/2"
//! parse("0.25") = 0.25     render(0.25)  = "1/4"
//! parse("3")    = 3.0      render(3.0)   = "3"
//! parse("1.5")  = 1.5      render(1.5)   = "1.5"
//! ```

use crate::error::{CoreError, CoreResult};

/// Largest denominator used when rendering values below one.
pub const MAX_RENDER_DENOMINATOR: i64 = 100;

/// Parses a decimal or fractional quantity string.
///
/// ## Example
/// ```rust
/// use apotek_core::quantity::parse;
///
/// assert_eq!(parse("1/2").unwrap(), 0.5);
/// assert_eq!(parse(" 3 / 4 ").unwrap(), 0.75);
/// assert_eq!(parse("1.5").unwrap(), 1.5);
/// assert!(parse("1/0").is_err());
/// ```
pub fn parse(input: &str) -> CoreResult<f64> {
    let value = match input.split_once('/') {
        Some((num, den)) => {
            let num = parse_decimal(input, num)?;
            let den = parse_decimal(input, den)?;

            if den == 0.0 {
                return Err(CoreError::InvalidQuantity {
                    input: input.to_string(),
                    reason: "division by zero".to_string(),
                });
            }

            num / den
        }
        None => parse_decimal(input, input)?,
    };

    if !value.is_finite() {
        return Err(CoreError::InvalidQuantity {
            input: input.to_string(),
            reason: "not a finite number".to_string(),
        });
    }

    Ok(value)
}

fn parse_decimal(input: &str, part: &str) -> CoreResult<f64> {
    part.trim()
        .parse::<f64>()
        .map_err(|e| CoreError::InvalidQuantity {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Renders a stored quantity for display.
///
/// ## Rules
/// - `value < 1`: closest fraction `num/den` with `den <= 100`
/// - integral values: no fractional digits
/// - everything else: one fractional digit
pub fn render(value: f64) -> String {
    if value < 1.0 {
        let (num, den) = approximate_fraction(value, MAX_RENDER_DENOMINATOR);
        if num == 0 {
            return "0".to_string();
        }
        if num == den {
            return "1".to_string();
        }
        return format!("{}/{}", num, den);
    }

    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// Best rational approximation of `value` with a bounded denominator.
///
/// Scans every denominator up to `max_den` and keeps the closest numerator.
/// Ties go to the smaller denominator, so the result is already reduced.
fn approximate_fraction(value: f64, max_den: i64) -> (i64, i64) {
    let mut best = (value.round() as i64, 1);
    let mut best_err = (value - best.0 as f64).abs();

    for den in 2..=max_den {
        let num = (value * den as f64).round() as i64;
        let err = (value - num as f64 / den as f64).abs();
        if err < best_err - f64::EPSILON {
            best = (num, den);
            best_err = err;
        }
    }

    best
}

// =============================================================================
// Unit Tests
// =============================================================================
