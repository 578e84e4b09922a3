//! # Listing Selectors
//!
//! `POST /prescription/{params}/{val}` narrows a date-range listing. The two
//! path segments are decoded here into a [`ListSelector`].
//!
//! | params       | val            | meaning                         |
//! |--------------|----------------|---------------------------------|
//! | any          | `all`          | every prescription in range     |
//! | `id`         | integer        | one prescription id             |
//! | `number`     | integer        | exact number, else digit search |
//! | `user`       | text           | creators whose name contains it |
//! | `patient`    | text           | patients whose name contains it |
//! | `doctor`     | text           | doctors whose name contains it  |
//! | `invoice-id` | integer        | one invoice id                  |

use crate::error::ValidationError;
use crate::types::Id;

/// Decoded listing filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSelector {
    All,
    Id(Id),
    Number(i64),
    User(String),
    Patient(String),
    Doctor(String),
    InvoiceId(Id),
}

const ALLOWED_PARAMS: [&str; 6] = ["id", "number", "user", "patient", "doctor", "invoice-id"];

impl ListSelector {
    /// Decodes the `{params}/{val}` path pair.
    ///
    /// ## Example
    /// ```rust
    /// use apotek_core::selector::ListSelector;
    ///
    /// assert_eq!(ListSelector::parse("x", "all").unwrap(), ListSelector::All);
    /// assert_eq!(ListSelector::parse("number", "7").unwrap(), ListSelector::Number(7));
    /// assert!(ListSelector::parse("colour", "red").is_err());
    /// ```
    pub fn parse(params: &str, val: &str) -> Result<Self, ValidationError> {
        if val == "all" {
            return Ok(ListSelector::All);
        }

        let integer = |field: &str| {
            val.trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::InvalidFormat {
                    field: field.to_string(),
                    reason: format!("'{}' is not an integer", val),
                })
        };

        match params {
            "id" => integer("id").map(ListSelector::Id),
            "number" => integer("number").map(ListSelector::Number),
            "invoice-id" => integer("invoice-id").map(ListSelector::InvoiceId),
            "user" => Ok(ListSelector::User(val.to_string())),
            "patient" => Ok(ListSelector::Patient(val.to_string())),
            "doctor" => Ok(ListSelector::Doctor(val.to_string())),
            _ => Err(ValidationError::NotAllowed {
                field: "params".to_string(),
                allowed: ALLOWED_PARAMS.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

/// SQL `LIKE` pattern matching numbers whose digits appear in order.
///
/// `1203` becomes `%1%2%0%3%`, so a search for "12" also finds 1203.
pub fn number_search_pattern(number: i64) -> String {
    let mut pattern = String::from("%");
    for digit in number.to_string().chars() {
        pattern.push(digit);
        pattern.push('%');
    }
    pattern
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selectors() {
        assert_eq!(ListSelector::parse("id", "all").unwrap(), ListSelector::All);
        assert_eq!(ListSelector::parse("id", "12").unwrap(), ListSelector::Id(12));
        assert_eq!(
            ListSelector::parse("invoice-id", "3").unwrap(),
            ListSelector::InvoiceId(3)
        );
        assert_eq!(
            ListSelector::parse("doctor", "Dr").unwrap(),
            ListSelector::Doctor("Dr".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_bad_selectors() {
        assert!(ListSelector::parse("id", "abc").is_err());
        assert!(ListSelector::parse("number", "1.5").is_err());
        assert!(matches!(
            ListSelector::parse("colour", "red"),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_number_search_pattern() {
        assert_eq!(number_search_pattern(7), "%7%");
        assert_eq!(number_search_pattern(120), "%1%2%0%");
    }
}
