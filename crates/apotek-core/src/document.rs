//! # PDF Documents
//!
//! Structured content handed to the PDF engine. Layout lives in the engine;
//! this module only decides *what* is printed.
//!
//! ## E-ticket Label
//! ```text
//! ┌──────────────────────────┐
//! │ No.  7-1                 │  prescription number - set number
//! │ Tgl.  03-06-2024  10:15  │
//! │ Nama:   Alice Smith      │  title case
//! │        Sakit Kepala      │  usage, title case
//! │   Sehari 3x1 Cap         │  dose + set unit
//! │     Setelah Makan        │  "ac" → Sebelum Makan
//! │       HABISKAN           │  only when must finish
//! │ Qty: 10                  │
//! └──────────────────────────┘
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::types::EticketSize;

/// Consume-time code meaning "before meals".
pub const BEFORE_MEAL_CODE: &str = "ac";

// =============================================================================
// Prescription Document
// =============================================================================

/// One medicine line of the main prescription PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub barcode: String,
    pub name: String,
    /// Rendered quantity ("1/2", "3", "1.5").
    pub qty: String,
    pub unit: String,
    pub price: f64,
    pub discount_percentage: f64,
    pub discount_amount: f64,
    pub subtotal: f64,
}

/// One set block of the main prescription PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSet {
    pub mf: String,
    pub dose: String,
    pub set_unit: String,
    pub consume_time: String,
    pub det: String,
    pub usage: String,
    pub must_finish: bool,
    pub items: Vec<DocumentItem>,
}

/// Content of the main (and extra) prescription PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionDocument {
    pub number: i64,
    pub date: DateTime<FixedOffset>,
    pub patient_name: String,
    pub patient_age: i64,
    pub doctor_name: String,
    pub sets: Vec<DocumentSet>,
}

impl PrescriptionDocument {
    /// `dd-mm-yyyy` as printed next to "Tgl".
    pub fn date_line(&self) -> String {
        self.date.format("%d-%m-%Y").to_string()
    }

    /// Age shown after "Umur"; dotted placeholder when unknown.
    pub fn age_line(&self) -> String {
        if self.patient_age > 0 {
            self.patient_age.to_string()
        } else {
            ".....................".to_string()
        }
    }
}

// =============================================================================
// E-ticket Document
// =============================================================================

/// Content of one e-ticket label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EticketDocument {
    pub number: i64,
    /// 1-based position of the set in the prescription.
    pub set_number: usize,
    pub patient_name: String,
    pub usage: String,
    pub dose: String,
    pub set_unit: String,
    pub consume_time: String,
    pub must_finish: bool,
    pub medicine_qty: f64,
    pub size: EticketSize,
    /// Moment printed in the "Tgl." line.
    pub printed_at: DateTime<FixedOffset>,
}

impl EticketDocument {
    /// Text lines in print order.
    pub fn lines(&self) -> Vec<LabelLine> {
        let mut lines = vec![
            LabelLine::plain(format!("No.  {}-{}", self.number, self.set_number)),
            LabelLine::plain(format!(
                "Tgl.  {}  {}",
                self.printed_at.format("%d-%m-%Y"),
                self.printed_at.format("%H:%M")
            )),
            LabelLine::plain("Nama:"),
        ];

        for part in title_case(&self.patient_name).split_whitespace() {
            lines.push(LabelLine::bold(part));
        }

        lines.push(LabelLine::plain(title_case(&self.usage)));
        lines.push(LabelLine::plain(format!(
            "Sehari {} {}",
            self.dose.to_lowercase(),
            title_case(&self.set_unit)
        )));
        lines.push(LabelLine::plain(consume_time_text(&self.consume_time)));

        if self.must_finish {
            lines.push(LabelLine::bold("HABISKAN"));
        }

        lines.push(LabelLine::plain(format!("Qty: {:.0}", self.medicine_qty)));
        lines
    }
}

/// One printed line of a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelLine {
    pub text: String,
    pub bold: bool,
}

impl LabelLine {
    fn plain(text: impl Into<String>) -> Self {
        LabelLine {
            text: text.into(),
            bold: false,
        }
    }

    fn bold(text: impl Into<String>) -> Self {
        LabelLine {
            text: text.into(),
            bold: true,
        }
    }
}

/// Label text for a consume-time code.
pub fn consume_time_text(code: &str) -> &'static str {
    if code.trim().eq_ignore_ascii_case(BEFORE_MEAL_CODE) {
        "Sebelum Makan"
    } else {
        "Setelah Makan"
    }
}

/// Upper-cases the first letter of every word and lower-cases the rest.
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn label(must_finish: bool, consume_time: &str) -> EticketDocument {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        EticketDocument {
            number: 7,
            set_number: 2,
            patient_name: "alice SMITH".to_string(),
            usage: "sakit kepala".to_string(),
            dose: "3X1".to_string(),
            set_unit: "cap".to_string(),
            consume_time: consume_time.to_string(),
            must_finish,
            medicine_qty: 10.0,
            size: EticketSize::Small,
            printed_at: offset.with_ymd_and_hms(2024, 6, 3, 10, 15, 0).unwrap(),
        }
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("alice SMITH"), "Alice Smith");
        assert_eq!(title_case("  dr.  b "), "Dr. B");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_eticket_lines() {
        let texts: Vec<String> = label(true, "ac").lines().into_iter().map(|l| l.text).collect();

        assert_eq!(texts[0], "No.  7-2");
        assert_eq!(texts[1], "Tgl.  03-06-2024  10:15");
        assert!(texts.contains(&"Alice".to_string()));
        assert!(texts.contains(&"Smith".to_string()));
        assert!(texts.contains(&"Sakit Kepala".to_string()));
        assert!(texts.contains(&"Sehari 3x1 Cap".to_string()));
        assert!(texts.contains(&"Sebelum Makan".to_string()));
        assert!(texts.contains(&"HABISKAN".to_string()));
        assert_eq!(texts.last().unwrap(), "Qty: 10");
    }

    #[test]
    fn test_eticket_lines_after_meal_without_finish() {
        let texts: Vec<String> = label(false, "pc").lines().into_iter().map(|l| l.text).collect();

        assert!(texts.contains(&"Setelah Makan".to_string()));
        assert!(!texts.contains(&"HABISKAN".to_string()));
    }

    #[test]
    fn test_prescription_age_line() {
        let offset = FixedOffset::east_opt(0).unwrap();
        let mut doc = PrescriptionDocument {
            number: 1,
            date: offset.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
            patient_name: "Alice".to_string(),
            patient_age: 30,
            doctor_name: "Dr. B".to_string(),
            sets: vec![],
        };
        assert_eq!(doc.age_line(), "30");
        assert_eq!(doc.date_line(), "03-06-2024");

        doc.patient_age = 0;
        assert!(doc.age_line().starts_with("..."));
    }
}
