//! `printpdf` implementation of [`PdfEngine`].
//!
//! ```text
//! Prescription (A5 portrait)          E-ticket (7x4 / 7x5)
//! ┌──────────────────────────┐        ┌──────────────┐
//! │ APOTEK SEHAT             │        │ No.  7-1     │
//! │ apt. Budi  SIPA 123      │        │ Tgl. ...     │
//! │ ──────────────────────── │        │ Nama:        │
//! │      SALINAN RESEP       │        │  Alice       │
//! │ No.  : 7                 │        │ Sakit        │
//! │ Tgl  : 03-06-2024        │        │ Sehari 3x1   │
//! │ Untuk: Alice   Umur: 30  │        │ Setelah ...  │
//! │ Dari dr. B               │        │ Qty: 10      │
//! │ R/ Amox      1/2 tab     │        └──────────────┘
//! │    mf da  3x  3x1        │
//! └──────────────────────────┘
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};

use apotek_core::document::{EticketDocument, PrescriptionDocument};

use super::{ArtifactError, PdfEngine, PrescriptionHeader};

const A5_WIDTH_MM: f32 = 148.0;
const A5_HEIGHT_MM: f32 = 210.0;
const MARGIN_MM: f32 = 12.0;
const LINE_MM: f32 = 5.5;
const BODY_PT: f32 = 10.0;

/// Stateless; fonts are embedded per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintPdfEngine;

fn render_error(e: impl std::fmt::Display) -> ArtifactError {
    ArtifactError::Render(e.to_string())
}

fn save(doc: PdfDocumentReference, path: &Path) -> Result<(), ArtifactError> {
    let file = File::create(path).map_err(|e| ArtifactError::io(path, e))?;
    doc.save(&mut BufWriter::new(file)).map_err(render_error)
}

/// Top-down text cursor that opens a new page when the current one is full.
struct Writer<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl<'a> Writer<'a> {
    fn new(doc: &'a PdfDocumentReference, layer: PdfLayerReference) -> Self {
        Writer {
            doc,
            layer,
            y: A5_HEIGHT_MM - MARGIN_MM,
        }
    }

    fn line(&mut self, text: &str, size: f32, x: f32, font: &IndirectFontRef) {
        if self.y < MARGIN_MM {
            let (page, layer) = self.doc.add_page(Mm(A5_WIDTH_MM), Mm(A5_HEIGHT_MM), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = A5_HEIGHT_MM - MARGIN_MM;
        }

        self.layer.use_text(text, size, Mm(x), Mm(self.y), font);
        self.y -= LINE_MM;
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }
}

impl PdfEngine for PrintPdfEngine {
    fn render_prescription(
        &self,
        doc: &PrescriptionDocument,
        header: &PrescriptionHeader,
        path: &Path,
    ) -> Result<(), ArtifactError> {
        let title = format!("Salinan Resep {}", doc.number);
        let (pdf, page, layer) = PdfDocument::new(&title, Mm(A5_WIDTH_MM), Mm(A5_HEIGHT_MM), "Layer 1");
        let font = pdf.add_builtin_font(BuiltinFont::Helvetica).map_err(render_error)?;
        let bold = pdf.add_builtin_font(BuiltinFont::HelveticaBold).map_err(render_error)?;

        let mut w = Writer::new(&pdf, pdf.get_page(page).get_layer(layer));

        // Letterhead
        w.line(&header.company_name.to_uppercase(), 14.0, MARGIN_MM, &bold);
        let pharmacist = header.pharmacist_line();
        if !pharmacist.is_empty() {
            w.line(&pharmacist, 9.0, MARGIN_MM, &font);
        }
        w.line(&"_".repeat(62), 8.0, MARGIN_MM, &font);
        w.gap(2.0);

        w.line("SALINAN RESEP", 12.0, A5_WIDTH_MM / 2.0 - 16.0, &bold);
        w.gap(2.0);

        w.line(&format!("No.    : {}", doc.number), BODY_PT, MARGIN_MM, &font);
        w.line(&format!("Tgl    : {}", doc.date_line()), BODY_PT, MARGIN_MM, &font);
        w.line(&format!("Untuk  : {}", doc.patient_name), BODY_PT, MARGIN_MM, &font);
        w.line(&format!("Umur   : {}", doc.age_line()), BODY_PT, MARGIN_MM, &font);
        w.line(&format!("Dari dr. {}", doc.doctor_name), BODY_PT, MARGIN_MM, &font);
        w.gap(3.0);

        for set in &doc.sets {
            for (i, item) in set.items.iter().enumerate() {
                let prefix = if i == 0 { "R/" } else { "  " };
                w.line(
                    &format!("{}  {}   {} {}", prefix, item.name, item.qty, item.unit),
                    BODY_PT,
                    MARGIN_MM,
                    &font,
                );
            }

            w.line(
                &format!("{}  {}  {} {}", set.mf, set.det, set.dose, set.set_unit),
                BODY_PT - 1.0,
                MARGIN_MM + 8.0,
                &font,
            );
            w.line(&format!("s. {}  {}", set.usage, set.consume_time), BODY_PT - 1.0, MARGIN_MM + 8.0, &font);
            if set.must_finish {
                w.line("(habiskan)", BODY_PT - 1.0, MARGIN_MM + 8.0, &bold);
            }
            w.line("det", BODY_PT - 2.0, A5_WIDTH_MM - MARGIN_MM - 10.0, &font);
            w.gap(2.0);
        }

        w.gap(6.0);
        w.line("p.c.c.", BODY_PT, A5_WIDTH_MM - MARGIN_MM - 30.0, &font);

        save(pdf, path)
    }

    fn render_eticket(&self, doc: &EticketDocument, path: &Path) -> Result<(), ArtifactError> {
        let (width, height) = doc.size.page_mm();
        let font_size = doc.size.font_size();
        let line_height = doc.size.line_height_mm();

        let title = format!("Etiket {}-{}", doc.number, doc.set_number);
        let (pdf, page, layer) = PdfDocument::new(&title, Mm(width), Mm(height), "Layer 1");
        let font = pdf.add_builtin_font(BuiltinFont::Helvetica).map_err(render_error)?;
        let bold = pdf.add_builtin_font(BuiltinFont::HelveticaBold).map_err(render_error)?;
        let layer = pdf.get_page(page).get_layer(layer);

        let x = 3.0;
        let mut y = height - line_height;
        for line in doc.lines() {
            let face = if line.bold { &bold } else { &font };
            layer.use_text(line.text.as_str(), font_size, Mm(x), Mm(y), face);
            y -= line_height;
        }

        save(pdf, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apotek_core::document::{DocumentItem, DocumentSet};
    use apotek_core::EticketSize;
    use chrono::{FixedOffset, TimeZone};

    fn prescription(sets: usize) -> PrescriptionDocument {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        PrescriptionDocument {
            number: 7,
            date: offset.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
            patient_name: "Alice".to_string(),
            patient_age: 30,
            doctor_name: "Dr. B".to_string(),
            sets: (0..sets)
                .map(|_| DocumentSet {
                    mf: "mf da".to_string(),
                    dose: "3x1".to_string(),
                    set_unit: "cap".to_string(),
                    consume_time: "pc".to_string(),
                    det: "3x".to_string(),
                    usage: "sakit".to_string(),
                    must_finish: true,
                    items: vec![DocumentItem {
                        barcode: "BX1".to_string(),
                        name: "Amox".to_string(),
                        qty: "1/2".to_string(),
                        unit: "tab".to_string(),
                        price: 100.0,
                        discount_percentage: 0.0,
                        discount_amount: 0.0,
                        subtotal: 50.0,
                    }],
                })
                .collect(),
        }
    }

    fn header() -> PrescriptionHeader {
        PrescriptionHeader {
            company_name: "Apotek Sehat".to_string(),
            pharmacist: "apt. Budi".to_string(),
            pharmacist_license: "SIPA 123".to_string(),
        }
    }

    #[test]
    fn test_render_prescription_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-abcdef-ghijkl.pdf");

        PrintPdfEngine.render_prescription(&prescription(1), &header(), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_prescription_spills_onto_new_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-long.pdf");

        PrintPdfEngine.render_prescription(&prescription(30), &header(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_render_eticket_writes_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e-abcdef-ghijkl.pdf");
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();

        let doc = EticketDocument {
            number: 7,
            set_number: 1,
            patient_name: "alice smith".to_string(),
            usage: "sakit kepala".to_string(),
            dose: "3x1".to_string(),
            set_unit: "cap".to_string(),
            consume_time: "ac".to_string(),
            must_finish: false,
            medicine_qty: 10.0,
            size: EticketSize::Large,
            printed_at: offset.with_ymd_and_hms(2024, 6, 3, 10, 15, 0).unwrap(),
        };

        PrintPdfEngine.render_eticket(&doc, &path).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
    }

    #[test]
    fn test_unwritable_path_is_io_error() {
        let path = Path::new("/nonexistent-dir/p.pdf");
        let err = PrintPdfEngine
            .render_prescription(&prescription(1), &header(), path)
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Io { .. }));
    }
}
