//! # Prescription Repository
//!
//! Database operations for prescriptions and their children.
//!
//! ## Row Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Prescription Rows                                 │
//! │                                                                         │
//! │  prescription ──1:N──► prescription_set_item ──1:N──► medicine_item    │
//! │       │                        │  ▲                                     │
//! │       │                eticket_id │ prescription_set_item_id            │
//! │       │                        ▼  │                                     │
//! │       └──────────1:N─────────► eticket                                 │
//! │                                                                         │
//! │  Delete order (children first, FKs enforced):                          │
//! │    1. eticket         (set item's eticket_id becomes NULL)             │
//! │    2. medicine_item                                                    │
//! │    3. set_item                                                         │
//! │    4. prescription    (soft: stamp deleted_at / absolute: DELETE)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dates
//! `prescription_date` is stored in UTC with the client's offset in
//! `prescription_utc_offset`, so listings compare instants while reads give
//! back the date in the zone it was registered in. `prescription_day` is the
//! local calendar day used by the per-day number index.

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::json;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::audit::{AuditAction, AuditRepository};
use apotek_core::date::day_key;
use apotek_core::filename::ArtifactKind;
use apotek_core::quantity;
use apotek_core::selector::number_search_pattern;
use apotek_core::{
    Eticket, EticketSize, Id, InvoiceSummary, MedicineItemDetail, NamedRef, NewEticket,
    NewMedicineItem, NewPrescription, NewSetItem, PatientSummary, Prescription,
    PrescriptionDetail, PrescriptionListing, PrescriptionMedicineItem, PrescriptionSetItem,
    SetItemDetail, User,
};

// =============================================================================
// Listing Filter
// =============================================================================

/// Extra condition applied to a date-range listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    /// Every live prescription in the range.
    All,
    Id(Id),
    /// Exact number, falling back to a digit-subsequence search.
    Number(i64),
    UserId(Id),
    PatientId(Id),
    DoctorId(Id),
    InvoiceId(Id),
}

enum FilterValue {
    Int(i64),
    Text(String),
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PrescriptionRow {
    id: Id,
    invoice_id: Id,
    number: i64,
    prescription_date: DateTime<Utc>,
    prescription_utc_offset: i64,
    patient_id: Id,
    doctor_id: Id,
    qty: f64,
    price: f64,
    total_price: f64,
    description: String,
    user_id: Id,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    last_modified_by_user_id: Id,
    pdf_url: String,
    print_extra_pdf: bool,
    deleted_at: Option<DateTime<Utc>>,
    deleted_by_user_id: Option<Id>,
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> DbResult<Self> {
        Ok(Prescription {
            id: row.id,
            invoice_id: row.invoice_id,
            number: row.number,
            prescription_date: to_local(row.prescription_date, row.prescription_utc_offset)?,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            qty: row.qty,
            price: row.price,
            total_price: row.total_price,
            description: row.description,
            user_id: row.user_id,
            created_at: row.created_at,
            last_modified: row.last_modified,
            last_modified_by_user_id: row.last_modified_by_user_id,
            pdf_url: row.pdf_url,
            print_extra_pdf: row.print_extra_pdf,
            deleted_at: row.deleted_at,
            deleted_by_user_id: row.deleted_by_user_id,
        })
    }
}

const PRESCRIPTION_COLUMNS: &str = r#"
    id, invoice_id, number, prescription_date, prescription_utc_offset,
    patient_id, doctor_id, qty, price, total_price, description,
    user_id, created_at, last_modified, last_modified_by_user_id,
    pdf_url, print_extra_pdf, deleted_at, deleted_by_user_id
"#;

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: Id,
    number: i64,
    prescription_date: DateTime<Utc>,
    prescription_utc_offset: i64,
    patient_name: String,
    patient_age: i64,
    doctor_name: String,
    qty: f64,
    price: f64,
    total_price: f64,
    description: String,
    user_name: String,
    invoice_number: i64,
    customer_name: String,
    invoice_total_price: f64,
    invoice_date: DateTime<Utc>,
}

impl TryFrom<ListingRow> for PrescriptionListing {
    type Error = DbError;

    fn try_from(row: ListingRow) -> DbResult<Self> {
        Ok(PrescriptionListing {
            id: row.id,
            number: row.number,
            prescription_date: to_local(row.prescription_date, row.prescription_utc_offset)?,
            patient_name: row.patient_name,
            patient_age: row.patient_age,
            doctor_name: row.doctor_name,
            qty: row.qty,
            price: row.price,
            total_price: row.total_price,
            description: row.description,
            user_name: row.user_name,
            invoice: InvoiceSummary {
                number: row.invoice_number,
                customer_name: row.customer_name,
                total_price: row.invoice_total_price,
                invoice_date: row.invoice_date,
            },
        })
    }
}

const LISTING_SELECT: &str = r#"
    SELECT
        p.id, p.number, p.prescription_date, p.prescription_utc_offset,
        pt.name AS patient_name, pt.age AS patient_age,
        d.name AS doctor_name,
        p.qty, p.price, p.total_price, p.description,
        u.name AS user_name,
        i.number AS invoice_number,
        c.name AS customer_name,
        i.total_price AS invoice_total_price,
        i.invoice_date
    FROM prescription p
    JOIN patient pt ON pt.id = p.patient_id
    JOIN doctor d ON d.id = p.doctor_id
    JOIN user u ON u.id = p.user_id
    JOIN invoice i ON i.id = p.invoice_id
    JOIN customer c ON c.id = i.customer_id
    WHERE p.deleted_at IS NULL
      AND p.prescription_date >= ?1
      AND p.prescription_date < ?2
"#;

#[derive(sqlx::FromRow)]
struct DetailHeaderRow {
    id: Id,
    number: i64,
    prescription_date: DateTime<Utc>,
    prescription_utc_offset: i64,
    qty: f64,
    price: f64,
    total_price: f64,
    description: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
    last_modified_by_user_name: String,
    pdf_url: String,
    invoice_number: i64,
    customer_name: String,
    invoice_total_price: f64,
    invoice_date: DateTime<Utc>,
    patient_id: Id,
    patient_name: String,
    patient_age: i64,
    doctor_id: Id,
    doctor_name: String,
    user_id: Id,
    user_name: String,
}

#[derive(sqlx::FromRow)]
struct SetItemDetailRow {
    id: Id,
    mf: String,
    dose: String,
    set_unit: String,
    consume_time: String,
    det: String,
    usage: String,
    must_finish: bool,
    print_eticket: bool,
    eticket_id: Option<Id>,
}

#[derive(sqlx::FromRow)]
struct MedicineItemDetailRow {
    medicine_barcode: String,
    medicine_name: String,
    qty: f64,
    unit: String,
    price: f64,
    discount_percentage: f64,
    discount_amount: f64,
    subtotal: f64,
}

impl From<MedicineItemDetailRow> for MedicineItemDetail {
    fn from(row: MedicineItemDetailRow) -> Self {
        MedicineItemDetail {
            medicine_barcode: row.medicine_barcode,
            medicine_name: row.medicine_name,
            qty_string: quantity::render(row.qty),
            qty_float: row.qty,
            unit: row.unit,
            price: row.price,
            discount_percentage: row.discount_percentage,
            discount_amount: row.discount_amount,
            subtotal: row.subtotal,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EticketRow {
    id: Id,
    prescription_id: Id,
    prescription_set_item_id: Id,
    number: i64,
    medicine_qty: f64,
    size: String,
    pdf_url: String,
}

impl TryFrom<EticketRow> for Eticket {
    type Error = DbError;

    fn try_from(row: EticketRow) -> DbResult<Self> {
        let size: EticketSize = row
            .size
            .parse()
            .map_err(|e: apotek_core::CoreError| DbError::Internal(e.to_string()))?;

        Ok(Eticket {
            id: row.id,
            prescription_id: row.prescription_id,
            prescription_set_item_id: row.prescription_set_item_id,
            number: row.number,
            medicine_qty: row.medicine_qty,
            size,
            pdf_url: row.pdf_url,
        })
    }
}

/// Restores the registration-time offset of a stored UTC instant.
fn to_local(utc: DateTime<Utc>, offset_seconds: i64) -> DbResult<DateTime<FixedOffset>> {
    let offset = i32::try_from(offset_seconds)
        .ok()
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| DbError::Internal(format!("invalid stored UTC offset: {offset_seconds}")))?;
    Ok(utc.with_timezone(&offset))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for prescription rows.
///
/// Borrows a connection so that the same calls work on a pooled connection
/// and inside a transaction.
pub struct PrescriptionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PrescriptionRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PrescriptionRepository { conn }
    }

    fn audit(&mut self) -> AuditRepository<'_> {
        AuditRepository::new(&mut *self.conn)
    }

    // -------------------------------------------------------------------------
    // Inserts
    // -------------------------------------------------------------------------

    /// Inserts a prescription header with an empty `pdf_url`.
    ///
    /// ## Errors
    /// A live prescription with the same number on the same local day makes
    /// the per-day index fire; the error satisfies
    /// [`DbError::is_duplicate_prescription_number`].
    pub async fn create(&mut self, prescription: &NewPrescription, user_id: Id) -> DbResult<Id> {
        debug!(number = prescription.number, "Creating prescription");

        let now = Utc::now();
        let date = prescription.prescription_date;

        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO prescription (
                invoice_id, number,
                prescription_date, prescription_utc_offset, prescription_day,
                patient_id, doctor_id, qty, price, total_price, description,
                user_id, created_at, last_modified, last_modified_by_user_id,
                pdf_url, print_extra_pdf
            ) VALUES (
                ?1, ?2,
                ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?13, ?12,
                '', 0
            )
            RETURNING id
            "#,
        )
        .bind(prescription.invoice_id)
        .bind(prescription.number)
        .bind(date.with_timezone(&Utc))
        .bind(date.offset().local_minus_utc())
        .bind(day_key(date))
        .bind(prescription.patient_id)
        .bind(prescription.doctor_id)
        .bind(prescription.qty)
        .bind(prescription.price)
        .bind(prescription.total_price)
        .bind(&prescription.description)
        .bind(user_id)
        .bind(now)
        .fetch_one(&mut *self.conn)
        .await
        .map_err(|e| with_number(e.into(), prescription.number))?;

        Ok(id)
    }

    /// Inserts a set item.
    pub async fn create_set_item(&mut self, item: &NewSetItem) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO prescription_set_item (
                prescription_id, mf_id, dose_id, set_unit_id,
                consume_time_id, det_id, usage_id, must_finish, print_eticket
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(item.prescription_id)
        .bind(item.mf_id)
        .bind(item.dose_id)
        .bind(item.set_unit_id)
        .bind(item.consume_time_id)
        .bind(item.det_id)
        .bind(item.usage_id)
        .bind(item.must_finish)
        .bind(item.print_eticket)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    /// Inserts a medicine item.
    pub async fn create_medicine_item(&mut self, item: &NewMedicineItem) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO prescription_medicine_item (
                prescription_set_item_id, medicine_id, qty, unit_id,
                price, discount_percentage, discount_amount, subtotal
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING id
            "#,
        )
        .bind(item.prescription_set_item_id)
        .bind(item.medicine_id)
        .bind(item.qty)
        .bind(item.unit_id)
        .bind(item.price)
        .bind(item.discount_percentage)
        .bind(item.discount_amount)
        .bind(item.subtotal)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    /// Inserts an e-ticket with an empty `pdf_url`.
    pub async fn create_eticket(&mut self, eticket: &NewEticket) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO eticket (
                prescription_id, prescription_set_item_id, number, medicine_qty, size, pdf_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, '')
            RETURNING id
            "#,
        )
        .bind(eticket.prescription_id)
        .bind(eticket.prescription_set_item_id)
        .bind(eticket.number)
        .bind(eticket.medicine_qty)
        .bind(eticket.size.as_str())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Point lookups
    // -------------------------------------------------------------------------

    /// Gets a prescription by id, soft-deleted rows included.
    pub async fn get_by_id(&mut self, id: Id) -> DbResult<Option<Prescription>> {
        let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescription WHERE id = ?1");

        let row = sqlx::query_as::<_, PrescriptionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Prescription::try_from).transpose()
    }

    /// Gets a live prescription by id.
    pub async fn get_live_by_id(&mut self, id: Id) -> DbResult<Option<Prescription>> {
        Ok(self.get_by_id(id).await?.filter(|p| !p.is_deleted()))
    }

    /// All live prescriptions carrying `number`, newest first.
    pub async fn get_by_number(&mut self, number: i64) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescription \
             WHERE number = ?1 AND deleted_at IS NULL \
             ORDER BY prescription_date DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, PrescriptionRow>(&sql)
            .bind(number)
            .fetch_all(&mut *self.conn)
            .await?;

        rows.into_iter().map(Prescription::try_from).collect()
    }

    /// Finds the id of a prescription by its identifying tuple
    /// (invoice, number, date, patient, total price, doctor).
    pub async fn get_id(&mut self, prescription: &NewPrescription) -> DbResult<Option<Id>> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            SELECT id FROM prescription
            WHERE invoice_id = ?1
              AND number = ?2
              AND prescription_date = ?3
              AND patient_id = ?4
              AND total_price = ?5
              AND doctor_id = ?6
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(prescription.invoice_id)
        .bind(prescription.number)
        .bind(prescription.prescription_date.with_timezone(&Utc))
        .bind(prescription.patient_id)
        .bind(prescription.total_price)
        .bind(prescription.doctor_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    /// Live prescriptions dated inside `[start, end)`, newest first.
    pub async fn list(
        &mut self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        filter: &ListFilter,
    ) -> DbResult<Vec<PrescriptionListing>> {
        let (condition, value) = match filter {
            ListFilter::All => return self.list_where(start, end, None).await,
            ListFilter::Id(id) => ("p.id = ?3", FilterValue::Int(*id)),
            ListFilter::UserId(id) => ("p.user_id = ?3", FilterValue::Int(*id)),
            ListFilter::PatientId(id) => ("p.patient_id = ?3", FilterValue::Int(*id)),
            ListFilter::DoctorId(id) => ("p.doctor_id = ?3", FilterValue::Int(*id)),
            ListFilter::InvoiceId(id) => ("p.invoice_id = ?3", FilterValue::Int(*id)),
            ListFilter::Number(number) => {
                let exact = self
                    .list_where(start, end, Some(("p.number = ?3", FilterValue::Int(*number))))
                    .await?;
                if !exact.is_empty() {
                    return Ok(exact);
                }

                debug!(number, "No exact number match, searching by digits");
                (
                    "CAST(p.number AS TEXT) LIKE ?3",
                    FilterValue::Text(number_search_pattern(*number)),
                )
            }
        };

        self.list_where(start, end, Some((condition, value))).await
    }

    async fn list_where(
        &mut self,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        condition: Option<(&'static str, FilterValue)>,
    ) -> DbResult<Vec<PrescriptionListing>> {
        let (clause, value) = match condition {
            Some((clause, value)) => (format!("AND {clause}"), Some(value)),
            None => (String::new(), None),
        };

        let sql = format!(
            "{LISTING_SELECT} {clause} ORDER BY p.prescription_date DESC, p.id DESC"
        );

        let query = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(start.with_timezone(&Utc))
            .bind(end.with_timezone(&Utc));

        let query = match value {
            Some(FilterValue::Int(v)) => query.bind(v),
            Some(FilterValue::Text(v)) => query.bind(v),
            None => query,
        };

        let rows = query.fetch_all(&mut *self.conn).await?;

        rows.into_iter().map(PrescriptionListing::try_from).collect()
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    /// Set items of a prescription in insertion order.
    pub async fn get_set_items(&mut self, prescription_id: Id) -> DbResult<Vec<PrescriptionSetItem>> {
        let rows = sqlx::query_as::<_, (Id, Id, Id, Id, Id, Id, Id, Id, bool, bool, Option<Id>)>(
            r#"
            SELECT id, prescription_id, mf_id, dose_id, set_unit_id,
                   consume_time_id, det_id, usage_id, must_finish, print_eticket, eticket_id
            FROM prescription_set_item
            WHERE prescription_id = ?1
            ORDER BY id
            "#,
        )
        .bind(prescription_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, prescription_id, mf_id, dose_id, set_unit_id, consume_time_id, det_id, usage_id, must_finish, print_eticket, eticket_id)| {
                    PrescriptionSetItem {
                        id,
                        prescription_id,
                        mf_id,
                        dose_id,
                        set_unit_id,
                        consume_time_id,
                        det_id,
                        usage_id,
                        must_finish,
                        print_eticket,
                        eticket_id,
                    }
                },
            )
            .collect())
    }

    /// Medicine items of one set item in insertion order.
    pub async fn get_medicine_items(&mut self, set_item_id: Id) -> DbResult<Vec<PrescriptionMedicineItem>> {
        let rows = sqlx::query_as::<_, (Id, Id, Id, f64, Id, f64, f64, f64, f64)>(
            r#"
            SELECT id, prescription_set_item_id, medicine_id, qty, unit_id,
                   price, discount_percentage, discount_amount, subtotal
            FROM prescription_medicine_item
            WHERE prescription_set_item_id = ?1
            ORDER BY id
            "#,
        )
        .bind(set_item_id)
        .fetch_all(&mut *self.conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, prescription_set_item_id, medicine_id, qty, unit_id, price, discount_percentage, discount_amount, subtotal)| {
                    PrescriptionMedicineItem {
                        id,
                        prescription_set_item_id,
                        medicine_id,
                        qty,
                        unit_id,
                        price,
                        discount_percentage,
                        discount_amount,
                        subtotal,
                    }
                },
            )
            .collect())
    }

    /// Every medicine item of a prescription, across all its set items.
    pub async fn get_all_medicine_items(&mut self, prescription_id: Id) -> DbResult<Vec<PrescriptionMedicineItem>> {
        let mut items = Vec::new();
        for set_item in self.get_set_items(prescription_id).await? {
            items.extend(self.get_medicine_items(set_item.id).await?);
        }
        Ok(items)
    }

    /// E-tickets of a prescription, ordered by id.
    pub async fn get_etickets(&mut self, prescription_id: Id) -> DbResult<Vec<Eticket>> {
        let rows = sqlx::query_as::<_, EticketRow>(
            r#"
            SELECT id, prescription_id, prescription_set_item_id, number, medicine_qty, size, pdf_url
            FROM eticket
            WHERE prescription_id = ?1
            ORDER BY id
            "#,
        )
        .bind(prescription_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(Eticket::try_from).collect()
    }

    // -------------------------------------------------------------------------
    // Detail
    // -------------------------------------------------------------------------

    /// Full read model of one prescription with names resolved.
    pub async fn get_detail(&mut self, id: Id) -> DbResult<Option<PrescriptionDetail>> {
        let header = sqlx::query_as::<_, DetailHeaderRow>(
            r#"
            SELECT
                p.id, p.number, p.prescription_date, p.prescription_utc_offset,
                p.qty, p.price, p.total_price, p.description,
                p.created_at, p.last_modified,
                lm.name AS last_modified_by_user_name,
                p.pdf_url,
                i.number AS invoice_number,
                c.name AS customer_name,
                i.total_price AS invoice_total_price,
                i.invoice_date,
                pt.id AS patient_id, pt.name AS patient_name, pt.age AS patient_age,
                d.id AS doctor_id, d.name AS doctor_name,
                u.id AS user_id, u.name AS user_name
            FROM prescription p
            JOIN patient pt ON pt.id = p.patient_id
            JOIN doctor d ON d.id = p.doctor_id
            JOIN user u ON u.id = p.user_id
            JOIN user lm ON lm.id = p.last_modified_by_user_id
            JOIN invoice i ON i.id = p.invoice_id
            JOIN customer c ON c.id = i.customer_id
            WHERE p.id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let medicine_sets = self.get_set_item_details(id).await?;

        Ok(Some(PrescriptionDetail {
            id: header.id,
            number: header.number,
            prescription_date: to_local(header.prescription_date, header.prescription_utc_offset)?,
            qty: header.qty,
            price: header.price,
            total_price: header.total_price,
            description: header.description,
            created_at: header.created_at,
            last_modified: header.last_modified,
            last_modified_by_user_name: header.last_modified_by_user_name,
            presc_pdf_url: header.pdf_url,
            invoice: InvoiceSummary {
                number: header.invoice_number,
                customer_name: header.customer_name,
                total_price: header.invoice_total_price,
                invoice_date: header.invoice_date,
            },
            patient: PatientSummary {
                id: header.patient_id,
                name: header.patient_name,
                age: header.patient_age,
            },
            doctor: NamedRef {
                id: header.doctor_id,
                name: header.doctor_name,
            },
            user: NamedRef {
                id: header.user_id,
                name: header.user_name,
            },
            medicine_sets,
        }))
    }

    /// Set items with vocabulary names and their medicine lines.
    pub async fn get_set_item_details(&mut self, prescription_id: Id) -> DbResult<Vec<SetItemDetail>> {
        let sets = sqlx::query_as::<_, SetItemDetailRow>(
            r#"
            SELECT
                s.id,
                mf.name AS mf,
                dose.name AS dose,
                unit.name AS set_unit,
                ct.name AS consume_time,
                det.name AS det,
                su.name AS usage,
                s.must_finish, s.print_eticket, s.eticket_id
            FROM prescription_set_item s
            JOIN mf ON mf.id = s.mf_id
            JOIN dose ON dose.id = s.dose_id
            JOIN unit ON unit.id = s.set_unit_id
            JOIN consume_time ct ON ct.id = s.consume_time_id
            JOIN det ON det.id = s.det_id
            JOIN prescription_set_usage su ON su.id = s.usage_id
            WHERE s.prescription_id = ?1
            ORDER BY s.id
            "#,
        )
        .bind(prescription_id)
        .fetch_all(&mut *self.conn)
        .await?;

        let mut details = Vec::with_capacity(sets.len());
        for set in sets {
            let medicine_items = sqlx::query_as::<_, MedicineItemDetailRow>(
                r#"
                SELECT
                    m.barcode AS medicine_barcode,
                    m.name AS medicine_name,
                    mi.qty,
                    un.name AS unit,
                    mi.price, mi.discount_percentage, mi.discount_amount, mi.subtotal
                FROM prescription_medicine_item mi
                JOIN medicine m ON m.id = mi.medicine_id
                JOIN unit un ON un.id = mi.unit_id
                WHERE mi.prescription_set_item_id = ?1
                ORDER BY mi.id
                "#,
            )
            .bind(set.id)
            .fetch_all(&mut *self.conn)
            .await?
            .into_iter()
            .map(MedicineItemDetail::from)
            .collect();

            details.push(SetItemDetail {
                id: set.id,
                mf: set.mf,
                dose: set.dose,
                set_unit: set.set_unit,
                consume_time: set.consume_time,
                det: set.det,
                usage: set.usage,
                must_finish: set.must_finish,
                print_eticket: set.print_eticket,
                eticket_id: set.eticket_id,
                medicine_items,
            });
        }

        Ok(details)
    }

    // -------------------------------------------------------------------------
    // Updates
    // -------------------------------------------------------------------------

    /// Replaces the header fields of a live prescription.
    ///
    /// The previous row is written to the audit log first.
    pub async fn modify(&mut self, id: Id, prescription: &NewPrescription, user: &User) -> DbResult<()> {
        let previous = self
            .get_live_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Prescription", id))?;

        self.audit()
            .record(
                AuditAction::Modify,
                "prescription",
                id,
                user.id,
                &json!({ "previous": previous }),
            )
            .await?;

        let date = prescription.prescription_date;

        sqlx::query(
            r#"
            UPDATE prescription SET
                invoice_id = ?2,
                number = ?3,
                prescription_date = ?4,
                prescription_utc_offset = ?5,
                prescription_day = ?6,
                patient_id = ?7,
                doctor_id = ?8,
                qty = ?9,
                price = ?10,
                total_price = ?11,
                description = ?12,
                last_modified = ?13,
                last_modified_by_user_id = ?14
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(prescription.invoice_id)
        .bind(prescription.number)
        .bind(date.with_timezone(&Utc))
        .bind(date.offset().local_minus_utc())
        .bind(day_key(date))
        .bind(prescription.patient_id)
        .bind(prescription.doctor_id)
        .bind(prescription.qty)
        .bind(prescription.price)
        .bind(prescription.total_price)
        .bind(&prescription.description)
        .bind(Utc::now())
        .bind(user.id)
        .execute(&mut *self.conn)
        .await
        .map_err(|e| with_number(e.into(), prescription.number))?;

        Ok(())
    }

    /// Stores the generated PDF filename of a prescription or e-ticket.
    pub async fn update_pdf_url(&mut self, kind: ArtifactKind, id: Id, filename: &str) -> DbResult<()> {
        let sql = format!("UPDATE {} SET pdf_url = ?2 WHERE id = ?1", kind.table());

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(filename)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.table(), id));
        }

        Ok(())
    }

    /// Points a set item at its e-ticket.
    pub async fn update_eticket_id(&mut self, eticket_id: Id, set_item_id: Id) -> DbResult<()> {
        let result = sqlx::query("UPDATE prescription_set_item SET eticket_id = ?1 WHERE id = ?2")
            .bind(eticket_id)
            .bind(set_item_id)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Set item", set_item_id));
        }

        Ok(())
    }

    /// Records whether an extra copy of the main PDF exists.
    pub async fn update_print_extra_pdf(&mut self, id: Id, value: bool) -> DbResult<()> {
        sqlx::query("UPDATE prescription SET print_extra_pdf = ?2 WHERE id = ?1")
            .bind(id)
            .bind(value)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// True if any row of the kind's table already carries `filename`.
    pub async fn is_pdf_url_exist(&mut self, kind: ArtifactKind, filename: &str) -> DbResult<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE pdf_url = ?1", kind.table());

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(filename)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(count > 0)
    }

    /// True when no live prescription dated in `[start, end)` uses `number`.
    ///
    /// ## Arguments
    /// * `exclude_id` - Ignore this prescription (the one being modified)
    pub async fn is_valid_number(
        &mut self,
        number: i64,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        exclude_id: Option<Id>,
    ) -> DbResult<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM prescription
            WHERE number = ?1
              AND prescription_date >= ?2
              AND prescription_date < ?3
              AND deleted_at IS NULL
              AND (?4 IS NULL OR id != ?4)
            "#,
        )
        .bind(number)
        .bind(start.with_timezone(&Utc))
        .bind(end.with_timezone(&Utc))
        .bind(exclude_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(count == 0)
    }

    // -------------------------------------------------------------------------
    // Deletes
    // -------------------------------------------------------------------------

    /// Soft-deletes a prescription.
    pub async fn soft_delete(&mut self, prescription: &Prescription, user: &User) -> DbResult<()> {
        debug!(prescription_id = prescription.id, "Soft-deleting prescription");

        let result = sqlx::query(
            r#"
            UPDATE prescription SET deleted_at = ?2, deleted_by_user_id = ?3
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(prescription.id)
        .bind(Utc::now())
        .bind(user.id)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Prescription", prescription.id));
        }

        self.audit()
            .record(
                AuditAction::Delete,
                "prescription",
                prescription.id,
                user.id,
                &json!({ "row": prescription }),
            )
            .await
    }

    /// Deletes every e-ticket of a prescription.
    pub async fn delete_etickets(&mut self, prescription: &Prescription, user: &User) -> DbResult<()> {
        let etickets = self.get_etickets(prescription.id).await?;
        if etickets.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM eticket WHERE prescription_id = ?1")
            .bind(prescription.id)
            .execute(&mut *self.conn)
            .await?;

        self.audit()
            .record(
                AuditAction::Delete,
                "eticket",
                prescription.id,
                user.id,
                &json!({ "prescription": reference(prescription), "deleted": etickets }),
            )
            .await
    }

    /// Deletes the medicine items of one set item.
    pub async fn delete_medicine_items(
        &mut self,
        prescription: &Prescription,
        set_item_id: Id,
        user: &User,
    ) -> DbResult<()> {
        let items = self.get_medicine_items(set_item_id).await?;
        if items.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM prescription_medicine_item WHERE prescription_set_item_id = ?1")
            .bind(set_item_id)
            .execute(&mut *self.conn)
            .await?;

        self.audit()
            .record(
                AuditAction::Delete,
                "prescription_medicine_item",
                prescription.id,
                user.id,
                &json!({
                    "prescription": reference(prescription),
                    "setItemId": set_item_id,
                    "deleted": items,
                }),
            )
            .await
    }

    /// Deletes every set item of a prescription.
    ///
    /// E-tickets and medicine items must already be gone.
    pub async fn delete_set_items(&mut self, prescription: &Prescription, user: &User) -> DbResult<()> {
        let set_items = self.get_set_items(prescription.id).await?;
        if set_items.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM prescription_set_item WHERE prescription_id = ?1")
            .bind(prescription.id)
            .execute(&mut *self.conn)
            .await?;

        self.audit()
            .record(
                AuditAction::Delete,
                "prescription_set_item",
                prescription.id,
                user.id,
                &json!({ "prescription": reference(prescription), "deleted": set_items }),
            )
            .await
    }

    /// Removes all children of a prescription in FK-safe order.
    pub async fn delete_children(&mut self, prescription: &Prescription, user: &User) -> DbResult<()> {
        self.delete_etickets(prescription, user).await?;
        for set_item in self.get_set_items(prescription.id).await? {
            self.delete_medicine_items(prescription, set_item.id, user).await?;
        }
        self.delete_set_items(prescription, user).await
    }

    /// Hard-deletes the prescription matching the tuple and every child row.
    ///
    /// Safe on any partial state: a tuple with no match is a no-op.
    ///
    /// ## Returns
    /// `true` when a prescription was found and removed.
    pub async fn absolute_delete(&mut self, prescription: &NewPrescription) -> DbResult<bool> {
        let Some(id) = self.get_id(prescription).await? else {
            return Ok(false);
        };

        debug!(prescription_id = id, "Absolute delete");

        sqlx::query("DELETE FROM eticket WHERE prescription_id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM prescription_medicine_item
            WHERE prescription_set_item_id IN (
                SELECT id FROM prescription_set_item WHERE prescription_id = ?1
            )
            "#,
        )
        .bind(id)
        .execute(&mut *self.conn)
        .await?;

        sqlx::query("DELETE FROM prescription_set_item WHERE prescription_id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        sqlx::query("DELETE FROM prescription WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(true)
    }
}

/// Compact reference to a prescription used inside audit payloads.
fn reference(prescription: &Prescription) -> serde_json::Value {
    json!({ "id": prescription.id, "number": prescription.number })
}

/// Attaches the offending number to a per-day index violation.
fn with_number(err: DbError, number: i64) -> DbError {
    match err {
        DbError::UniqueViolation { field, .. } => DbError::duplicate(field, number),
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
