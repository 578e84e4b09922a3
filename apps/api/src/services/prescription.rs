//! # Prescription Service
//!
//! Orchestrates register, list, detail, delete and modify on top of the
//! repositories and the artifact coordinator.
//!
//! ## Register / Modify Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate payload                                                       │
//! │  BEGIN                                                                  │
//! │  ├── resolve customer → invoice (day window), doctor, patient           │
//! │  ├── number free on that day?            no → DuplicateNumber           │
//! │  ├── insert / update prescription header                                │
//! │  ├── for each set (set_number = 1..)                                    │
//! │  │   ├── upsert vocabulary, insert set item                             │
//! │  │   ├── printEticket → insert e-ticket, link, render e-XXXX.pdf        │
//! │  │   └── for each medicine → insert item, CheckStock                    │
//! │  ├── render p-XXXX.pdf (+ extra copy, non-fatal)                        │
//! │  └── guarded stock subtraction in barcode order                         │
//! │  COMMIT ──► settle files          any error ──► ROLLBACK + remove files │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info, warn};

use apotek_core::date;
use apotek_core::document::{DocumentItem, DocumentSet, EticketDocument, PrescriptionDocument};
use apotek_core::filename::ArtifactKind;
use apotek_core::payload::{
    ModifyPrescriptionPayload, PrescriptionArtifactsResponse, RegisterPrescriptionPayload,
    SetItemPayload,
};
use apotek_core::selector::ListSelector;
use apotek_core::stock;
use apotek_core::validation;
use apotek_core::{
    EticketSize, Id, NewEticket, NewMedicineItem, NewPrescription, NewSetItem, PrescriptionDetail,
    PrescriptionListing, PrescriptionMedicineItem, User,
};
use apotek_db::{
    CatalogRepository, DbError, ListFilter, NamedSubject, PrescriptionRepository, StockRepository,
    Vocabulary,
};

use crate::error::{ApiError, ApiResult};
use crate::pdf::PrescriptionHeader;
use crate::services::artifact::{self, ArtifactCoordinator};
use crate::state::AppState;

/// Base-unit amount one request takes from a medicine.
#[derive(Debug, Clone, PartialEq)]
struct StockDemand {
    medicine_id: Id,
    name: String,
    amount: f64,
}

/// Demand keyed by barcode so subtraction runs in a stable order.
type Demand = BTreeMap<String, StockDemand>;

/// Prescription use cases.
pub struct PrescriptionService {
    state: AppState,
}

impl PrescriptionService {
    /// Create a new prescription service.
    pub fn new(state: AppState) -> Self {
        PrescriptionService { state }
    }

    fn artifacts(&self) -> ArtifactCoordinator {
        ArtifactCoordinator::new(
            self.state.pdf.clone(),
            self.state.config.static_dir.clone(),
            PrescriptionHeader::from_config(&self.state.config),
        )
    }

    // =========================================================================
    // Register
    // =========================================================================

    /// Persists a prescription with its sets, renders its PDFs and takes the
    /// medicines out of stock, all or nothing.
    pub async fn register(
        &self,
        user: &User,
        payload: &RegisterPrescriptionPayload,
    ) -> ApiResult<PrescriptionArtifactsResponse> {
        self.state.validator.validate_register(payload)?;
        artifact::ensure_layout(&self.state.config.static_dir)?;

        let mut tx = self.state.db.begin().await?;
        let mut artifacts = self.artifacts();

        let result = self.register_in(&mut tx, &mut artifacts, user, payload).await;
        let response = settle(tx, artifacts, result).await?;

        info!(
            number = payload.number,
            user = %user.name,
            etickets = response.eticket_pdf.len(),
            "Prescription registered"
        );
        Ok(response)
    }

    async fn register_in(
        &self,
        conn: &mut SqliteConnection,
        artifacts: &mut ArtifactCoordinator,
        user: &User,
        payload: &RegisterPrescriptionPayload,
    ) -> ApiResult<PrescriptionArtifactsResponse> {
        let header = resolve_header(conn, payload).await?;
        ensure_number_free(conn, &header, None).await?;

        let id = PrescriptionRepository::new(&mut *conn).create(&header, user.id).await?;
        debug!(prescription_id = id, number = header.number, "Prescription header inserted");

        let (eticket_pdf, demand) = insert_sets(conn, artifacts, id, &header, payload).await?;

        let doc = prescription_document(conn, id).await?;
        let prescription_pdf = artifacts.render_prescription(conn, &doc).await?;
        PrescriptionRepository::new(&mut *conn)
            .update_pdf_url(ArtifactKind::Prescription, id, &prescription_pdf)
            .await?;

        if payload.print_extra {
            render_extra(conn, artifacts, id, &doc, &prescription_pdf).await?;
        }

        subtract_stock(conn, &demand, user).await?;

        Ok(PrescriptionArtifactsResponse {
            success: format!(
                "prescription {} successfully created by {}",
                header.number, user.name
            ),
            prescription_pdf,
            eticket_pdf,
        })
    }

    // =========================================================================
    // List / Detail
    // =========================================================================

    /// Live prescriptions dated between the two calendar days (inclusive),
    /// narrowed by the `{params}/{val}` selector.
    pub async fn list(
        &self,
        start_date: &str,
        end_date: &str,
        params: &str,
        val: &str,
    ) -> ApiResult<Vec<PrescriptionListing>> {
        let start = date::start_of_day(date::parse_date(start_date)?);
        let end = date::end_of_day(date::parse_date(end_date)?);
        let selector = ListSelector::parse(params, val)?;

        let mut conn = self.state.db.acquire().await?;
        let filters = list_filters(&mut conn, selector).await?;

        let mut repo = PrescriptionRepository::new(&mut conn);
        let mut seen = HashSet::new();
        let mut rows = Vec::new();

        for filter in &filters {
            for row in repo.list(start, end, filter).await? {
                if seen.insert(row.id) {
                    rows.push(row);
                }
            }
        }

        debug!(params, val, count = rows.len(), "Prescriptions listed");
        Ok(rows)
    }

    /// Full record of one prescription, deleted or not.
    pub async fn detail(&self, id: Id) -> ApiResult<PrescriptionDetail> {
        let mut conn = self.state.db.acquire().await?;

        PrescriptionRepository::new(&mut conn)
            .get_detail(id)
            .await?
            .ok_or_else(|| missing_prescription(id))
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Soft-deletes a prescription, drops its children and puts the
    /// medicines back into stock. Administrators only.
    pub async fn delete(&self, user: &User, id: Id) -> ApiResult<String> {
        if !user.admin {
            return Err(ApiError::Forbidden(format!(
                "user {} is not allowed to delete prescriptions",
                user.name
            )));
        }

        let mut tx = self.state.db.begin().await?;

        let number = {
            let mut repo = PrescriptionRepository::new(&mut tx);
            let prescription = repo
                .get_live_by_id(id)
                .await?
                .ok_or_else(|| missing_prescription(id))?;
            let items = repo.get_all_medicine_items(id).await?;

            repo.delete_children(&prescription, user).await?;
            repo.soft_delete(&prescription, user).await?;

            restore_stock(&mut tx, &items, user).await?;
            prescription.number
        };

        tx.commit().await.map_err(DbError::from)?;

        info!(prescription_id = id, number, user = %user.name, "Prescription deleted");
        Ok(format!("prescription number {} deleted by {}", number, user.name))
    }

    // =========================================================================
    // Modify
    // =========================================================================

    /// Replaces the header and every set of a live prescription.
    ///
    /// The main PDF keeps its filename; e-tickets get new ones.
    pub async fn modify(
        &self,
        user: &User,
        payload: &ModifyPrescriptionPayload,
    ) -> ApiResult<PrescriptionArtifactsResponse> {
        self.state.validator.validate_register(&payload.new_data)?;
        artifact::ensure_layout(&self.state.config.static_dir)?;

        let mut tx = self.state.db.begin().await?;
        let mut artifacts = self.artifacts();

        let result = self.modify_in(&mut tx, &mut artifacts, user, payload).await;
        let response = settle(tx, artifacts, result).await?;

        info!(prescription_id = payload.id, user = %user.name, "Prescription modified");
        Ok(response)
    }

    async fn modify_in(
        &self,
        conn: &mut SqliteConnection,
        artifacts: &mut ArtifactCoordinator,
        user: &User,
        payload: &ModifyPrescriptionPayload,
    ) -> ApiResult<PrescriptionArtifactsResponse> {
        let id = payload.id;
        let data = &payload.new_data;

        let existing = PrescriptionRepository::new(&mut *conn)
            .get_live_by_id(id)
            .await?
            .ok_or_else(|| missing_prescription(id))?;

        // Put the old items back before anything is re-checked against stock.
        let (old_items, old_etickets) = {
            let mut repo = PrescriptionRepository::new(&mut *conn);
            (repo.get_all_medicine_items(id).await?, repo.get_etickets(id).await?)
        };
        restore_stock(conn, &old_items, user).await?;
        PrescriptionRepository::new(&mut *conn)
            .delete_children(&existing, user)
            .await?;

        let header = resolve_header(conn, data).await?;
        ensure_number_free(conn, &header, Some(id)).await?;
        PrescriptionRepository::new(&mut *conn)
            .modify(id, &header, user)
            .await?;

        let (eticket_pdf, demand) = insert_sets(conn, artifacts, id, &header, data).await?;
        for eticket in &old_etickets {
            artifacts.retire_eticket(&eticket.pdf_url);
        }

        let doc = prescription_document(conn, id).await?;
        let prescription_pdf = if existing.pdf_url.is_empty() {
            let name = artifacts.render_prescription(conn, &doc).await?;
            PrescriptionRepository::new(&mut *conn)
                .update_pdf_url(ArtifactKind::Prescription, id, &name)
                .await?;
            name
        } else {
            artifacts.rerender_prescription(&doc, &existing.pdf_url)?;
            existing.pdf_url.clone()
        };

        if data.print_extra {
            render_extra(conn, artifacts, id, &doc, &prescription_pdf).await?;
        } else if existing.print_extra_pdf {
            artifacts.retire_extra(&prescription_pdf);
            PrescriptionRepository::new(&mut *conn)
                .update_print_extra_pdf(id, false)
                .await?;
        }

        subtract_stock(conn, &demand, user).await?;

        Ok(PrescriptionArtifactsResponse {
            success: format!("prescription modified by {}", user.name),
            prescription_pdf,
            eticket_pdf,
        })
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Commits or rolls back the transaction and settles the files with it.
async fn settle<T>(
    tx: Transaction<'static, Sqlite>,
    artifacts: ArtifactCoordinator,
    result: ApiResult<T>,
) -> ApiResult<T> {
    match result {
        Ok(value) => match tx.commit().await {
            Ok(()) => {
                artifacts.commit();
                Ok(value)
            }
            Err(e) => {
                artifacts.rollback();
                Err(DbError::from(e).into())
            }
        },
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Transaction rollback failed");
            }
            artifacts.rollback();
            Err(err)
        }
    }
}

fn missing_prescription(id: Id) -> ApiError {
    ApiError::ReferenceNotFound(format!("prescription {} doesn't exists", id))
}

// =============================================================================
// Resolution
// =============================================================================

/// Turns the payload header into row values, creating doctor and patient
/// on first use. Customer and invoice must already exist.
async fn resolve_header(
    conn: &mut SqliteConnection,
    payload: &RegisterPrescriptionPayload,
) -> ApiResult<NewPrescription> {
    let mut catalog = CatalogRepository::new(conn);
    let invoice = &payload.invoice;

    let customer_id = catalog
        .get_customer_id(&invoice.customer_name)
        .await?
        .ok_or_else(|| {
            ApiError::ReferenceNotFound(format!("customer {} doesn't exists", invoice.customer_name))
        })?;

    let invoice_day = date::start_of_day(date::parse_date(&invoice.invoice_date)?);
    let invoice_id = catalog
        .find_invoice_id(
            invoice.number,
            customer_id,
            invoice_day.with_timezone(&Utc),
            (invoice_day + Duration::days(1)).with_timezone(&Utc),
        )
        .await?
        .ok_or_else(|| {
            ApiError::ReferenceNotFound(format!(
                "invoice {} for {} on {} doesn't exists",
                invoice.number,
                invoice.customer_name,
                date::day_key(invoice_day)
            ))
        })?;

    let doctor_id = catalog.get_or_create_doctor(&payload.doctor_name).await?;
    let patient_id = catalog
        .get_or_create_patient(&payload.patient_name, payload.patient_age)
        .await?;

    let prescription_date = date::parse_date(&payload.prescription_date)?;

    Ok(NewPrescription {
        invoice_id,
        number: payload.number,
        prescription_date,
        patient_id,
        doctor_id,
        qty: payload.qty,
        price: payload.price,
        total_price: payload.total_price,
        description: payload.description.clone(),
    })
}

/// Fails with [`ApiError::DuplicateNumber`] when another live prescription
/// holds the number on the same local day.
async fn ensure_number_free(
    conn: &mut SqliteConnection,
    header: &NewPrescription,
    exclude_id: Option<Id>,
) -> ApiResult<()> {
    let (start, end) = day_window(header.prescription_date);

    let free = PrescriptionRepository::new(conn)
        .is_valid_number(header.number, start, end, exclude_id)
        .await?;

    if !free {
        return Err(ApiError::DuplicateNumber(format!(
            "prescription number {} already exists on {}",
            header.number,
            date::day_key(start)
        )));
    }

    Ok(())
}

/// `[00:00, next 00:00)` of the local calendar day of `date`.
fn day_window(date: DateTime<FixedOffset>) -> (DateTime<FixedOffset>, DateTime<FixedOffset>) {
    let start = date::start_of_day(date);
    (start, start + Duration::days(1))
}

// =============================================================================
// Sets
// =============================================================================

/// Inserts every set of the payload with its e-ticket and medicine items.
///
/// ## Returns
/// E-ticket filenames in set order, and the stock each medicine will lose.
async fn insert_sets(
    conn: &mut SqliteConnection,
    artifacts: &mut ArtifactCoordinator,
    prescription_id: Id,
    header: &NewPrescription,
    payload: &RegisterPrescriptionPayload,
) -> ApiResult<(Vec<String>, Demand)> {
    let mut eticket_pdf = Vec::new();
    let mut demand = Demand::new();

    for (index, set) in payload.set_items.iter().enumerate() {
        let set_number = index + 1;

        let new_set = resolve_set(conn, prescription_id, set).await?;
        let set_item_id = PrescriptionRepository::new(&mut *conn)
            .create_set_item(&new_set)
            .await?;

        if set.print_eticket {
            let name = insert_eticket(
                conn,
                artifacts,
                prescription_id,
                set_item_id,
                set_number,
                header,
                &payload.patient_name,
                set,
            )
            .await?;
            eticket_pdf.push(name);
        }

        for item in &set.medicine_lists {
            let mut catalog = CatalogRepository::new(&mut *conn);

            let medicine = catalog
                .get_medicine_by_barcode(&item.medicine_barcode)
                .await?
                .ok_or_else(|| {
                    ApiError::ReferenceNotFound(format!(
                        "medicine {} doesn't exists",
                        item.medicine_barcode
                    ))
                })?;
            let unit_id = catalog.get_or_create_unit(&item.unit).await?;
            let qty = validation::parse_quantity(&item.qty)?;

            PrescriptionRepository::new(&mut *conn)
                .create_medicine_item(&NewMedicineItem {
                    prescription_set_item_id: set_item_id,
                    medicine_id: medicine.id,
                    qty,
                    unit_id,
                    price: item.price,
                    discount_percentage: item.discount_percentage,
                    discount_amount: item.discount_amount,
                    subtotal: item.subtotal,
                })
                .await?;

            let amount = stock::check_stock(&medicine, unit_id, qty)?;

            let need = demand
                .entry(medicine.barcode.clone())
                .or_insert_with(|| StockDemand {
                    medicine_id: medicine.id,
                    name: medicine.name.clone(),
                    amount: 0.0,
                });
            need.amount = stock::add_amounts(need.amount, amount);
        }
    }

    Ok((eticket_pdf, demand))
}

async fn resolve_set(
    conn: &mut SqliteConnection,
    prescription_id: Id,
    set: &SetItemPayload,
) -> ApiResult<NewSetItem> {
    let mut catalog = CatalogRepository::new(conn);

    Ok(NewSetItem {
        prescription_id,
        mf_id: catalog.get_or_create_term(Vocabulary::Mf, &set.mf).await?,
        dose_id: catalog.get_or_create_term(Vocabulary::Dose, &set.dose).await?,
        set_unit_id: catalog.get_or_create_unit(&set.set_unit).await?,
        consume_time_id: catalog
            .get_or_create_term(Vocabulary::ConsumeTime, &set.consume_time)
            .await?,
        det_id: catalog.get_or_create_term(Vocabulary::Det, &set.det).await?,
        usage_id: catalog.get_or_create_term(Vocabulary::Usage, &set.usage).await?,
        must_finish: set.must_finish,
        print_eticket: set.print_eticket,
    })
}

#[allow(clippy::too_many_arguments)]
async fn insert_eticket(
    conn: &mut SqliteConnection,
    artifacts: &mut ArtifactCoordinator,
    prescription_id: Id,
    set_item_id: Id,
    set_number: usize,
    header: &NewPrescription,
    patient_name: &str,
    set: &SetItemPayload,
) -> ApiResult<String> {
    let eticket = set
        .eticket
        .as_ref()
        .ok_or_else(|| ApiError::Validation("eticket is required".to_string()))?;
    let size: EticketSize = eticket.size.parse()?;

    let eticket_id = {
        let mut repo = PrescriptionRepository::new(&mut *conn);
        let eticket_id = repo
            .create_eticket(&NewEticket {
                prescription_id,
                prescription_set_item_id: set_item_id,
                number: eticket.number,
                medicine_qty: eticket.medicine_qty,
                size,
            })
            .await?;
        repo.update_eticket_id(eticket_id, set_item_id).await?;
        eticket_id
    };

    let doc = EticketDocument {
        number: header.number,
        set_number,
        patient_name: patient_name.to_string(),
        usage: set.usage.clone(),
        dose: set.dose.clone(),
        set_unit: set.set_unit.clone(),
        consume_time: set.consume_time.clone(),
        must_finish: set.must_finish,
        medicine_qty: eticket.medicine_qty,
        size,
        printed_at: Utc::now().with_timezone(header.prescription_date.offset()),
    };

    let name = artifacts.render_eticket(conn, &doc).await?;
    PrescriptionRepository::new(&mut *conn)
        .update_pdf_url(ArtifactKind::Eticket, eticket_id, &name)
        .await?;

    Ok(name)
}

// =============================================================================
// Documents
// =============================================================================

/// Reads the persisted prescription back into printable form.
async fn prescription_document(conn: &mut SqliteConnection, id: Id) -> ApiResult<PrescriptionDocument> {
    let detail = PrescriptionRepository::new(conn)
        .get_detail(id)
        .await?
        .ok_or_else(|| missing_prescription(id))?;

    Ok(document_from_detail(detail))
}

fn document_from_detail(detail: PrescriptionDetail) -> PrescriptionDocument {
    PrescriptionDocument {
        number: detail.number,
        date: detail.prescription_date,
        patient_name: detail.patient.name,
        patient_age: detail.patient.age,
        doctor_name: detail.doctor.name,
        sets: detail
            .medicine_sets
            .into_iter()
            .map(|set| DocumentSet {
                mf: set.mf,
                dose: set.dose,
                set_unit: set.set_unit,
                consume_time: set.consume_time,
                det: set.det,
                usage: set.usage,
                must_finish: set.must_finish,
                items: set
                    .medicine_items
                    .into_iter()
                    .map(|item| DocumentItem {
                        barcode: item.medicine_barcode,
                        name: item.medicine_name,
                        qty: item.qty_string,
                        unit: item.unit,
                        price: item.price,
                        discount_percentage: item.discount_percentage,
                        discount_amount: item.discount_amount,
                        subtotal: item.subtotal,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Renders the extra copy; a failure is logged and the flag stays unset.
async fn render_extra(
    conn: &mut SqliteConnection,
    artifacts: &mut ArtifactCoordinator,
    id: Id,
    doc: &PrescriptionDocument,
    main_name: &str,
) -> ApiResult<()> {
    match artifacts.render_extra(doc, main_name) {
        Ok(()) => {
            PrescriptionRepository::new(conn)
                .update_print_extra_pdf(id, true)
                .await?;
        }
        Err(e) => {
            warn!(prescription_id = id, error = %e, "Extra prescription PDF not generated");
        }
    }
    Ok(())
}

// =============================================================================
// Stock
// =============================================================================

async fn subtract_stock(conn: &mut SqliteConnection, demand: &Demand, user: &User) -> ApiResult<()> {
    let mut stock = StockRepository::new(conn);

    for (barcode, need) in demand {
        let taken = stock.subtract(need.medicine_id, need.amount, user.id).await?;

        if !taken {
            return Err(ApiError::StockInsufficient(format!(
                "insufficient stock for {} ({}): requested {}",
                need.name, barcode, need.amount
            )));
        }
    }

    Ok(())
}

async fn restore_stock(
    conn: &mut SqliteConnection,
    items: &[PrescriptionMedicineItem],
    user: &User,
) -> ApiResult<()> {
    for item in items {
        let medicine = CatalogRepository::new(&mut *conn)
            .get_medicine(item.medicine_id)
            .await?
            .ok_or_else(|| ApiError::StockUpdate(format!("medicine {} doesn't exists", item.medicine_id)))?;

        let amount = stock::base_quantity(&medicine, item.unit_id, item.qty)
            .map_err(|e| ApiError::StockUpdate(e.to_string()))?;

        StockRepository::new(&mut *conn)
            .add(medicine.id, amount, user.id)
            .await
            .map_err(|e| ApiError::StockUpdate(e.to_string()))?;
    }

    Ok(())
}

// =============================================================================
// Listing
// =============================================================================

/// Expands a selector into repository filters. Name selectors fan out over
/// every matching subject in id order.
async fn list_filters(conn: &mut SqliteConnection, selector: ListSelector) -> ApiResult<Vec<ListFilter>> {
    let (subject, fragment, to_filter): (NamedSubject, String, fn(Id) -> ListFilter) = match selector {
        ListSelector::All => return Ok(vec![ListFilter::All]),
        ListSelector::Id(id) => return Ok(vec![ListFilter::Id(id)]),
        ListSelector::Number(number) => return Ok(vec![ListFilter::Number(number)]),
        ListSelector::InvoiceId(id) => return Ok(vec![ListFilter::InvoiceId(id)]),
        ListSelector::User(name) => (NamedSubject::User, name, ListFilter::UserId),
        ListSelector::Patient(name) => (NamedSubject::Patient, name, ListFilter::PatientId),
        ListSelector::Doctor(name) => (NamedSubject::Doctor, name, ListFilter::DoctorId),
    };

    let ids = CatalogRepository::new(conn)
        .search_ids(subject, &fragment)
        .await?;

    Ok(ids.into_iter().map(to_filter).collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{register_payload, TestApp};
    use apotek_core::payload::{EticketPayload, MedicineItemPayload};

    #[tokio::test]
    async fn test_register_creates_rows_files_and_takes_stock() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());

        let response = service.register(&app.admin, &register_payload(7, "1")).await.unwrap();

        assert_eq!(response.success, "prescription 7 successfully created by admin");
        assert_eq!(response.eticket_pdf.len(), 1);
        assert!(app.prescription_file(&response.prescription_pdf).exists());
        assert!(app.eticket_file(&response.eticket_pdf[0]).exists());
        assert_eq!(app.stock("BX1").await, 99.0);

        let mut conn = app.state.db.acquire().await.unwrap();
        let rows = PrescriptionRepository::new(&mut conn).get_by_number(7).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pdf_url, response.prescription_pdf);
        assert!(!rows[0].print_extra_pdf);
    }

    #[tokio::test]
    async fn test_register_accumulates_stock_per_medicine() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());

        let mut payload = register_payload(8, "2");
        let second = payload.set_items[0].clone();
        payload.set_items.push(second);

        service.register(&app.admin, &payload).await.unwrap();
        assert_eq!(app.stock("BX1").await, 96.0);
    }

    #[tokio::test]
    async fn test_cumulative_shortage_rolls_back() {
        let app = TestApp::new().await;
        app.set_stock("BX1", 3.0).await;
        let service = PrescriptionService::new(app.state.clone());

        // Each line passes CheckStock alone; together they need 4.
        let mut payload = register_payload(9, "2");
        let second = payload.set_items[0].clone();
        payload.set_items.push(second);

        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::StockInsufficient(_)));
        assert_eq!(app.stock("BX1").await, 3.0);
        assert_eq!(app.file_count(), 0);
    }

    #[tokio::test]
    async fn test_fractional_lines_may_use_all_remaining_stock() {
        let app = TestApp::new().await;
        app.set_stock("BX1", 0.3).await;
        let service = PrescriptionService::new(app.state.clone());

        let mut payload = register_payload(15, "0.1");
        let mut second = payload.set_items[0].clone();
        second.medicine_lists[0].qty = "0.2".to_string();
        payload.set_items.push(second);

        service.register(&app.admin, &payload).await.unwrap();
        assert_eq!(app.stock("BX1").await, 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_all_commit() {
        let app = TestApp::file_backed(5).await;

        let tasks: Vec<_> = (200..208)
            .map(|number| {
                let service = PrescriptionService::new(app.state.clone());
                let admin = app.admin.clone();
                tokio::spawn(async move { service.register(&admin, &register_payload(number, "1")).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(app.prescription_count().await, 8);
        assert_eq!(app.stock("BX1").await, 92.0);
    }

    #[tokio::test]
    async fn test_register_with_extra_copy() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());

        let mut payload = register_payload(10, "1");
        payload.print_extra = true;

        let response = service.register(&app.admin, &payload).await.unwrap();
        assert!(artifact::extra_path(app.root(), &response.prescription_pdf).exists());

        let mut conn = app.state.db.acquire().await.unwrap();
        let rows = PrescriptionRepository::new(&mut conn).get_by_number(10).await.unwrap();
        assert!(rows[0].print_extra_pdf);
    }

    #[tokio::test]
    async fn test_unknown_references() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());

        let mut payload = register_payload(11, "1");
        payload.invoice.customer_name = "Nobody".to_string();
        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::ReferenceNotFound(msg) if msg == "customer Nobody doesn't exists"));

        let mut payload = register_payload(11, "1");
        payload.invoice.invoice_date = "2024-06-04 +0700WIB".to_string();
        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::ReferenceNotFound(_)));

        let mut payload = register_payload(11, "1");
        payload.set_items[0].medicine_lists[0].medicine_barcode = "ZZZ".to_string();
        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::ReferenceNotFound(msg) if msg == "medicine ZZZ doesn't exists"));

        assert_eq!(app.file_count(), 0);
        assert_eq!(app.stock("BX1").await, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_unit_and_bad_quantity() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());

        let mut payload = register_payload(12, "1");
        payload.set_items[0].medicine_lists[0].unit = "sachet".to_string();
        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg.contains("unknown unit name")));

        let err = service
            .register(&app.admin, &register_payload(12, "1/0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));

        let mut payload = register_payload(12, "1");
        payload.prescription_date = "2024/06/03".to_string();
        let err = service.register(&app.admin, &payload).await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[tokio::test]
    async fn test_list_by_name_deduplicates() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());
        service.register(&app.admin, &register_payload(20, "1")).await.unwrap();
        service.register(&app.admin, &register_payload(21, "1")).await.unwrap();

        let day = "2024-06-03 +0700WIB";
        let all = service.list(day, day, "id", "all").await.unwrap();
        assert_eq!(all.len(), 2);

        // "a" matches both the "admin" and "apoteker" users; rows appear once.
        let by_user = service.list(day, day, "user", "a").await.unwrap();
        assert_eq!(by_user.len(), 2);

        let by_patient = service.list(day, day, "patient", "Ali").await.unwrap();
        assert_eq!(by_patient.len(), 2);

        let by_doctor = service.list(day, day, "doctor", "nobody").await.unwrap();
        assert!(by_doctor.is_empty());

        let by_number = service.list(day, day, "number", "20").await.unwrap();
        assert_eq!(by_number.len(), 1);
        assert_eq!(by_number[0].number, 20);

        let other_day = service
            .list("2024-06-04 +0700WIB", "2024-06-05 +0700WIB", "id", "all")
            .await
            .unwrap();
        assert!(other_day.is_empty());

        assert!(matches!(
            service.list(day, day, "colour", "red").await,
            Err(ApiError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_requires_admin() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());
        service.register(&app.admin, &register_payload(30, "1")).await.unwrap();
        let id = app.prescription_id(30).await;

        let err = service.delete(&app.clerk, id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(app.stock("BX1").await, 99.0);

        let message = service.delete(&app.admin, id).await.unwrap();
        assert_eq!(message, "prescription number 30 deleted by admin");
        assert_eq!(app.stock("BX1").await, 100.0);

        // Already deleted.
        assert!(matches!(
            service.delete(&app.admin, id).await,
            Err(ApiError::ReferenceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_modify_replaces_sets_and_keeps_main_filename() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());
        let created = service.register(&app.admin, &register_payload(40, "1")).await.unwrap();
        let id = app.prescription_id(40).await;

        let mut new_data = register_payload(40, "3");
        new_data.set_items[0].print_eticket = false;
        new_data.set_items[0].eticket = None;

        let modified = service
            .modify(&app.admin, &ModifyPrescriptionPayload { id, new_data })
            .await
            .unwrap();

        assert_eq!(modified.success, "prescription modified by admin");
        assert_eq!(modified.prescription_pdf, created.prescription_pdf);
        assert!(modified.eticket_pdf.is_empty());
        assert!(app.prescription_file(&created.prescription_pdf).exists());
        assert!(!app.eticket_file(&created.eticket_pdf[0]).exists());
        assert_eq!(app.stock("BX1").await, 97.0);

        let detail = service.detail(id).await.unwrap();
        assert_eq!(detail.medicine_sets.len(), 1);
        assert_eq!(detail.medicine_sets[0].medicine_items[0].qty_float, 3.0);
        assert_eq!(detail.medicine_sets[0].eticket_id, None);
    }

    #[tokio::test]
    async fn test_modify_failure_restores_everything() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());
        let created = service.register(&app.admin, &register_payload(41, "1")).await.unwrap();
        let id = app.prescription_id(41).await;
        let files_before = app.file_count();

        let mut new_data = register_payload(41, "500");
        new_data.set_items[0].eticket = Some(EticketPayload {
            number: 2,
            medicine_qty: 500.0,
            size: "7x5".to_string(),
        });

        let err = service
            .modify(&app.admin, &ModifyPrescriptionPayload { id, new_data })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::StockInsufficient(_)));

        assert_eq!(app.stock("BX1").await, 99.0);
        assert_eq!(app.file_count(), files_before);
        assert!(app.eticket_file(&created.eticket_pdf[0]).exists());

        let detail = service.detail(id).await.unwrap();
        assert_eq!(detail.medicine_sets[0].medicine_items[0].qty_float, 1.0);
    }

    #[tokio::test]
    async fn test_modify_to_number_taken_that_day() {
        let app = TestApp::new().await;
        let service = PrescriptionService::new(app.state.clone());
        service.register(&app.admin, &register_payload(50, "1")).await.unwrap();
        service.register(&app.admin, &register_payload(51, "1")).await.unwrap();
        let id = app.prescription_id(51).await;

        let err = service
            .modify(
                &app.admin,
                &ModifyPrescriptionPayload {
                    id,
                    new_data: register_payload(50, "1"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateNumber(_)));

        // Keeping its own number is fine.
        service
            .modify(
                &app.admin,
                &ModifyPrescriptionPayload {
                    id,
                    new_data: register_payload(51, "2"),
                },
            )
            .await
            .unwrap();
        assert_eq!(app.stock("BX1").await, 97.0);
    }

    #[test]
    fn test_document_from_detail_keeps_set_order() {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let now = Utc::now();
        let detail = PrescriptionDetail {
            id: 1,
            number: 7,
            prescription_date: now.with_timezone(&offset),
            qty: 1.0,
            price: 1.0,
            total_price: 1.0,
            description: String::new(),
            created_at: now,
            last_modified: now,
            last_modified_by_user_name: "admin".to_string(),
            presc_pdf_url: String::new(),
            invoice: apotek_core::InvoiceSummary {
                number: 100,
                customer_name: "ACME".to_string(),
                total_price: 0.0,
                invoice_date: now,
            },
            patient: apotek_core::PatientSummary {
                id: 1,
                name: "Alice".to_string(),
                age: 30,
            },
            doctor: apotek_core::NamedRef {
                id: 1,
                name: "Dr. B".to_string(),
            },
            user: apotek_core::NamedRef {
                id: 1,
                name: "admin".to_string(),
            },
            medicine_sets: ["first", "second"]
                .iter()
                .enumerate()
                .map(|(i, usage)| apotek_core::SetItemDetail {
                    id: i as Id,
                    mf: "mf".to_string(),
                    dose: "3x1".to_string(),
                    set_unit: "cap".to_string(),
                    consume_time: "pc".to_string(),
                    det: "3x".to_string(),
                    usage: usage.to_string(),
                    must_finish: false,
                    print_eticket: false,
                    eticket_id: None,
                    medicine_items: vec![apotek_core::MedicineItemDetail {
                        medicine_barcode: "BX1".to_string(),
                        medicine_name: "Amox".to_string(),
                        qty_string: "1/2".to_string(),
                        qty_float: 0.5,
                        unit: "tab".to_string(),
                        price: 1.0,
                        discount_percentage: 0.0,
                        discount_amount: 0.0,
                        subtotal: 0.5,
                    }],
                })
                .collect(),
        };

        let doc = document_from_detail(detail);
        assert_eq!(doc.patient_name, "Alice");
        assert_eq!(doc.sets[0].usage, "first");
        assert_eq!(doc.sets[1].usage, "second");
        assert_eq!(doc.sets[0].items[0].qty, "1/2");
    }

    #[test]
    fn test_day_window() {
        let date = date::parse_date("2024-06-03 +0700WIB").unwrap();
        let (start, end) = day_window(date + Duration::hours(5));
        assert_eq!(start.to_rfc3339(), "2024-06-03T00:00:00+07:00");
        assert_eq!(end.to_rfc3339(), "2024-06-04T00:00:00+07:00");
    }

    #[test]
    fn test_medicine_payload_defaults_are_zero_discount() {
        let item: MedicineItemPayload = serde_json::from_str(
            r#"{"medicineBarcode":"BX1","qty":"1","unit":"tab","price":1,"subtotal":1}"#,
        )
        .unwrap();
        assert_eq!(item.discount_percentage, 0.0);
    }
}
