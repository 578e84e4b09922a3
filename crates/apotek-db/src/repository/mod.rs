//! # Repository Module
//!
//! Database repository implementations for Apotek.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories on a Borrowed Connection                │
//! │                                                                         │
//! │  PrescriptionService::register                                         │
//! │       │                                                                 │
//! │       │  let mut tx = db.begin().await?;                               │
//! │       ▼                                                                 │
//! │  CatalogRepository::new(&mut tx)      ── get-or-create doctor ...      │
//! │  PrescriptionRepository::new(&mut tx) ── create, create_set_item ...   │
//! │  StockRepository::new(&mut tx)        ── guarded subtract              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit()  (or drop → rollback)                                     │
//! │                                                                         │
//! │  Each repository is a thin wrapper around `&mut SqliteConnection`,     │
//! │  created per call site. Reads use `db.acquire()` the same way.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`PrescriptionRepository`](prescription::PrescriptionRepository) - Prescriptions, set items, medicine items, e-tickets
//! - [`CatalogRepository`](catalog::CatalogRepository) - Users, customers, invoices, medicines, vocabulary
//! - [`StockRepository`](stock::StockRepository) - Medicine stock levels
//! - [`AuditRepository`](audit::AuditRepository) - Append-only audit log

pub mod audit;
pub mod catalog;
pub mod prescription;
pub mod stock;

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{TimeZone, Utc};

    use super::catalog::{CatalogRepository, NewMedicine, Vocabulary};
    use crate::{Database, DbConfig};
    use apotek_core::{Id, Medicine, User};

    /// Catalog rows every prescription test needs.
    pub struct Fixture {
        pub user: User,
        pub invoice_id: Id,
        pub patient_id: Id,
        pub doctor_id: Id,
        pub unit_id: Id,
        pub mf_id: Id,
        pub dose_id: Id,
        pub consume_time_id: Id,
        pub det_id: Id,
        pub usage_id: Id,
        pub medicine: Medicine,
    }

    impl Fixture {
        pub async fn new() -> (Database, Fixture) {
            let db = Database::new(DbConfig::in_memory()).await.unwrap();
            let mut conn = db.acquire().await.unwrap();
            let mut catalog = CatalogRepository::new(&mut conn);

            let user = catalog.create_user("admin", "", true).await.unwrap();
            let customer = catalog.create_customer("ACME").await.unwrap();
            let invoice_id = catalog
                .create_invoice(
                    100,
                    customer,
                    Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap(),
                    10_000.0,
                    Some(user.id),
                )
                .await
                .unwrap();
            let patient_id = catalog.get_or_create_patient("Alice", 30).await.unwrap();
            let doctor_id = catalog.get_or_create_doctor("Dr. B").await.unwrap();
            let unit_id = catalog.get_or_create_unit("tab").await.unwrap();
            let mf_id = catalog.get_or_create_term(Vocabulary::Mf, "mf da").await.unwrap();
            let dose_id = catalog.get_or_create_term(Vocabulary::Dose, "3x1").await.unwrap();
            let consume_time_id = catalog
                .get_or_create_term(Vocabulary::ConsumeTime, "pc")
                .await
                .unwrap();
            let det_id = catalog.get_or_create_term(Vocabulary::Det, "3x").await.unwrap();
            let usage_id = catalog.get_or_create_term(Vocabulary::Usage, "sakit").await.unwrap();
            let medicine = catalog
                .create_medicine(&NewMedicine {
                    barcode: "BX1".to_string(),
                    name: "Amox".to_string(),
                    qty: 100.0,
                    first_unit_id: unit_id,
                    second_unit: None,
                    third_unit: None,
                })
                .await
                .unwrap();

            drop(conn);

            (
                db,
                Fixture {
                    user,
                    invoice_id,
                    patient_id,
                    doctor_id,
                    unit_id,
                    mf_id,
                    dose_id,
                    consume_time_id,
                    det_id,
                    usage_id,
                    medicine,
                },
            )
        }
    }
}
