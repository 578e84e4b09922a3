//! # Catalog Repository
//!
//! Lookups and get-or-create operations for the rows a prescription refers
//! to: users, customers, invoices, doctors, patients, units, medicines and
//! the set vocabulary.
//!
//! ## Get-or-Create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT INTO doctor (name) VALUES ('Dr. B')                            │
//! │  ON CONFLICT (name) DO UPDATE SET name = excluded.name                 │
//! │  RETURNING id                                                          │
//! │                                                                         │
//! │  • new name      → row inserted, new id returned                       │
//! │  • existing name → no-op update, existing id returned                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! One statement, so two registrations naming the same new doctor never
//! create two rows.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use apotek_core::{Id, Medicine, User};

// =============================================================================
// Vocabulary
// =============================================================================

/// Free-text vocabulary tables of a set item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    Mf,
    Dose,
    ConsumeTime,
    Det,
    Usage,
}

impl Vocabulary {
    pub fn table(&self) -> &'static str {
        match self {
            Vocabulary::Mf => "mf",
            Vocabulary::Dose => "dose",
            Vocabulary::ConsumeTime => "consume_time",
            Vocabulary::Det => "det",
            Vocabulary::Usage => "prescription_set_usage",
        }
    }
}

/// Tables searchable by name for listing selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedSubject {
    User,
    Patient,
    Doctor,
}

impl NamedSubject {
    fn table(&self) -> &'static str {
        match self {
            NamedSubject::User => "user",
            NamedSubject::Patient => "patient",
            NamedSubject::Doctor => "doctor",
        }
    }
}

// =============================================================================
// Row Types
// =============================================================================

/// Columns of a medicine before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMedicine {
    pub barcode: String,
    pub name: String,
    pub qty: f64,
    pub first_unit_id: Id,
    /// Second unit and its ratio to the first one.
    pub second_unit: Option<(Id, f64)>,
    /// Third unit and its ratio to the first one.
    pub third_unit: Option<(Id, f64)>,
}

/// A user together with its stored password hash.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Id,
    name: String,
    admin: bool,
    password: String,
}

#[derive(sqlx::FromRow)]
struct MedicineRow {
    id: Id,
    barcode: String,
    name: String,
    qty: f64,
    first_unit_id: Id,
    second_unit_id: Option<Id>,
    second_unit_to_first_unit_ratio: f64,
    third_unit_id: Option<Id>,
    third_unit_to_first_unit_ratio: f64,
}

impl From<MedicineRow> for Medicine {
    fn from(row: MedicineRow) -> Self {
        Medicine {
            id: row.id,
            barcode: row.barcode,
            name: row.name,
            qty: row.qty,
            first_unit_id: row.first_unit_id,
            second_unit_id: row.second_unit_id,
            second_unit_to_first_unit_ratio: row.second_unit_to_first_unit_ratio,
            third_unit_id: row.third_unit_id,
            third_unit_to_first_unit_ratio: row.third_unit_to_first_unit_ratio,
        }
    }
}

const MEDICINE_COLUMNS: &str = r#"
    id, barcode, name, qty,
    first_unit_id,
    second_unit_id, second_unit_to_first_unit_ratio,
    third_unit_id, third_unit_to_first_unit_ratio
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog rows.
pub struct CatalogRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> CatalogRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        CatalogRepository { conn }
    }

    // -------------------------------------------------------------------------
    // Users
    // -------------------------------------------------------------------------

    /// Gets a user by id.
    pub async fn get_user(&mut self, id: Id) -> DbResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, admin, password FROM user WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(|r| User {
            id: r.id,
            name: r.name,
            admin: r.admin,
        }))
    }

    /// Gets a user and its password hash by login name.
    pub async fn get_credentials(&mut self, name: &str) -> DbResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, admin, password FROM user WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(row.map(|r| UserCredentials {
            user: User {
                id: r.id,
                name: r.name,
                admin: r.admin,
            },
            password_hash: r.password,
        }))
    }

    /// Creates a user.
    ///
    /// ## Arguments
    /// * `password_hash` - PHC string (argon2), never the plain password
    pub async fn create_user(&mut self, name: &str, password_hash: &str, admin: bool) -> DbResult<User> {
        debug!(name = %name, admin, "Creating user");

        let id: Id = sqlx::query_scalar(
            "INSERT INTO user (name, password, admin) VALUES (?1, ?2, ?3) RETURNING id",
        )
        .bind(name)
        .bind(password_hash)
        .bind(admin)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(User {
            id,
            name: name.to_string(),
            admin,
        })
    }

    // -------------------------------------------------------------------------
    // Customers and invoices
    // -------------------------------------------------------------------------

    /// Finds a customer id by exact name.
    pub async fn get_customer_id(&mut self, name: &str) -> DbResult<Option<Id>> {
        let id = sqlx::query_scalar::<_, Id>("SELECT id FROM customer WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(id)
    }

    /// Creates a customer.
    pub async fn create_customer(&mut self, name: &str) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>("INSERT INTO customer (name) VALUES (?1) RETURNING id")
            .bind(name)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(id)
    }

    /// Finds a live invoice by number and customer, dated inside `[from, until)`.
    ///
    /// The client only knows the invoice's calendar day, so the caller passes
    /// that day's window.
    pub async fn find_invoice_id(
        &mut self,
        number: i64,
        customer_id: Id,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> DbResult<Option<Id>> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            SELECT id FROM invoice
            WHERE number = ?1
              AND customer_id = ?2
              AND invoice_date >= ?3
              AND invoice_date < ?4
              AND deleted_at IS NULL
            ORDER BY invoice_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(number)
        .bind(customer_id)
        .bind(from)
        .bind(until)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(id)
    }

    /// Creates an invoice.
    pub async fn create_invoice(
        &mut self,
        number: i64,
        customer_id: Id,
        invoice_date: DateTime<Utc>,
        total_price: f64,
        user_id: Option<Id>,
    ) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO invoice (number, customer_id, invoice_date, total_price, user_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id
            "#,
        )
        .bind(number)
        .bind(customer_id)
        .bind(invoice_date)
        .bind(total_price)
        .bind(user_id)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    // -------------------------------------------------------------------------
    // Get-or-create by name
    // -------------------------------------------------------------------------

    /// Returns the doctor's id, creating the row when the name is new.
    pub async fn get_or_create_doctor(&mut self, name: &str) -> DbResult<Id> {
        self.upsert_name("doctor", name).await
    }

    /// Returns the unit's id, creating the row when the name is new.
    pub async fn get_or_create_unit(&mut self, name: &str) -> DbResult<Id> {
        self.upsert_name("unit", name).await
    }

    /// Returns a vocabulary term's id, creating the row when the name is new.
    pub async fn get_or_create_term(&mut self, vocabulary: Vocabulary, name: &str) -> DbResult<Id> {
        self.upsert_name(vocabulary.table(), name).await
    }

    /// Patients are identified by (name, age).
    pub async fn get_or_create_patient(&mut self, name: &str, age: i64) -> DbResult<Id> {
        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO patient (name, age) VALUES (?1, ?2)
            ON CONFLICT (name, age) DO UPDATE SET name = excluded.name
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(age)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(id)
    }

    async fn upsert_name(&mut self, table: &'static str, name: &str) -> DbResult<Id> {
        let sql = format!(
            "INSERT INTO {table} (name) VALUES (?1) \
             ON CONFLICT (name) DO UPDATE SET name = excluded.name \
             RETURNING id"
        );

        let id = sqlx::query_scalar::<_, Id>(&sql)
            .bind(name)
            .fetch_one(&mut *self.conn)
            .await?;

        Ok(id)
    }

    /// Resolves a unit id to its name.
    pub async fn get_unit_name(&mut self, id: Id) -> DbResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>("SELECT name FROM unit WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(name)
    }

    /// Ids of users, patients or doctors whose name contains `fragment`.
    ///
    /// `%` and `_` in the fragment match themselves.
    pub async fn search_ids(&mut self, subject: NamedSubject, fragment: &str) -> DbResult<Vec<Id>> {
        let sql = format!(
            "SELECT id FROM {} WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id",
            subject.table()
        );

        let ids = sqlx::query_scalar::<_, Id>(&sql)
            .bind(contains_pattern(fragment))
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(ids)
    }

    // -------------------------------------------------------------------------
    // Medicines
    // -------------------------------------------------------------------------

    /// Gets a medicine by barcode.
    pub async fn get_medicine_by_barcode(&mut self, barcode: &str) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicine WHERE barcode = ?1");

        let row = sqlx::query_as::<_, MedicineRow>(&sql)
            .bind(barcode)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(row.map(Medicine::from))
    }

    /// Gets a medicine by id.
    pub async fn get_medicine(&mut self, id: Id) -> DbResult<Option<Medicine>> {
        let sql = format!("SELECT {MEDICINE_COLUMNS} FROM medicine WHERE id = ?1");

        let row = sqlx::query_as::<_, MedicineRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        Ok(row.map(Medicine::from))
    }

    /// Creates a medicine.
    pub async fn create_medicine(&mut self, medicine: &NewMedicine) -> DbResult<Medicine> {
        debug!(barcode = %medicine.barcode, "Creating medicine");

        let (second_unit_id, second_ratio) = split_unit(medicine.second_unit);
        let (third_unit_id, third_ratio) = split_unit(medicine.third_unit);

        let id = sqlx::query_scalar::<_, Id>(
            r#"
            INSERT INTO medicine (
                barcode, name, qty, first_unit_id,
                second_unit_id, second_unit_to_first_unit_ratio,
                third_unit_id, third_unit_to_first_unit_ratio,
                last_modified
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING id
            "#,
        )
        .bind(&medicine.barcode)
        .bind(&medicine.name)
        .bind(medicine.qty)
        .bind(medicine.first_unit_id)
        .bind(second_unit_id)
        .bind(second_ratio)
        .bind(third_unit_id)
        .bind(third_ratio)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(Medicine {
            id,
            barcode: medicine.barcode.clone(),
            name: medicine.name.clone(),
            qty: medicine.qty,
            first_unit_id: medicine.first_unit_id,
            second_unit_id,
            second_unit_to_first_unit_ratio: second_ratio,
            third_unit_id,
            third_unit_to_first_unit_ratio: third_ratio,
        })
    }
}

fn split_unit(unit: Option<(Id, f64)>) -> (Option<Id>, f64) {
    match unit {
        Some((id, ratio)) => (Some(id), ratio),
        None => (None, 0.0),
    }
}

/// `%fragment%` with LIKE metacharacters escaped by `\`.
fn contains_pattern(fragment: &str) -> String {
    let mut pattern = String::with_capacity(fragment.len() + 2);
    pattern.push('%');
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let a = catalog.get_or_create_doctor("Dr. B").await.unwrap();
        let b = catalog.get_or_create_doctor("Dr. B").await.unwrap();
        let c = catalog.get_or_create_doctor("Dr. C").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mf1 = catalog.get_or_create_term(Vocabulary::Mf, "mf da").await.unwrap();
        let mf2 = catalog.get_or_create_term(Vocabulary::Mf, "mf da").await.unwrap();
        assert_eq!(mf1, mf2);
    }

    #[tokio::test]
    async fn test_patient_identity_is_name_and_age() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let a = catalog.get_or_create_patient("Alice", 30).await.unwrap();
        let b = catalog.get_or_create_patient("Alice", 30).await.unwrap();
        let c = catalog.get_or_create_patient("Alice", 31).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_invoice_lookup_uses_day_window() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let customer = catalog.create_customer("ACME").await.unwrap();
        assert_eq!(catalog.get_customer_id("ACME").await.unwrap(), Some(customer));
        assert_eq!(catalog.get_customer_id("Nobody").await.unwrap(), None);

        let invoice_date = Utc.with_ymd_and_hms(2024, 6, 3, 4, 0, 0).unwrap();
        let invoice = catalog
            .create_invoice(100, customer, invoice_date, 50_000.0, None)
            .await
            .unwrap();

        let from = Utc.with_ymd_and_hms(2024, 6, 2, 17, 0, 0).unwrap();
        let until = Utc.with_ymd_and_hms(2024, 6, 3, 17, 0, 0).unwrap();
        assert_eq!(
            catalog.find_invoice_id(100, customer, from, until).await.unwrap(),
            Some(invoice)
        );

        let next_from = until;
        let next_until = Utc.with_ymd_and_hms(2024, 6, 4, 17, 0, 0).unwrap();
        assert_eq!(
            catalog.find_invoice_id(100, customer, next_from, next_until).await.unwrap(),
            None
        );
        assert_eq!(catalog.find_invoice_id(101, customer, from, until).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_medicine_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let tab = catalog.get_or_create_unit("tab").await.unwrap();
        let strip = catalog.get_or_create_unit("strip").await.unwrap();

        let created = catalog
            .create_medicine(&NewMedicine {
                barcode: "BX1".to_string(),
                name: "Amoxicillin".to_string(),
                qty: 100.0,
                first_unit_id: tab,
                second_unit: Some((strip, 10.0)),
                third_unit: None,
            })
            .await
            .unwrap();

        let loaded = catalog.get_medicine_by_barcode("BX1").await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.second_unit_id, Some(strip));
        assert_eq!(loaded.third_unit_id, None);
        assert_eq!(catalog.get_unit_name(strip).await.unwrap().as_deref(), Some("strip"));
        assert!(catalog.get_medicine_by_barcode("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_users_and_search() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let admin = catalog.create_user("admin", "$argon2id$hash", true).await.unwrap();
        let clerk = catalog.create_user("clerk", "$argon2id$hash", false).await.unwrap();

        let loaded = catalog.get_user(admin.id).await.unwrap().unwrap();
        assert!(loaded.admin);

        let credentials = catalog.get_credentials("clerk").await.unwrap().unwrap();
        assert_eq!(credentials.user, clerk);
        assert_eq!(credentials.password_hash, "$argon2id$hash");

        let ids = catalog.search_ids(NamedSubject::User, "er").await.unwrap();
        assert_eq!(ids, vec![clerk.id]);
        let ids = catalog.search_ids(NamedSubject::User, "").await.unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let underscore = catalog.get_or_create_doctor("dr_a").await.unwrap();
        catalog.get_or_create_doctor("drxa").await.unwrap();
        let percent = catalog.get_or_create_doctor("50% off").await.unwrap();
        catalog.get_or_create_doctor("500 off").await.unwrap();
        let backslash = catalog.get_or_create_doctor("a\\b").await.unwrap();

        let ids = catalog.search_ids(NamedSubject::Doctor, "r_a").await.unwrap();
        assert_eq!(ids, vec![underscore]);
        let ids = catalog.search_ids(NamedSubject::Doctor, "0%").await.unwrap();
        assert_eq!(ids, vec![percent]);
        let ids = catalog.search_ids(NamedSubject::Doctor, "\\").await.unwrap();
        assert_eq!(ids, vec![backslash]);
    }

    #[test]
    fn test_contains_pattern_escapes_metacharacters() {
        assert_eq!(contains_pattern("ab"), "%ab%");
        assert_eq!(contains_pattern("a_b%"), "%a\\_b\\%%");
        assert_eq!(contains_pattern(""), "%%");
    }
}
