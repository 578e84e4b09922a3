//! # Stock Repository
//!
//! On-hand medicine quantities, always in the medicine's first unit.
//!
//! ## Guarded Subtract
//! ```text
//! UPDATE medicine SET qty = ROUND(qty - 5, 6) WHERE id = 1 AND ROUND(qty, 6) >= 5
//!      │
//!      ├── 1 row  → stock taken
//!      └── 0 rows → not enough left (or unknown medicine)
//! ```
//! The guard is what keeps two prescriptions drawing on the same medicine
//! from driving stock negative; the per-item check at insert time only sees
//! one line at a time.
//!
//! Levels are stored rounded to `STOCK_DECIMALS` places, the same precision
//! `apotek_core::stock` uses for demands, so repeated fractional takes never
//! leave a residue like `0.09999999999999998`.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use apotek_core::stock::STOCK_DECIMALS;
use apotek_core::Id;

/// Repository for medicine stock levels.
pub struct StockRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> StockRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        StockRepository { conn }
    }

    /// Current on-hand quantity, or `None` for an unknown medicine.
    pub async fn current(&mut self, medicine_id: Id) -> DbResult<Option<f64>> {
        let qty = sqlx::query_scalar::<_, f64>("SELECT qty FROM medicine WHERE id = ?1")
            .bind(medicine_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(qty)
    }

    /// Takes `amount` from stock if at least that much is on hand.
    ///
    /// ## Returns
    /// `true` when the stock was reduced, `false` when it was not sufficient.
    pub async fn subtract(&mut self, medicine_id: Id, amount: f64, user_id: Id) -> DbResult<bool> {
        debug!(medicine_id, amount, "Subtracting stock");

        let result = sqlx::query(
            r#"
            UPDATE medicine SET
                qty = ROUND(qty - ?2, ?5),
                last_modified = ?3,
                last_modified_by_user_id = ?4
            WHERE id = ?1 AND ROUND(qty, ?5) >= ROUND(?2, ?5)
            "#,
        )
        .bind(medicine_id)
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id)
        .bind(STOCK_DECIMALS)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Puts `amount` back into stock.
    pub async fn add(&mut self, medicine_id: Id, amount: f64, user_id: Id) -> DbResult<()> {
        debug!(medicine_id, amount, "Restoring stock");

        let result = sqlx::query(
            r#"
            UPDATE medicine SET
                qty = ROUND(qty + ?2, ?5),
                last_modified = ?3,
                last_modified_by_user_id = ?4
            WHERE id = ?1
            "#,
        )
        .bind(medicine_id)
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id)
        .bind(STOCK_DECIMALS)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Medicine", medicine_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog::{CatalogRepository, NewMedicine};
    use crate::{Database, DbConfig};

    async fn setup() -> (Database, Id, Id) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut catalog = CatalogRepository::new(&mut conn);

        let user = catalog.create_user("admin", "", true).await.unwrap();
        let tab = catalog.get_or_create_unit("tab").await.unwrap();
        let medicine = catalog
            .create_medicine(&NewMedicine {
                barcode: "BX1".to_string(),
                name: "Amoxicillin".to_string(),
                qty: 10.0,
                first_unit_id: tab,
                second_unit: None,
                third_unit: None,
            })
            .await
            .unwrap();

        drop(conn);
        (db, medicine.id, user.id)
    }

    #[tokio::test]
    async fn test_subtract_is_guarded() {
        let (db, medicine, user) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut stock = StockRepository::new(&mut conn);

        assert!(stock.subtract(medicine, 4.0, user).await.unwrap());
        assert_eq!(stock.current(medicine).await.unwrap(), Some(6.0));

        assert!(!stock.subtract(medicine, 7.0, user).await.unwrap());
        assert_eq!(stock.current(medicine).await.unwrap(), Some(6.0));

        assert!(stock.subtract(medicine, 6.0, user).await.unwrap());
        assert_eq!(stock.current(medicine).await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_fractional_takes_leave_no_residue() {
        let (db, medicine, user) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut stock = StockRepository::new(&mut conn);

        // 10 - 9.7 is 0.3000000000000007 in raw f64.
        assert!(stock.subtract(medicine, 9.7, user).await.unwrap());
        assert_eq!(stock.current(medicine).await.unwrap(), Some(0.3));

        for _ in 0..3 {
            assert!(stock.subtract(medicine, 0.1, user).await.unwrap());
        }
        assert_eq!(stock.current(medicine).await.unwrap(), Some(0.0));
        assert!(!stock.subtract(medicine, 0.1, user).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_restores() {
        let (db, medicine, user) = setup().await;
        let mut conn = db.acquire().await.unwrap();
        let mut stock = StockRepository::new(&mut conn);

        stock.add(medicine, 2.5, user).await.unwrap();
        assert_eq!(stock.current(medicine).await.unwrap(), Some(12.5));

        assert!(matches!(
            stock.add(9999, 1.0, user).await,
            Err(DbError::NotFound { .. })
        ));
        assert_eq!(stock.current(9999).await.unwrap(), None);
    }
}
