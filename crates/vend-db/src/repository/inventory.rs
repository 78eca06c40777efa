//! # Inventory Repository
//!
//! Stock ledger and on-hand record operations.
//!
//! ## Ledger Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Every Quantity Change Is A Ledger Append               │
//! │                                                                         │
//! │  apply_delta(product, -3, OrderHold)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE inventory SET quantity = quantity + (-3)            │   │
//! │  │     WHERE product_id = ? AND quantity + (-3) >= 0              │   │
//! │  │     (0 rows affected → NegativeStock, nothing written)         │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO stock_ledger (delta, reason, ...)              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Record and ledger move together or not at all                │
//! │                                                                         │
//! │  INVARIANT: SUM(delta) per product == inventory.quantity, always.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard lives inside the UPDATE statement itself, so the availability
//! check and the write are one atomic step even under concurrent writers.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vend_core::{CoreError, InventoryRecord, LedgerReason, StockLedgerEntry, StockStatus, ValidationError};

/// One page of ledger history, newest entries first.
#[derive(Debug, Clone)]
pub struct LedgerPage {
    pub entries: Vec<StockLedgerEntry>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Repository for inventory and stock ledger operations.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Seeds the inventory record for a product and writes the `initial`
    /// ledger entry in the same transaction.
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - record already exists for the product/sku
    pub async fn create(
        &self,
        product_id: &str,
        sku: &str,
        initial_qty: i64,
        low_stock_threshold: i64,
        created_by: Option<&str>,
    ) -> DbResult<InventoryRecord> {
        if initial_qty < 0 {
            return Err(CoreError::NegativeStock {
                product_id: product_id.to_string(),
                quantity: 0,
                delta: initial_qty,
            }
            .into());
        }

        debug!(product_id = %product_id, sku = %sku, qty = %initial_qty, "Seeding inventory");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO inventory (
                product_id, sku, quantity, low_stock_threshold, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            "#,
        )
        .bind(product_id)
        .bind(sku)
        .bind(initial_qty)
        .bind(low_stock_threshold)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_ledger_entry(
            &mut tx,
            product_id,
            initial_qty,
            LedgerReason::Initial,
            None,
            created_by,
            now,
        )
        .await?;

        let record = fetch_record(&mut tx, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryRecord", product_id))?;

        tx.commit().await?;
        Ok(record)
    }

    /// Applies a signed quantity change through the ledger.
    ///
    /// ## Atomicity
    /// The non-negative guard is part of the UPDATE statement; the ledger
    /// append rides in the same transaction. A rejected delta writes nothing.
    ///
    /// ## Errors
    /// * `CoreError::ProductNotFound` - no inventory record
    /// * `CoreError::ProductUnavailable` - record is soft-deleted
    /// * `CoreError::NegativeStock` - delta would take quantity below zero
    pub async fn apply_delta(
        &self,
        product_id: &str,
        delta: i64,
        reason: LedgerReason,
        note: Option<&str>,
        created_by: Option<&str>,
    ) -> DbResult<InventoryRecord> {
        if delta == 0 {
            return Err(CoreError::Validation(ValidationError::InvalidFormat {
                field: "delta".to_string(),
                reason: "must be non-zero".to_string(),
            })
            .into());
        }

        debug!(product_id = %product_id, delta = %delta, reason = ?reason, "Applying stock delta");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Write-first: this UPDATE takes the write lock for the whole
        // check-then-append sequence.
        let result = sqlx::query(
            r#"
            UPDATE inventory SET
                quantity = quantity + ?2,
                updated_at = ?3
            WHERE product_id = ?1
              AND is_active = 1
              AND quantity + ?2 >= 0
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish the three rejection causes; tx is rolled back on drop.
            let row: Option<(i64, bool)> =
                sqlx::query_as("SELECT quantity, is_active FROM inventory WHERE product_id = ?1")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match row {
                None => CoreError::ProductNotFound(product_id.to_string()).into(),
                Some((_, false)) => CoreError::ProductUnavailable(product_id.to_string()).into(),
                Some((quantity, true)) => CoreError::NegativeStock {
                    product_id: product_id.to_string(),
                    quantity,
                    delta,
                }
                .into(),
            });
        }

        insert_ledger_entry(&mut tx, product_id, delta, reason, note, created_by, now).await?;

        let record = fetch_record(&mut tx, product_id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryRecord", product_id))?;

        tx.commit().await?;
        Ok(record)
    }

    /// Gets the inventory record for a product.
    pub async fn get(&self, product_id: &str) -> DbResult<Option<InventoryRecord>> {
        let record = sqlx::query_as::<_, InventoryRecord>(
            "SELECT * FROM inventory WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Gets the inventory record by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<InventoryRecord>> {
        let record =
            sqlx::query_as::<_, InventoryRecord>("SELECT * FROM inventory WHERE sku = ?1")
                .bind(sku)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Stock status read model: quantity, in_stock, low_stock.
    pub async fn stock_status(&self, product_id: &str) -> DbResult<StockStatus> {
        let record = self
            .get(product_id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
            .map_err(DbError::from)?;

        Ok(record.status())
    }

    /// Available stock: on-hand quantity minus active, unexpired holds.
    ///
    /// Expired-but-unswept reservations are excluded here (`expires_at > now`)
    /// so sweep latency can never understate availability.
    pub async fn available(&self, product_id: &str, now: DateTime<Utc>) -> DbResult<i64> {
        let available: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT i.quantity - COALESCE((
                SELECT SUM(r.quantity)
                FROM inventory_reservations r
                WHERE r.product_id = i.product_id
                  AND r.status = 'active'
                  AND r.expires_at > ?2
            ), 0)
            FROM inventory i
            WHERE i.product_id = ?1
            "#,
        )
        .bind(product_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        available
            .ok_or_else(|| DbError::from(CoreError::ProductNotFound(product_id.to_string())))
    }

    /// Ledger history for a product, newest first.
    ///
    /// ## Arguments
    /// * `page` - 1-based page number
    /// * `per_page` - entries per page
    pub async fn history(&self, product_id: &str, page: u32, per_page: u32) -> DbResult<LedgerPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 200);
        let offset = (page - 1) as i64 * per_page as i64;

        let entries = sqlx::query_as::<_, StockLedgerEntry>(
            r#"
            SELECT id, product_id, delta, reason, note, created_by, created_at
            FROM stock_ledger
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(product_id)
        .bind(per_page as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stock_ledger WHERE product_id = ?1")
                .bind(product_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(LedgerPage {
            entries,
            total,
            page,
            per_page,
        })
    }

    /// Mirrors catalog soft-deletion onto the inventory record.
    pub async fn set_active(&self, product_id: &str, active: bool) -> DbResult<()> {
        let now = Utc::now();

        let result =
            sqlx::query("UPDATE inventory SET is_active = ?2, updated_at = ?3 WHERE product_id = ?1")
                .bind(product_id)
                .bind(active)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryRecord", product_id));
        }

        Ok(())
    }
}

/// Appends one immutable ledger row inside an open transaction.
///
/// Shared with the reservation repository: confirming a hold writes its
/// `order_hold` decrement through the same append path.
pub(crate) async fn insert_ledger_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: &str,
    delta: i64,
    reason: LedgerReason,
    note: Option<&str>,
    created_by: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_ledger (id, product_id, delta, reason, note, created_by, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product_id)
    .bind(delta)
    .bind(reason)
    .bind(note)
    .bind(created_by)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn fetch_record(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: &str,
) -> DbResult<Option<InventoryRecord>> {
    let record =
        sqlx::query_as::<_, InventoryRecord>("SELECT * FROM inventory WHERE product_id = ?1")
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(record)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn ledger_sum(db: &Database, product_id: &str) -> i64 {
        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT SUM(delta) FROM stock_ledger WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(db.pool())
        .await
        .unwrap()
        .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_create_seeds_record_and_initial_entry() {
        let db = test_db().await;
        let record = db
            .inventory()
            .create("p1", "TOWEL-001", 10, 3, Some("seed"))
            .await
            .unwrap();

        assert_eq!(record.quantity, 10);
        assert!(record.in_stock());
        assert_eq!(ledger_sum(&db, "p1").await, 10);
    }

    #[tokio::test]
    async fn test_apply_delta_keeps_ledger_invariant() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 10, 3, None).await.unwrap();

        repo.apply_delta("p1", -4, LedgerReason::ManualAdjust, None, Some("ops"))
            .await
            .unwrap();
        repo.apply_delta("p1", 2, LedgerReason::Return, Some("RMA-17"), None)
            .await
            .unwrap();
        let record = repo
            .apply_delta("p1", -3, LedgerReason::Recount, None, None)
            .await
            .unwrap();

        assert_eq!(record.quantity, 5);
        assert_eq!(ledger_sum(&db, "p1").await, record.quantity);
    }

    #[tokio::test]
    async fn test_negative_stock_rejected_and_nothing_written() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 3, 0, None).await.unwrap();

        let err = repo
            .apply_delta("p1", -5, LedgerReason::ManualAdjust, None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::NegativeStock { quantity: 3, delta: -5, .. })
        ));

        // Rejected delta leaves both the record and the ledger untouched.
        let record = repo.get("p1").await.unwrap().unwrap();
        assert_eq!(record.quantity, 3);
        assert_eq!(ledger_sum(&db, "p1").await, 3);
    }

    #[tokio::test]
    async fn test_apply_delta_unknown_product() {
        let db = test_db().await;
        let err = db
            .inventory()
            .apply_delta("ghost", 1, LedgerReason::ManualAdjust, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::ProductNotFound(_))));
    }

    #[tokio::test]
    async fn test_apply_delta_inactive_product() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 3, 0, None).await.unwrap();
        repo.set_active("p1", false).await.unwrap();

        let err = repo
            .apply_delta("p1", 1, LedgerReason::ManualAdjust, None, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::ProductUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_delta_rejected() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 3, 0, None).await.unwrap();

        let err = repo
            .apply_delta("p1", 0, LedgerReason::ManualAdjust, None, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_stock_status_low_stock_band() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 2, 5, None).await.unwrap();

        let status = repo.stock_status("p1").await.unwrap();
        assert!(status.in_stock);
        assert!(status.low_stock);

        repo.apply_delta("p1", -2, LedgerReason::ManualAdjust, None, None)
            .await
            .unwrap();
        let status = repo.stock_status("p1").await.unwrap();
        assert!(!status.in_stock);
        assert!(!status.low_stock);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_paginated() {
        let db = test_db().await;
        let repo = db.inventory();
        repo.create("p1", "TOWEL-001", 100, 0, None).await.unwrap();

        for i in 1..=5 {
            repo.apply_delta("p1", -i, LedgerReason::ManualAdjust, None, None)
                .await
                .unwrap();
        }

        let page = repo.history("p1", 1, 3).await.unwrap();
        assert_eq!(page.total, 6); // initial + 5 adjustments
        assert_eq!(page.entries.len(), 3);
        assert_eq!(page.entries[0].delta, -5); // newest first

        let page2 = repo.history("p1", 2, 3).await.unwrap();
        assert_eq!(page2.entries.len(), 3);
        assert_eq!(page2.entries[2].reason, LedgerReason::Initial);
    }

    /// N tasks race to decrement the same product; quantity never goes
    /// negative and the ledger stays consistent with the record.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_deltas_never_go_negative() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let db = Database::new(DbConfig::new(&path).max_connections(8))
            .await
            .unwrap();

        db.inventory()
            .create("p1", "TOWEL-001", 5, 0, None)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let repo = db.inventory();
            handles.push(tokio::spawn(async move {
                repo.apply_delta("p1", -1, LedgerReason::ManualAdjust, None, None)
                    .await
            }));
        }

        let mut ok = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(DbError::Domain(CoreError::NegativeStock { .. })) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(ok, 5);
        assert_eq!(rejected, 5);

        let record = db.inventory().get("p1").await.unwrap().unwrap();
        assert_eq!(record.quantity, 0);
        assert_eq!(ledger_sum(&db, "p1").await, 0);
    }
}
