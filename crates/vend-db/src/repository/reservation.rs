//! # Reservation Repository
//!
//! The core state machine: time-bound stock holds for checkout sessions.
//!
//! ## Reservation Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Reservation Lifecycle                                │
//! │                                                                         │
//! │  reserve_all(checkout, lines)          ── all-or-nothing ──┐           │
//! │       │                                                     │           │
//! │       ▼                                                     ▼           │
//! │  ┌──────────┐   confirm_all()   ┌───────────┐      InsufficientStock   │
//! │  │  active  │ ────────────────► │ confirmed │      (zero rows leak)    │
//! │  └────┬─────┘  + ledger −qty    └───────────┘                          │
//! │       │                                                                 │
//! │       │  release_all(reason) / expiry sweep                            │
//! │       ▼                                                                 │
//! │  ┌──────────┐                                                          │
//! │  │ released │   (no ledger write - the quantity never moved)           │
//! │  └──────────┘                                                          │
//! │                                                                         │
//! │  AVAILABILITY = inventory.quantity − Σ active, unexpired holds         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## The Availability Guard
//! The check and the write are ONE statement:
//! ```sql
//! INSERT INTO inventory_reservations (...)
//! SELECT ... WHERE on_hand - active_holds >= requested
//! ```
//! Each reservation transaction opens with a write on the session row, so the
//! whole multi-line sequence runs under the database write lock. Two racing
//! checkouts serialize: the first wins, the loser re-evaluates the guard
//! against the winner's committed holds and fails cleanly. Lines are placed
//! in ascending product_id order, matching every other multi-product writer.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::inventory::insert_ledger_entry;
use vend_core::{CartItem, CheckoutStatus, CoreError, InventoryReservation, LedgerReason};

/// Outcome of one expiry sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpirySweep {
    /// Active holds past their expiry that were released.
    pub holds_released: u64,
    /// Active sessions past their expiry that were expired.
    pub sessions_expired: u64,
}

/// Repository for inventory reservation operations.
#[derive(Debug, Clone)]
pub struct ReservationRepository {
    pool: SqlitePool,
}

impl ReservationRepository {
    /// Creates a new ReservationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReservationRepository { pool }
    }

    /// Places one hold per cart line, all-or-nothing.
    ///
    /// ## Guarantees
    /// - Either every line holds and `stock_reserved` is set, or the
    ///   transaction rolls back and ZERO reservations exist for the call.
    /// - The failure identifies the offending sku with available/requested
    ///   quantities so the caller can prompt an adjustment.
    ///
    /// ## Errors
    /// * `CoreError::CheckoutNotFound` / `CheckoutExpired` / `CheckoutNotActive`
    /// * `CoreError::AlreadyReserved` - a live hold set exists for the session
    /// * `CoreError::InsufficientStock` / `ProductNotFound` / `ProductUnavailable`
    pub async fn reserve_all(
        &self,
        checkout_id: &str,
        lines: &[CartItem],
        expires_at: DateTime<Utc>,
    ) -> DbResult<Vec<InventoryReservation>> {
        debug!(checkout_id = %checkout_id, lines = lines.len(), "Reserving stock");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_open_session(&mut tx, checkout_id, now).await?;

        let live: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM inventory_reservations
            WHERE checkout_id = ?1 AND status IN ('active', 'confirmed')
            "#,
        )
        .bind(checkout_id)
        .fetch_one(&mut *tx)
        .await?;

        if live > 0 {
            return Err(CoreError::AlreadyReserved {
                checkout_id: checkout_id.to_string(),
            }
            .into());
        }

        // A fresh attempt on this session supersedes released holds from a
        // prior attempt; (checkout_id, cart_item_id) stays unique.
        sqlx::query(
            "DELETE FROM inventory_reservations WHERE checkout_id = ?1 AND status = 'released'",
        )
        .bind(checkout_id)
        .execute(&mut *tx)
        .await?;

        place_holds_in(&mut tx, checkout_id, lines, expires_at, now).await?;

        let reservations = fetch_for_checkout(&mut tx, checkout_id).await?;
        tx.commit().await?;

        info!(
            checkout_id = %checkout_id,
            count = reservations.len(),
            "Stock reserved"
        );
        Ok(reservations)
    }

    /// Confirms every active hold: the soft hold becomes a permanent ledger
    /// decrement (`order_hold`, −qty) in the same transaction.
    ///
    /// Already-confirmed rows are untouched, so a re-run is a no-op.
    ///
    /// ## Errors
    /// * `CoreError::CheckoutNotFound`
    /// * `CoreError::CheckoutExpired` - the session (and its holds) lapsed
    /// * `CoreError::CheckoutNotActive` - completed or failed session
    pub async fn confirm_all(&self, checkout_id: &str) -> DbResult<Vec<InventoryReservation>> {
        debug!(checkout_id = %checkout_id, "Confirming reservations");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_open_session(&mut tx, checkout_id, now).await?;

        let active = sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE checkout_id = ?1 AND status = 'active'
            ORDER BY product_id
            "#,
        )
        .bind(checkout_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut confirmed = 0u64;
        for reservation in &active {
            // An active hold is counted inside quantity, so this can only
            // fail if the ledger invariant was already broken.
            let result = sqlx::query(
                r#"
                UPDATE inventory SET
                    quantity = quantity - ?2,
                    updated_at = ?3
                WHERE product_id = ?1 AND quantity - ?2 >= 0
                "#,
            )
            .bind(&reservation.product_id)
            .bind(reservation.quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DbError::Internal(format!(
                    "confirmed hold exceeds on-hand stock for product {}",
                    reservation.product_id
                )));
            }

            insert_ledger_entry(
                &mut tx,
                &reservation.product_id,
                -reservation.quantity,
                LedgerReason::OrderHold,
                Some(&format!("checkout {checkout_id}")),
                Some("reservation-manager"),
                now,
            )
            .await?;

            sqlx::query(
                r#"
                UPDATE inventory_reservations SET
                    status = 'confirmed',
                    confirmed_at = ?2
                WHERE id = ?1 AND status = 'active'
                "#,
            )
            .bind(&reservation.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            confirmed += 1;
        }

        let reservations = fetch_for_checkout(&mut tx, checkout_id).await?;
        tx.commit().await?;

        info!(checkout_id = %checkout_id, confirmed, "Reservations confirmed");
        Ok(reservations)
    }

    /// Releases every active hold for the checkout.
    ///
    /// Idempotent: released and confirmed rows are untouched; a second call
    /// affects zero rows. No ledger entry is written - an active hold never
    /// moved the on-hand quantity.
    ///
    /// ## Returns
    /// The number of holds released by this call.
    pub async fn release_all(&self, checkout_id: &str, reason: &str) -> DbResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE inventory_reservations SET
                status = 'released',
                released_at = ?2,
                release_reason = ?3
            WHERE checkout_id = ?1 AND status = 'active'
            "#,
        )
        .bind(checkout_id)
        .bind(now)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        let released = result.rows_affected();
        if released > 0 {
            // stock_reserved means "every hold is active or confirmed";
            // releasing any hold voids it.
            sqlx::query("UPDATE checkouts SET stock_reserved = 0, updated_at = ?2 WHERE id = ?1")
                .bind(checkout_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if released > 0 {
            info!(checkout_id = %checkout_id, released, reason = %reason, "Reservations released");
        }
        Ok(released)
    }

    /// The expiry sweep: releases every active hold past its expiry and
    /// expires the sessions that carried them.
    ///
    /// Sessions with confirmed holds are left alone - their stock is already
    /// committed and the pending order completion must not be swept away.
    pub async fn release_expired(&self, now: DateTime<Utc>) -> DbResult<ExpirySweep> {
        let mut tx = self.pool.begin().await?;

        let holds = sqlx::query(
            r#"
            UPDATE inventory_reservations SET
                status = 'released',
                released_at = ?1,
                release_reason = 'expired'
            WHERE status = 'active' AND expires_at <= ?1
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let sessions = sqlx::query(
            r#"
            UPDATE checkouts SET
                status = 'expired',
                stock_reserved = 0,
                updated_at = ?1
            WHERE status = 'active'
              AND expires_at <= ?1
              AND NOT EXISTS (
                  SELECT 1 FROM inventory_reservations r
                  WHERE r.checkout_id = checkouts.id AND r.status = 'confirmed'
              )
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let sweep = ExpirySweep {
            holds_released: holds.rows_affected(),
            sessions_expired: sessions.rows_affected(),
        };

        if sweep.holds_released > 0 || sweep.sessions_expired > 0 {
            info!(
                holds_released = sweep.holds_released,
                sessions_expired = sweep.sessions_expired,
                "Expiry sweep released stale holds"
            );
        }
        Ok(sweep)
    }

    /// All reservations for a checkout, in product order.
    pub async fn for_checkout(&self, checkout_id: &str) -> DbResult<Vec<InventoryReservation>> {
        let reservations = sqlx::query_as::<_, InventoryReservation>(
            r#"
            SELECT * FROM inventory_reservations
            WHERE checkout_id = ?1
            ORDER BY product_id
            "#,
        )
        .bind(checkout_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }
}

/// Places one guarded hold per line inside an open transaction.
///
/// Exposed so session creation can share one atomic transaction with its
/// reservations: an insufficient-stock rollback then erases the session too.
/// Lines are processed in ascending product_id order.
pub async fn place_holds_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    checkout_id: &str,
    lines: &[CartItem],
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let mut sorted: Vec<&CartItem> = lines.iter().collect();
    sorted.sort_by(|a, b| a.product_id.cmp(&b.product_id));

    for line in sorted {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_reservations (
                id, checkout_id, cart_item_id, product_id, sku,
                quantity, status, expires_at, created_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8
            WHERE (
                SELECT i.quantity FROM inventory i
                WHERE i.product_id = ?4 AND i.is_active = 1
            ) - COALESCE((
                SELECT SUM(r.quantity) FROM inventory_reservations r
                WHERE r.product_id = ?4
                  AND r.status = 'active'
                  AND r.expires_at > ?8
            ), 0) >= ?6
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(checkout_id)
        .bind(&line.id)
        .bind(&line.product_id)
        .bind(&line.sku)
        .bind(line.qty)
        .bind(expires_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(diagnose_hold_failure(tx, line, now).await?);
        }
    }

    sqlx::query("UPDATE checkouts SET stock_reserved = 1, updated_at = ?2 WHERE id = ?1")
        .bind(checkout_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Explains why a guarded hold insert matched zero rows.
async fn diagnose_hold_failure(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    line: &CartItem,
    now: DateTime<Utc>,
) -> DbResult<DbError> {
    let record: Option<(i64, bool)> =
        sqlx::query_as("SELECT quantity, is_active FROM inventory WHERE product_id = ?1")
            .bind(&line.product_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(match record {
        None => CoreError::ProductNotFound(line.product_id.clone()).into(),
        Some((_, false)) => CoreError::ProductUnavailable(line.sku.clone()).into(),
        Some((on_hand, true)) => {
            let held: i64 = sqlx::query_scalar(
                r#"
                SELECT COALESCE(SUM(quantity), 0) FROM inventory_reservations
                WHERE product_id = ?1 AND status = 'active' AND expires_at > ?2
                "#,
            )
            .bind(&line.product_id)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;

            CoreError::InsufficientStock {
                sku: line.sku.clone(),
                available: on_hand - held,
                requested: line.qty,
            }
            .into()
        }
    })
}

/// Write-first guard: the session must be active and unexpired.
///
/// The UPDATE takes the write lock before any availability read in the
/// transaction, serializing concurrent reservation attempts.
async fn lock_open_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    checkout_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE checkouts SET updated_at = ?3
        WHERE id = ?1 AND status = 'active' AND expires_at > ?2
        "#,
    )
    .bind(checkout_id)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        let session: Option<(CheckoutStatus, DateTime<Utc>)> =
            sqlx::query_as("SELECT status, expires_at FROM checkouts WHERE id = ?1")
                .bind(checkout_id)
                .fetch_optional(&mut **tx)
                .await?;

        return Err(match session {
            None => CoreError::CheckoutNotFound(checkout_id.to_string()).into(),
            Some((CheckoutStatus::Expired, _)) => {
                CoreError::CheckoutExpired(checkout_id.to_string()).into()
            }
            Some((CheckoutStatus::Active, expires_at)) if expires_at <= now => {
                CoreError::CheckoutExpired(checkout_id.to_string()).into()
            }
            Some((status, _)) => CoreError::CheckoutNotActive {
                checkout_id: checkout_id.to_string(),
                status: format!("{status:?}").to_lowercase(),
            }
            .into(),
        });
    }

    Ok(())
}

async fn fetch_for_checkout(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    checkout_id: &str,
) -> DbResult<Vec<InventoryReservation>> {
    let reservations = sqlx::query_as::<_, InventoryReservation>(
        r#"
        SELECT * FROM inventory_reservations
        WHERE checkout_id = ?1
        ORDER BY product_id
        "#,
    )
    .bind(checkout_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(reservations)
}

// =============================================================================
// Unit Tests
// =============================================================================
