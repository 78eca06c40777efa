//! # Checkout Session Repository
//!
//! Database operations for checkout sessions and their addresses.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkout Session Lifecycle                           │
//! │                                                                         │
//! │  1. CREATE                                                             │
//! │     └── create() → addresses + session row, expires_at = now + TTL     │
//! │                                                                         │
//! │  2. RESERVE (ReservationRepository)                                    │
//! │     └── stock_reserved = 1 once every line holds                       │
//! │                                                                         │
//! │  3. TERMINAL (guarded UPDATEs, WHERE status = 'active')                │
//! │     └── complete() → order placed                                      │
//! │     └── fail()     → stock/payment/validation failure                  │
//! │     └── expire()   → TTL elapsed (lazy read check or sweep)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Addresses are immutable once referenced: every session inserts fresh
//! address rows, so completed checkouts keep the address they shipped to.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vend_core::{Address, AddressKind, CheckoutSession, CoreError, NewAddress};

/// Everything needed to persist a new checkout session.
#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub cart_id: String,
    pub user_id: Option<String>,
    pub shipping_address: NewAddress,
    pub billing_address: NewAddress,
    pub shipping_method: String,
    pub currency: String,
    pub tax_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub expires_at: DateTime<Utc>,
}

/// Repository for checkout session operations.
#[derive(Debug, Clone)]
pub struct CheckoutRepository {
    pool: SqlitePool,
}

impl CheckoutRepository {
    /// Creates a new CheckoutRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutRepository { pool }
    }

    /// Persists a session with its two address rows in one transaction.
    pub async fn create(&self, new: NewCheckoutSession) -> DbResult<CheckoutSession> {
        let mut tx = self.pool.begin().await?;
        let session = insert_session_in(&mut tx, &new).await?;
        tx.commit().await?;

        info!(checkout_id = %session.id, cart_id = %session.cart_id, "Checkout session created");
        Ok(session)
    }

    /// Gets a session by ID.
    pub async fn get(&self, checkout_id: &str) -> DbResult<Option<CheckoutSession>> {
        let session =
            sqlx::query_as::<_, CheckoutSession>("SELECT * FROM checkouts WHERE id = ?1")
                .bind(checkout_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    /// Gets an address row by ID.
    pub async fn address(&self, address_id: &str) -> DbResult<Option<Address>> {
        let address = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = ?1")
            .bind(address_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(address)
    }

    /// Transitions an active session to `completed`.
    pub async fn complete(&self, checkout_id: &str) -> DbResult<CheckoutSession> {
        debug!(checkout_id = %checkout_id, "Completing checkout session");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE checkouts SET
                status = 'completed',
                completed_at = ?2,
                updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(checkout_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_active_error(checkout_id).await?);
        }

        self.get(checkout_id)
            .await?
            .ok_or_else(|| DbError::not_found("CheckoutSession", checkout_id))
    }

    /// Transitions an active session to `failed` with a reason.
    pub async fn fail(&self, checkout_id: &str, reason: &str) -> DbResult<()> {
        debug!(checkout_id = %checkout_id, reason = %reason, "Failing checkout session");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE checkouts SET
                status = 'failed',
                failed_at = ?2,
                failure_reason = ?3,
                stock_reserved = 0,
                updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(checkout_id)
        .bind(now)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_active_error(checkout_id).await?);
        }

        Ok(())
    }

    /// Transitions an active session to `expired`.
    ///
    /// ## Returns
    /// `true` if this call performed the transition, `false` if the session
    /// was already expired (a lazy read check racing the sweep is expected
    /// and harmless).
    pub async fn expire(&self, checkout_id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE checkouts SET
                status = 'expired',
                stock_reserved = 0,
                updated_at = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(checkout_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            info!(checkout_id = %checkout_id, "Checkout session expired");
            return Ok(true);
        }

        match self.get(checkout_id).await? {
            None => Err(DbError::from(CoreError::CheckoutNotFound(
                checkout_id.to_string(),
            ))),
            Some(session) if session.status == vend_core::CheckoutStatus::Expired => Ok(false),
            Some(session) => Err(DbError::from(CoreError::CheckoutNotActive {
                checkout_id: checkout_id.to_string(),
                status: format!("{:?}", session.status).to_lowercase(),
            })),
        }
    }

    async fn not_active_error(&self, checkout_id: &str) -> DbResult<DbError> {
        let session = self.get(checkout_id).await?;

        Ok(match session {
            None => CoreError::CheckoutNotFound(checkout_id.to_string()).into(),
            Some(session) => CoreError::CheckoutNotActive {
                checkout_id: checkout_id.to_string(),
                status: format!("{:?}", session.status).to_lowercase(),
            }
            .into(),
        })
    }
}

/// Inserts one address row inside an open transaction.
pub async fn insert_address_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    kind: AddressKind,
    address: &NewAddress,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO addresses (
            id, kind, recipient, line1, line2, city, region,
            postal_code, country, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&id)
    .bind(kind)
    .bind(&address.recipient)
    .bind(&address.line1)
    .bind(&address.line2)
    .bind(&address.city)
    .bind(&address.region)
    .bind(&address.postal_code)
    .bind(&address.country)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Inserts a session and its address rows inside an open transaction.
///
/// Used directly by the checkout service so that session creation and
/// reservation placement share one atomic transaction: an insufficient-stock
/// rollback leaves no session row behind.
pub async fn insert_session_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    new: &NewCheckoutSession,
) -> DbResult<CheckoutSession> {
    let now = Utc::now();

    let shipping_address_id =
        insert_address_in(tx, AddressKind::Shipping, &new.shipping_address, now).await?;
    let billing_address_id =
        insert_address_in(tx, AddressKind::Billing, &new.billing_address, now).await?;

    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO checkouts (
            id, cart_id, user_id, shipping_address_id, billing_address_id,
            shipping_method, currency,
            tax_total_cents, shipping_total_cents, grand_total_cents,
            stock_reserved, status, expires_at,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, 'active', ?11, ?12, ?12)
        "#,
    )
    .bind(&id)
    .bind(&new.cart_id)
    .bind(&new.user_id)
    .bind(&shipping_address_id)
    .bind(&billing_address_id)
    .bind(&new.shipping_method)
    .bind(&new.currency)
    .bind(new.tax_total_cents)
    .bind(new.shipping_total_cents)
    .bind(new.grand_total_cents)
    .bind(new.expires_at)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    let session = sqlx::query_as::<_, CheckoutSession>("SELECT * FROM checkouts WHERE id = ?1")
        .bind(&id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(session)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::Duration;
    use vend_core::{CartOwner, CheckoutStatus};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn us_address() -> NewAddress {
        NewAddress {
            recipient: "Ada Lovelace".into(),
            line1: "12 Analytical Way".into(),
            line2: None,
            city: "Dallas".into(),
            region: Some("TX".into()),
            postal_code: "75001".into(),
            country: "US".into(),
        }
    }

    async fn new_session(db: &Database) -> NewCheckoutSession {
        let cart = db
            .carts()
            .create_or_get(&CartOwner::User("u1".into()), "USD")
            .await
            .unwrap();

        NewCheckoutSession {
            cart_id: cart.id,
            user_id: Some("u1".into()),
            shipping_address: us_address(),
            billing_address: us_address(),
            shipping_method: "standard".into(),
            currency: "USD".into(),
            tax_total_cents: 83,
            shipping_total_cents: 500,
            grand_total_cents: 1583,
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let db = test_db().await;
        let repo = db.checkouts();

        let session = repo.create(new_session(&db).await).await.unwrap();
        assert_eq!(session.status, CheckoutStatus::Active);
        assert!(!session.stock_reserved);

        let fetched = repo.get(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.grand_total_cents, 1583);

        let shipping = repo
            .address(&fetched.shipping_address_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shipping.kind, AddressKind::Shipping);
        assert_eq!(shipping.postal_code, "75001");
    }

    #[tokio::test]
    async fn test_complete_is_terminal() {
        let db = test_db().await;
        let repo = db.checkouts();
        let session = repo.create(new_session(&db).await).await.unwrap();

        let completed = repo.complete(&session.id).await.unwrap();
        assert_eq!(completed.status, CheckoutStatus::Completed);
        assert!(completed.completed_at.is_some());

        // Terminal states are final.
        let err = repo.complete(&session.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CheckoutNotActive { .. })
        ));
        let err = repo.fail(&session.id, "late failure").await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CheckoutNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_records_reason() {
        let db = test_db().await;
        let repo = db.checkouts();
        let session = repo.create(new_session(&db).await).await.unwrap();

        repo.fail(&session.id, "insufficient_stock:TOWEL-001")
            .await
            .unwrap();

        let failed = repo.get(&session.id).await.unwrap().unwrap();
        assert_eq!(failed.status, CheckoutStatus::Failed);
        assert_eq!(
            failed.failure_reason.as_deref(),
            Some("insufficient_stock:TOWEL-001")
        );
        assert!(failed.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_expire_is_idempotent() {
        let db = test_db().await;
        let repo = db.checkouts();
        let session = repo.create(new_session(&db).await).await.unwrap();

        assert!(repo.expire(&session.id).await.unwrap());
        // Second expire reports it already happened rather than erroring.
        assert!(!repo.expire(&session.id).await.unwrap());

        let expired = repo.get(&session.id).await.unwrap().unwrap();
        assert_eq!(expired.status, CheckoutStatus::Expired);
        assert!(!expired.stock_reserved);
    }

    #[tokio::test]
    async fn test_expire_completed_session_errors() {
        let db = test_db().await;
        let repo = db.checkouts();
        let session = repo.create(new_session(&db).await).await.unwrap();
        repo.complete(&session.id).await.unwrap();

        let err = repo.expire(&session.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CheckoutNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let db = test_db().await;
        let repo = db.checkouts();

        assert!(repo.get("ghost").await.unwrap().is_none());
        let err = repo.complete("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CheckoutNotFound(_))
        ));
    }
}
