//! # Background Sweep
//!
//! Periodic cleanup invoked by an external scheduler (or the bundled tokio
//! interval runner for single-process deployments).
//!
//! ## What One Pass Does
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sweeper::run_once()                              │
//! │                                                                         │
//! │  1. release_expired(now)                                               │
//! │     ├── active holds past expires_at → released ("expired")            │
//! │     └── their sessions → expired (stock returns to availability)       │
//! │                                                                         │
//! │  2. mark_abandoned(now - cart TTL)                                     │
//! │     └── active carts idle past the TTL → abandoned                     │
//! │                                                                         │
//! │  Fire-and-forget: released requesters are not notified.                │
//! │  Missed passes are harmless - availability math already excludes       │
//! │  expired holds at read time.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{info, warn};

use vend_db::Database;

use crate::config::CheckoutConfig;
use crate::error::ServiceResult;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub holds_released: u64,
    pub sessions_expired: u64,
    pub carts_abandoned: u64,
}

/// Releases expired reservations and abandons idle carts.
#[derive(Clone)]
pub struct Sweeper {
    db: Database,
    config: CheckoutConfig,
}

impl Sweeper {
    /// Creates a new Sweeper.
    pub fn new(db: Database, config: CheckoutConfig) -> Self {
        Sweeper { db, config }
    }

    /// One sweep pass. Safe to run from multiple schedulers; every statement
    /// is status-guarded, so overlapping passes just find nothing to do.
    pub async fn run_once(&self) -> ServiceResult<SweepReport> {
        let now = Utc::now();

        let expiry = self.db.reservations().release_expired(now).await?;

        let cutoff = now - self.config.cart_abandon_ttl();
        let carts_abandoned = self.db.carts().mark_abandoned(cutoff).await?;

        let report = SweepReport {
            holds_released: expiry.holds_released,
            sessions_expired: expiry.sessions_expired,
            carts_abandoned,
        };

        if report != SweepReport::default() {
            info!(
                holds_released = report.holds_released,
                sessions_expired = report.sessions_expired,
                carts_abandoned = report.carts_abandoned,
                "Sweep pass finished"
            );
        }

        Ok(report)
    }

    /// Runs the sweep on the configured interval until the task is aborted.
    ///
    /// For deployments without an external cron. Errors are logged and the
    /// loop keeps going; a transiently unavailable database must not kill
    /// the sweeper.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        let interval = self.config.sweep_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so spawn-then-write
            // test sequences aren't swept mid-setup.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(err) = self.run_once().await {
                    warn!(error = %err, "Sweep pass failed");
                }
            }
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vend_core::CartOwner;
    use vend_db::DbConfig;

    #[tokio::test]
    async fn test_run_once_on_clean_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let sweeper = Sweeper::new(db, CheckoutConfig::default());

        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_run_once_abandons_idle_carts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.carts()
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        // Shrink the TTL to zero so "idle" means "created before now".
        let config = CheckoutConfig {
            cart_abandon_ttl_days: 0,
            ..CheckoutConfig::default()
        };
        let sweeper = Sweeper::new(db.clone(), config);

        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.carts_abandoned, 1);

        // A second pass finds nothing.
        let report = sweeper.run_once().await.unwrap();
        assert_eq!(report.carts_abandoned, 0);
    }

    #[tokio::test]
    async fn test_run_once_releases_expired_holds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.inventory().create("p1", "TOWEL-001", 5, 0, None).await.unwrap();

        let cart = db
            .carts()
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();
        db.carts()
            .add_item(
                &cart.id,
                &vend_db::repository::cart::NewCartItem {
                    product_id: "p1".into(),
                    sku: "TOWEL-001".into(),
                    qty: 5,
                    unit_price_cents: 2599,
                },
            )
            .await
            .unwrap();

        let session = db
            .checkouts()
            .create(vend_db::repository::checkout::NewCheckoutSession {
                cart_id: cart.id.clone(),
                user_id: None,
                shipping_address: vend_core::NewAddress {
                    recipient: "Ada Lovelace".into(),
                    line1: "12 Analytical Way".into(),
                    line2: None,
                    city: "Dallas".into(),
                    region: Some("TX".into()),
                    postal_code: "75001".into(),
                    country: "US".into(),
                },
                billing_address: vend_core::NewAddress {
                    recipient: "Ada Lovelace".into(),
                    line1: "12 Analytical Way".into(),
                    line2: None,
                    city: "Dallas".into(),
                    region: Some("TX".into()),
                    postal_code: "75001".into(),
                    country: "US".into(),
                },
                shipping_method: "standard".into(),
                currency: "USD".into(),
                tax_total_cents: 0,
                shipping_total_cents: 0,
                grand_total_cents: 0,
                expires_at: Utc::now() + Duration::minutes(15),
            })
            .await
            .unwrap();

        let items = db.carts().items(&cart.id).await.unwrap();
        db.reservations()
            .reserve_all(&session.id, &items, session.expires_at)
            .await
            .unwrap();

        // Time-travel past the TTL, then sweep.
        let past = Utc::now() - Duration::minutes(1);
        sqlx::query("UPDATE checkouts SET expires_at = ?2 WHERE id = ?1")
            .bind(&session.id)
            .bind(past)
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE inventory_reservations SET expires_at = ?2 WHERE checkout_id = ?1")
            .bind(&session.id)
            .bind(past)
            .execute(db.pool())
            .await
            .unwrap();

        let sweeper = Sweeper::new(db.clone(), CheckoutConfig::default());
        let report = sweeper.run_once().await.unwrap();

        assert_eq!(report.holds_released, 1);
        assert_eq!(report.sessions_expired, 1);
        assert_eq!(
            db.inventory().available("p1", Utc::now()).await.unwrap(),
            5
        );
    }
}
