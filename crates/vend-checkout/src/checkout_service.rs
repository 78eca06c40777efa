//! # Checkout Service
//!
//! Orchestrates address capture, shipping/tax calculation, and stock
//! reservation into a checkout session.
//!
//! ## Session Creation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    create_session()                                     │
//! │                                                                         │
//! │  1. Load cart ──────────────── CartNotFound / EmptyCart                │
//! │  2. Validate addresses ─────── invalid_address / invalid_postal_code   │
//! │  3. Validate shipping method ─ shipping_unavailable                    │
//! │  4. Reprice from catalog, then tax + shipping + grand total            │
//! │  5. ┌───────────────────────────────────────────────────────────────┐  │
//! │     │                  SINGLE TRANSACTION                           │  │
//! │     │  addresses + session row (expires_at = now + TTL)             │  │
//! │     │  one guarded hold per line (ascending product_id)             │  │
//! │     │  stock_reserved = 1                                           │  │
//! │     └───────────────────────────────────────────────────────────────┘  │
//! │     InsufficientStock rolls back EVERYTHING - no session row survives  │
//! │  6. Return {checkout_id, amount, currency} for the payment step        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Expiry is checked proactively on every read: a session read past its TTL
//! is expired on the spot (holds released) without waiting for the sweep.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vend_core::validation::{validate_address, validate_currency};
use vend_core::{CheckoutSession, CoreError, InventoryReservation, NewAddress, ReservationStatus};
use vend_db::repository::checkout::{insert_session_in, NewCheckoutSession};
use vend_db::repository::reservation::place_holds_in;
use vend_db::{Database, DbError};

use crate::catalog::CatalogService;
use crate::config::CheckoutConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::shipping::ShippingService;
use crate::tax::TaxService;

/// Input for starting a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub cart_id: String,
    /// The authenticated caller; None for guest checkout.
    pub user_id: Option<String>,
    pub shipping_address: NewAddress,
    pub billing_address: NewAddress,
    pub shipping_method: String,
}

/// What the payment step needs from a created session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub checkout_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

/// Checkout session orchestration over the reservation manager and the
/// external collaborators.
#[derive(Clone)]
pub struct CheckoutService {
    db: Database,
    catalog: Arc<dyn CatalogService>,
    tax: Arc<dyn TaxService>,
    shipping: Arc<dyn ShippingService>,
    config: CheckoutConfig,
}

impl CheckoutService {
    /// Creates a new CheckoutService.
    pub fn new(
        db: Database,
        catalog: Arc<dyn CatalogService>,
        tax: Arc<dyn TaxService>,
        shipping: Arc<dyn ShippingService>,
        config: CheckoutConfig,
    ) -> Self {
        CheckoutService {
            db,
            catalog,
            tax,
            shipping,
            config,
        }
    }

    /// Starts a checkout: validates the request, prices it, and reserves
    /// stock for every line - all-or-nothing.
    pub async fn create_session(&self, req: CreateSessionRequest) -> ServiceResult<CheckoutSummary> {
        debug!(cart_id = %req.cart_id, "Creating checkout session");

        // 1. The cart must exist, belong to the caller, and have lines.
        let cart = self
            .db
            .carts()
            .get(&req.cart_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(req.cart_id.clone()))?;

        if let Some(owner) = &cart.user_id {
            // A foreign user's cart reads as missing, per ownership scoping.
            if req.user_id.as_deref() != Some(owner.as_str()) {
                return Err(CoreError::CartNotFound(req.cart_id.clone()).into());
            }
        }
        if !cart.is_active() {
            return Err(CoreError::CartNotActive {
                cart_id: cart.id.clone(),
                status: format!("{:?}", cart.status).to_lowercase(),
            }
            .into());
        }

        let items = self.db.carts().items(&cart.id).await?;
        if items.is_empty() {
            return Err(CoreError::EmptyCart(cart.id.clone()).into());
        }

        // 2. Addresses.
        validate_address(&req.shipping_address)?;
        validate_address(&req.billing_address)?;
        validate_currency(&cart.currency, &self.config.currencies)?;

        // 3. The chosen shipping method must serve the destination.
        let methods = self
            .shipping
            .available_methods(&req.shipping_address, &items)
            .await?;
        if !methods.iter().any(|m| m.code == req.shipping_method) {
            return Err(CoreError::ShippingUnavailable {
                method: req.shipping_method.clone(),
                country: req.shipping_address.country.clone(),
            }
            .into());
        }

        // 4. Guard against stale price snapshots, then price the session.
        self.reprice_from_catalog(&cart.id, &items).await?;
        let cart = self
            .db
            .carts()
            .get(&cart.id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(req.cart_id.clone()))?;
        let items = self.db.carts().items(&cart.id).await?;

        let tax_quote = self
            .tax
            .calculate(&req.shipping_address, &items, &cart.currency)
            .await?;
        let shipping_cost = self
            .shipping
            .cost(
                &req.shipping_address,
                &items,
                &req.shipping_method,
                &cart.currency,
            )
            .await?;

        let grand_total_cents = cart.subtotal_cents - cart.discount_total_cents
            + tax_quote.tax_total_cents
            + shipping_cost;

        // 5. Session + holds share one transaction: an insufficient-stock
        // rollback leaves no session row behind.
        let now = Utc::now();
        let expires_at = now + self.config.session_ttl();

        let mut tx = self.db.pool().begin().await.map_err(DbError::from)?;
        let session = insert_session_in(
            &mut tx,
            &NewCheckoutSession {
                cart_id: cart.id.clone(),
                user_id: req.user_id.clone(),
                shipping_address: req.shipping_address.clone(),
                billing_address: req.billing_address.clone(),
                shipping_method: req.shipping_method.clone(),
                currency: cart.currency.clone(),
                tax_total_cents: tax_quote.tax_total_cents,
                shipping_total_cents: shipping_cost,
                grand_total_cents,
                expires_at,
            },
        )
        .await?;
        place_holds_in(&mut tx, &session.id, &items, expires_at, now).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            checkout_id = %session.id,
            cart_id = %cart.id,
            amount = %grand_total_cents,
            lines = items.len(),
            "Checkout session created with stock reserved"
        );

        Ok(CheckoutSummary {
            checkout_id: session.id,
            amount_cents: grand_total_cents,
            currency: cart.currency.clone(),
        })
    }

    /// Reads a session with ownership and proactive expiry checks.
    ///
    /// ## Errors
    /// * `CheckoutNotFound`
    /// * `AccessDenied` - owned by a different user (explicit, not a 404)
    /// * `CheckoutExpired` - past TTL; active holds are released on the spot
    pub async fn get_session(
        &self,
        checkout_id: &str,
        caller: Option<&str>,
    ) -> ServiceResult<CheckoutSession> {
        let session = self
            .db
            .checkouts()
            .get(checkout_id)
            .await?
            .ok_or_else(|| CoreError::CheckoutNotFound(checkout_id.to_string()))?;

        if let Some(owner) = &session.user_id {
            if caller != Some(owner.as_str()) {
                return Err(CoreError::AccessDenied {
                    resource: "checkout".to_string(),
                    id: checkout_id.to_string(),
                }
                .into());
            }
        }

        let now = Utc::now();
        if session.is_expired(now) {
            let reservations = self.db.reservations().for_checkout(checkout_id).await?;
            let committed = reservations
                .iter()
                .any(|r| r.status == ReservationStatus::Confirmed);

            // Confirmed stock is already committed; the pending completion
            // outlives the TTL.
            if !committed {
                self.db
                    .reservations()
                    .release_all(checkout_id, "expired")
                    .await?;
                self.db.checkouts().expire(checkout_id).await?;
                return Err(CoreError::CheckoutExpired(checkout_id.to_string()).into());
            }
        }

        Ok(session)
    }

    /// Places a fresh hold set for a session whose previous holds were
    /// released (the session itself is still active and unexpired).
    pub async fn reserve_session(
        &self,
        checkout_id: &str,
    ) -> ServiceResult<Vec<InventoryReservation>> {
        let session = self
            .db
            .checkouts()
            .get(checkout_id)
            .await?
            .ok_or_else(|| CoreError::CheckoutNotFound(checkout_id.to_string()))?;

        let items = self.db.carts().items(&session.cart_id).await?;
        if items.is_empty() {
            return Err(CoreError::EmptyCart(session.cart_id.clone()).into());
        }

        let reservations = self
            .db
            .reservations()
            .reserve_all(checkout_id, &items, session.expires_at)
            .await?;
        Ok(reservations)
    }

    /// Confirms every hold: soft holds become permanent ledger decrements.
    pub async fn confirm_reservations(
        &self,
        checkout_id: &str,
    ) -> ServiceResult<Vec<InventoryReservation>> {
        let reservations = self.db.reservations().confirm_all(checkout_id).await?;
        Ok(reservations)
    }

    /// Releases every active hold; the session stays active so a new
    /// reservation attempt can be made (or it ages out via the sweep).
    pub async fn release_reservations(
        &self,
        checkout_id: &str,
        reason: &str,
    ) -> ServiceResult<u64> {
        self.db
            .checkouts()
            .get(checkout_id)
            .await?
            .ok_or_else(|| CoreError::CheckoutNotFound(checkout_id.to_string()))?;

        let released = self
            .db
            .reservations()
            .release_all(checkout_id, reason)
            .await?;
        Ok(released)
    }

    /// Completes the session once the external order-placement step has
    /// succeeded. Requires every hold to be confirmed; converts the cart.
    pub async fn complete_session(&self, checkout_id: &str) -> ServiceResult<CheckoutSession> {
        let reservations = self.db.reservations().for_checkout(checkout_id).await?;
        let all_confirmed = !reservations.is_empty()
            && reservations
                .iter()
                .all(|r| r.status == ReservationStatus::Confirmed);

        if !all_confirmed {
            return Err(ServiceError::UnconfirmedReservations(
                checkout_id.to_string(),
            ));
        }

        let session = self.db.checkouts().complete(checkout_id).await?;
        self.db.carts().mark_converted(&session.cart_id).await?;

        info!(checkout_id = %checkout_id, cart_id = %session.cart_id, "Checkout completed");
        Ok(session)
    }

    /// Fails the session: releases active holds and records the reason.
    pub async fn fail_session(&self, checkout_id: &str, reason: &str) -> ServiceResult<()> {
        self.db
            .reservations()
            .release_all(checkout_id, reason)
            .await?;
        self.db.checkouts().fail(checkout_id, reason).await?;

        info!(checkout_id = %checkout_id, reason = %reason, "Checkout failed");
        Ok(())
    }

    async fn reprice_from_catalog(
        &self,
        cart_id: &str,
        items: &[vend_core::CartItem],
    ) -> ServiceResult<()> {
        let mut prices = Vec::with_capacity(items.len());
        for item in items {
            let product = self
                .catalog
                .product_by_sku(&item.sku)
                .await?
                .ok_or_else(|| CoreError::ProductNotFound(item.sku.clone()))?;

            // A delisted product blocks checkout outright.
            if !product.is_published() {
                return Err(CoreError::ProductUnavailable(item.sku.clone()).into());
            }
            prices.push((item.sku.clone(), product.price_cents));
        }

        self.db.carts().reprice(cart_id, &prices).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart_service::CartService;
    use crate::catalog::{CatalogProduct, InMemoryCatalog, ProductStatus};
    use crate::shipping::TableRateShipping;
    use crate::tax::FlatRateTax;
    use chrono::Duration;
    use vend_core::types::TaxRate;
    use vend_core::{CartOwner, CartStatus, CheckoutStatus};
    use vend_db::DbConfig;

    struct Harness {
        db: Database,
        carts: CartService,
        checkout: CheckoutService,
        catalog: Arc<InMemoryCatalog>,
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

    fn request(cart_id: &str, user_id: Option<&str>) -> CreateSessionRequest {
        CreateSessionRequest {
            cart_id: cart_id.to_string(),
            user_id: user_id.map(str::to_string),
            shipping_address: us_address(),
            billing_address: us_address(),
            shipping_method: "standard".into(),
        }
    }

    async fn harness() -> Harness {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.inventory().create("p-towel", "TOWEL-001", 10, 2, None).await.unwrap();

        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.upsert(CatalogProduct {
            id: "p-towel".into(),
            sku: "TOWEL-001".into(),
            price_cents: 2599,
            currency: "USD".into(),
            status: ProductStatus::Published,
            category_id: None,
        });

        let tax = Arc::new(FlatRateTax::new(TaxRate::from_bps(825)));
        let shipping = Arc::new(
            TableRateShipping::new()
                .with_rate("standard", "Standard (5-7 days)", 500, 50, None)
                .with_rate("express", "Express (1-2 days)", 1500, 100, Some(vec!["US".into()])),
        );
        let config = CheckoutConfig::default();

        let carts = CartService::new(db.clone(), catalog.clone(), config.clone());
        let checkout = CheckoutService::new(db.clone(), catalog.clone(), tax, shipping, config);

        Harness {
            db,
            carts,
            checkout,
            catalog,
        }
    }

    /// Guest cart with 2 towels, ready to check out.
    async fn cart_with_towels(h: &Harness, token: &str, qty: i64) -> String {
        let cart = h
            .carts
            .create_or_get(&CartOwner::Guest(token.into()), None)
            .await
            .unwrap();
        h.carts.add_item(&cart.id, "TOWEL-001", qty).await.unwrap();
        cart.id
    }

    #[tokio::test]
    async fn test_create_session_prices_and_reserves() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 2).await;

        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        // subtotal 5198 + tax 429 (8.25%) + shipping 600 (500 + 2×50)
        assert_eq!(summary.amount_cents, 5198 + 429 + 600);
        assert_eq!(summary.currency, "USD");

        let session = h
            .checkout
            .get_session(&summary.checkout_id, None)
            .await
            .unwrap();
        assert!(session.stock_reserved);
        assert_eq!(session.status, CheckoutStatus::Active);
        assert_eq!(session.tax_total_cents, 429);
        assert_eq!(session.shipping_total_cents, 600);

        // Holds drain availability but not the ledger quantity.
        assert_eq!(
            h.db.inventory().available("p-towel", Utc::now()).await.unwrap(),
            8
        );
        assert_eq!(
            h.db.inventory().get("p-towel").await.unwrap().unwrap().quantity,
            10
        );
    }

    #[tokio::test]
    async fn test_create_session_empty_cart() {
        let h = harness().await;
        let cart = h
            .carts
            .create_or_get(&CartOwner::Guest("t1".into()), None)
            .await
            .unwrap();

        let err = h
            .checkout
            .create_session(request(&cart.id, None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "empty_cart");
    }

    #[tokio::test]
    async fn test_create_session_invalid_postal_code() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 1).await;

        let mut req = request(&cart_id, None);
        req.shipping_address.postal_code = "75".into();

        let err = h.checkout.create_session(req).await.unwrap_err();
        assert_eq!(err.code(), "invalid_postal_code");
    }

    #[tokio::test]
    async fn test_create_session_shipping_unavailable() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 1).await;

        let mut req = request(&cart_id, None);
        req.shipping_method = "express".into();
        req.shipping_address.country = "DE".into();
        req.shipping_address.postal_code = "10115".into();
        req.billing_address = req.shipping_address.clone();

        let err = h.checkout.create_session(req).await.unwrap_err();
        assert_eq!(err.code(), "shipping_unavailable");
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_no_session() {
        let h = harness().await;

        // First checkout holds the full stock.
        let cart_a = cart_with_towels(&h, "winner", 10).await;
        h.checkout
            .create_session(request(&cart_a, None))
            .await
            .unwrap();

        // Second checkout wants one more unit than remains.
        let cart_b = cart_with_towels(&h, "loser", 1).await;
        let err = h
            .checkout
            .create_session(request(&cart_b, None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_stock");

        // All-or-nothing: no session row survived for the losing cart.
        let sessions: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM checkouts WHERE cart_id = ?1")
                .bind(&cart_b)
                .fetch_one(h.db.pool())
                .await
                .unwrap();
        assert_eq!(sessions, 0);
    }

    #[tokio::test]
    async fn test_create_session_repricing_guards_stale_prices() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 2).await;

        // Price moves between add-to-cart and checkout; the session must be
        // priced from the CURRENT catalog, not the cart snapshot.
        h.catalog.set_price("TOWEL-001", 2799);

        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        // subtotal 5598 + tax 462 (8.25%) + shipping 600
        assert_eq!(summary.amount_cents, 5598 + 462 + 600);

        let cart = h.db.carts().get(&cart_id).await.unwrap().unwrap();
        assert_eq!(cart.subtotal_cents, 5598);
    }

    #[tokio::test]
    async fn test_create_session_rejects_delisted_product() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 2).await;

        h.catalog.set_status("TOWEL-001", ProductStatus::Archived);

        let err = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "product_unavailable");
    }

    #[tokio::test]
    async fn test_get_session_ownership() {
        let h = harness().await;

        let cart = h
            .carts
            .create_or_get(&CartOwner::User("u1".into()), None)
            .await
            .unwrap();
        h.carts.add_item(&cart.id, "TOWEL-001", 1).await.unwrap();

        let summary = h
            .checkout
            .create_session(request(&cart.id, Some("u1")))
            .await
            .unwrap();

        // Owner reads fine.
        h.checkout
            .get_session(&summary.checkout_id, Some("u1"))
            .await
            .unwrap();

        // Foreign user and anonymous callers get an explicit denial.
        let err = h
            .checkout
            .get_session(&summary.checkout_id, Some("u2"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");

        let err = h
            .checkout
            .get_session(&summary.checkout_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[tokio::test]
    async fn test_get_session_lazy_expiry_releases_holds() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 10).await;
        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        // Time-travel the session past its TTL; the sweep has NOT run.
        let past = Utc::now() - Duration::minutes(1);
        sqlx::query("UPDATE checkouts SET expires_at = ?2 WHERE id = ?1")
            .bind(&summary.checkout_id)
            .bind(past)
            .execute(h.db.pool())
            .await
            .unwrap();

        let err = h
            .checkout
            .get_session(&summary.checkout_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "checkout_expired");

        // The lazy check released the holds without waiting for the sweep.
        assert_eq!(
            h.db.inventory().available("p-towel", Utc::now()).await.unwrap(),
            10
        );
        let session = h.db.checkouts().get(&summary.checkout_id).await.unwrap().unwrap();
        assert_eq!(session.status, CheckoutStatus::Expired);

        // Expired sessions require starting a new checkout.
        let err = h
            .checkout
            .get_session(&summary.checkout_id, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "checkout_expired");
    }

    #[tokio::test]
    async fn test_confirm_then_complete_converts_cart() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 3).await;
        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        // Completing before confirmation is refused.
        let err = h
            .checkout
            .complete_session(&summary.checkout_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "conflict");

        h.checkout
            .confirm_reservations(&summary.checkout_id)
            .await
            .unwrap();
        let session = h
            .checkout
            .complete_session(&summary.checkout_id)
            .await
            .unwrap();

        assert_eq!(session.status, CheckoutStatus::Completed);

        let cart = h.db.carts().get(&cart_id).await.unwrap().unwrap();
        assert_eq!(cart.status, CartStatus::Converted);

        // Stock permanently decremented through the ledger.
        let record = h.db.inventory().get("p-towel").await.unwrap().unwrap();
        assert_eq!(record.quantity, 7);
    }

    #[tokio::test]
    async fn test_fail_session_releases_holds() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 4).await;
        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        h.checkout
            .fail_session(&summary.checkout_id, "payment_declined")
            .await
            .unwrap();

        let session = h.db.checkouts().get(&summary.checkout_id).await.unwrap().unwrap();
        assert_eq!(session.status, CheckoutStatus::Failed);
        assert_eq!(session.failure_reason.as_deref(), Some("payment_declined"));

        assert_eq!(
            h.db.inventory().available("p-towel", Utc::now()).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_release_then_reserve_again() {
        let h = harness().await;
        let cart_id = cart_with_towels(&h, "t1", 5).await;
        let summary = h
            .checkout
            .create_session(request(&cart_id, None))
            .await
            .unwrap();

        let released = h
            .checkout
            .release_reservations(&summary.checkout_id, "customer_paused")
            .await
            .unwrap();
        assert_eq!(released, 1);
        assert_eq!(
            h.db.inventory().available("p-towel", Utc::now()).await.unwrap(),
            10
        );

        // The session stayed active; a fresh hold set can be placed.
        let reservations = h
            .checkout
            .reserve_session(&summary.checkout_id)
            .await
            .unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(
            h.db.inventory().available("p-towel", Utc::now()).await.unwrap(),
            5
        );
    }
}
