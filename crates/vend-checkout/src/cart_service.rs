//! # Cart Service
//!
//! Catalog-validated cart operations.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Service Operations                              │
//! │                                                                         │
//! │  Caller Action            Validation                Repository          │
//! │  ─────────────            ──────────                ──────────          │
//! │                                                                         │
//! │  add_item(sku, qty) ────► sku format, qty bounds ─► merge-by-sku       │
//! │                           catalog lookup            upsert + stock      │
//! │                           published? currency?      check + recompute   │
//! │                                                                         │
//! │  update_item(sku, 0) ───► (none) ─────────────────► remove line        │
//! │                                                                         │
//! │  reprice() ─────────────► current catalog prices ─► rewrite snapshots  │
//! │                                                                         │
//! │  merge(token, user) ────► (none) ─────────────────► fold guest cart    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock checks at this stage run against on-hand quantity only; reservation
//! accounting starts when a checkout session is created.

use std::sync::Arc;

use tracing::{debug, info};

use vend_core::validation::{validate_currency, validate_price_cents, validate_quantity, validate_sku};
use vend_core::{Cart, CartItem, CartOwner, CoreError};
use vend_db::repository::cart::NewCartItem;
use vend_db::Database;

use crate::catalog::CatalogService;
use crate::config::CheckoutConfig;
use crate::error::{ServiceError, ServiceResult};

/// Cart operations validated against the catalog.
#[derive(Clone)]
pub struct CartService {
    db: Database,
    catalog: Arc<dyn CatalogService>,
    config: CheckoutConfig,
}

impl CartService {
    /// Creates a new CartService.
    pub fn new(db: Database, catalog: Arc<dyn CatalogService>, config: CheckoutConfig) -> Self {
        CartService {
            db,
            catalog,
            config,
        }
    }

    /// Finds the identity's active cart or creates one.
    ///
    /// `currency` defaults to the configured primary currency; an explicit
    /// value is validated against the supported set.
    pub async fn create_or_get(
        &self,
        owner: &CartOwner,
        currency: Option<&str>,
    ) -> ServiceResult<Cart> {
        let currency = currency.unwrap_or_else(|| self.config.default_currency());
        validate_currency(currency, &self.config.currencies)?;

        let cart = self.db.carts().create_or_get(owner, currency).await?;
        Ok(cart)
    }

    /// The identity's active cart with its line items.
    pub async fn cart_with_items(&self, owner: &CartOwner) -> ServiceResult<(Cart, Vec<CartItem>)> {
        let cart = self
            .db
            .carts()
            .get_active_for(owner)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(format!("{owner:?}")))?;

        let items = self.db.carts().items(&cart.id).await?;
        Ok((cart, items))
    }

    /// Adds a line to the cart after catalog validation.
    ///
    /// ## Errors
    /// * `ProductNotFound` - sku unknown to the catalog
    /// * `ProductUnavailable` - not published
    /// * `CurrencyMismatch` - product priced in a different currency
    /// * `InsufficientStock` - combined quantity exceeds on-hand stock
    pub async fn add_item(&self, cart_id: &str, sku: &str, qty: i64) -> ServiceResult<CartItem> {
        validate_sku(sku)?;
        validate_quantity(qty)?;

        let product = self
            .catalog
            .product_by_sku(sku)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(sku.to_string()))?;

        if !product.is_published() {
            return Err(CoreError::ProductUnavailable(sku.to_string()).into());
        }
        validate_price_cents(product.price_cents)?;

        let cart = self
            .db
            .carts()
            .get(cart_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(cart_id.to_string()))?;

        if cart.currency != product.currency {
            return Err(CoreError::CurrencyMismatch {
                expected: cart.currency,
                got: product.currency,
            }
            .into());
        }

        let item = self
            .db
            .carts()
            .add_item(
                cart_id,
                &NewCartItem {
                    product_id: product.id,
                    sku: product.sku,
                    qty,
                    unit_price_cents: product.price_cents,
                },
            )
            .await?;

        info!(cart_id = %cart_id, sku = %sku, qty = %qty, "Item added to cart");
        Ok(item)
    }

    /// Sets a line's quantity; zero removes the line.
    pub async fn update_item(&self, cart_id: &str, sku: &str, qty: i64) -> ServiceResult<()> {
        if qty > 0 {
            validate_quantity(qty)?;
        }

        self.db.carts().update_item(cart_id, sku, qty).await?;
        Ok(())
    }

    /// Removes a line from the cart.
    pub async fn remove_item(&self, cart_id: &str, sku: &str) -> ServiceResult<()> {
        self.db.carts().remove_item(cart_id, sku).await?;
        Ok(())
    }

    /// Rewrites every line's price snapshot from the current catalog.
    ///
    /// Lines whose product has vanished from the catalog keep their
    /// snapshot; checkout validation deals with delisted products.
    pub async fn reprice(&self, cart_id: &str) -> ServiceResult<Cart> {
        let items = self.db.carts().items(cart_id).await?;

        let mut prices = Vec::with_capacity(items.len());
        for item in &items {
            match self.catalog.product_by_sku(&item.sku).await? {
                Some(product) if product.is_published() => {
                    prices.push((item.sku.clone(), product.price_cents));
                }
                _ => {
                    debug!(sku = %item.sku, "Skipping reprice for delisted product");
                }
            }
        }

        let cart = self.db.carts().reprice(cart_id, &prices).await?;
        Ok(cart)
    }

    /// Folds a guest cart into the user's cart on login.
    pub async fn merge(&self, guest_token: &str, user_id: &str) -> ServiceResult<Cart> {
        let guest = self
            .db
            .carts()
            .get_active_for(&CartOwner::Guest(guest_token.to_string()))
            .await?;

        let currency = guest
            .as_ref()
            .map(|c| c.currency.clone())
            .unwrap_or_else(|| self.config.default_currency().to_string());

        let merged = self.db.carts().merge(guest_token, user_id, &currency).await?;

        info!(user_id = %user_id, cart_id = %merged.id, "Guest cart merged");
        Ok(merged)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
