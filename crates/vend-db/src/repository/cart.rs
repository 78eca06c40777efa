//! # Cart Repository
//!
//! Database operations for carts and line items.
//!
//! ## Cart Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cart Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE OR GET                                                      │
//! │     └── create_or_get(owner) → Cart { status: Active }                 │
//! │         (one active cart per user_id / cart_token, enforced by         │
//! │          partial unique indexes)                                       │
//! │                                                                         │
//! │  2. MUTATE LINES                                                       │
//! │     └── add_item() → merge-by-sku, stock-checked                       │
//! │     └── update_item() / remove_item()                                  │
//! │     └── reprice() → rewrite price snapshots                            │
//! │     └── every mutation ends with ONE totals recompute, same tx         │
//! │                                                                         │
//! │  3. TERMINAL                                                           │
//! │     └── mark_converted()  (order placed)                               │
//! │     └── mark_abandoned()  (inactivity sweep)                           │
//! │     └── merge()           (guest cart folded into user cart, deleted)  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutating operations open with a guarded UPDATE on the cart row (touching
//! `updated_at`), which both validates `status = 'active'` and takes the
//! write lock before any read in the transaction.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vend_core::cart::{recompute_cart, recompute_line};
use vend_core::{Cart, CartItem, CartOwner, CoreError};

/// Catalog snapshot for a line about to enter a cart.
///
/// The caller (cart service) resolves sku → product against the catalog;
/// the repository owns the stock check and the upsert.
#[derive(Debug, Clone)]
pub struct NewCartItem {
    pub product_id: String,
    pub sku: String,
    pub qty: i64,
    pub unit_price_cents: i64,
}

/// Repository for cart database operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Finds the identity's active cart or creates one.
    ///
    /// A user cart and a guest-token cart are distinct rows until `merge`
    /// folds them together.
    pub async fn create_or_get(&self, owner: &CartOwner, currency: &str) -> DbResult<Cart> {
        if let Some(cart) = self.get_active_for(owner).await? {
            return Ok(cart);
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        debug!(cart_id = %id, owner = ?owner, "Creating cart");

        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (
                id, user_id, cart_token, currency, status,
                subtotal_cents, discount_total_cents, tax_total_cents,
                shipping_total_cents, grand_total_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, 'active', 0, 0, 0, 0, 0, ?5, ?5)
            "#,
        )
        .bind(&id)
        .bind(owner.user_id())
        .bind(owner.cart_token())
        .bind(currency)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            let db_err = DbError::from(e);
            // Lost a create race on the partial unique index: the winner's
            // row is the cart we want.
            if matches!(db_err, DbError::UniqueViolation { .. }) {
                if let Some(cart) = self.get_active_for(owner).await? {
                    return Ok(cart);
                }
            }
            return Err(db_err);
        }

        self.get(&id)
            .await?
            .ok_or_else(|| DbError::not_found("Cart", &id))
    }

    /// Gets a cart by ID.
    pub async fn get(&self, cart_id: &str) -> DbResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = ?1")
            .bind(cart_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(cart)
    }

    /// Gets the active cart for an identity, if any.
    pub async fn get_active_for(&self, owner: &CartOwner) -> DbResult<Option<Cart>> {
        let cart = match owner {
            CartOwner::User(user_id) => {
                sqlx::query_as::<_, Cart>(
                    "SELECT * FROM carts WHERE user_id = ?1 AND status = 'active'",
                )
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?
            }
            CartOwner::Guest(token) => {
                sqlx::query_as::<_, Cart>(
                    "SELECT * FROM carts WHERE cart_token = ?1 AND status = 'active'",
                )
                .bind(token)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(cart)
    }

    /// Gets all line items for a cart, oldest first.
    pub async fn items(&self, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            "SELECT * FROM cart_items WHERE cart_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Adds a line to the cart, merging by SKU.
    ///
    /// ## Merge Semantics
    /// `(cart_id, sku)` is unique: adding a sku that is already in the cart
    /// increments that line's quantity instead of creating a second row, and
    /// the COMBINED quantity is validated against stock.
    ///
    /// ## Stock Check
    /// Validated against `inventory.quantity` (on-hand), NOT against
    /// reservations: no checkout is active for this cart yet.
    pub async fn add_item(&self, cart_id: &str, line: &NewCartItem) -> DbResult<CartItem> {
        debug!(cart_id = %cart_id, sku = %line.sku, qty = %line.qty, "Adding cart item");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_active_cart(&mut tx, cart_id, now).await?;

        let existing = fetch_item(&mut tx, cart_id, &line.sku).await?;
        let combined_qty = existing.as_ref().map(|i| i.qty).unwrap_or(0) + line.qty;

        check_on_hand(&mut tx, &line.product_id, &line.sku, combined_qty).await?;

        let item_id = match &existing {
            Some(item) => {
                let mut updated = item.clone();
                updated.qty = combined_qty;
                recompute_line(&mut updated);

                sqlx::query(
                    r#"
                    UPDATE cart_items SET
                        qty = ?2,
                        line_subtotal_cents = ?3,
                        line_total_cents = ?4,
                        updated_at = ?5
                    WHERE id = ?1
                    "#,
                )
                .bind(&updated.id)
                .bind(updated.qty)
                .bind(updated.line_subtotal_cents)
                .bind(updated.line_total_cents)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                updated.id.clone()
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let mut item = CartItem {
                    id: id.clone(),
                    cart_id: cart_id.to_string(),
                    product_id: line.product_id.clone(),
                    sku: line.sku.clone(),
                    qty: line.qty,
                    unit_price_cents: line.unit_price_cents,
                    line_subtotal_cents: 0,
                    line_discount_cents: 0,
                    line_tax_cents: 0,
                    line_total_cents: 0,
                    created_at: now,
                    updated_at: now,
                };
                recompute_line(&mut item);

                sqlx::query(
                    r#"
                    INSERT INTO cart_items (
                        id, cart_id, product_id, sku, qty, unit_price_cents,
                        line_subtotal_cents, line_discount_cents,
                        line_tax_cents, line_total_cents,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                    "#,
                )
                .bind(&item.id)
                .bind(&item.cart_id)
                .bind(&item.product_id)
                .bind(&item.sku)
                .bind(item.qty)
                .bind(item.unit_price_cents)
                .bind(item.line_subtotal_cents)
                .bind(item.line_discount_cents)
                .bind(item.line_tax_cents)
                .bind(item.line_total_cents)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                id
            }
        };

        recompute_totals(&mut tx, cart_id, now).await?;

        let item = sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE id = ?1")
            .bind(&item_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(item)
    }

    /// Sets a line's quantity. Zero removes the line.
    ///
    /// Quantity increases are re-validated against on-hand stock; decreases
    /// are always allowed.
    pub async fn update_item(&self, cart_id: &str, sku: &str, qty: i64) -> DbResult<()> {
        if qty == 0 {
            return self.remove_item(cart_id, sku).await;
        }

        debug!(cart_id = %cart_id, sku = %sku, qty = %qty, "Updating cart item");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_active_cart(&mut tx, cart_id, now).await?;

        let item = fetch_item(&mut tx, cart_id, sku)
            .await?
            .ok_or_else(|| CoreError::ItemNotFound {
                cart_id: cart_id.to_string(),
                sku: sku.to_string(),
            })
            .map_err(DbError::from)?;

        if qty > item.qty {
            check_on_hand(&mut tx, &item.product_id, sku, qty).await?;
        }

        let mut updated = item;
        updated.qty = qty;
        recompute_line(&mut updated);

        sqlx::query(
            r#"
            UPDATE cart_items SET
                qty = ?2,
                line_subtotal_cents = ?3,
                line_total_cents = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&updated.id)
        .bind(updated.qty)
        .bind(updated.line_subtotal_cents)
        .bind(updated.line_total_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        recompute_totals(&mut tx, cart_id, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes a line from the cart.
    pub async fn remove_item(&self, cart_id: &str, sku: &str) -> DbResult<()> {
        debug!(cart_id = %cart_id, sku = %sku, "Removing cart item");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_active_cart(&mut tx, cart_id, now).await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1 AND sku = ?2")
            .bind(cart_id)
            .bind(sku)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ItemNotFound {
                cart_id: cart_id.to_string(),
                sku: sku.to_string(),
            }
            .into());
        }

        recompute_totals(&mut tx, cart_id, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Rewrites price snapshots from current catalog prices, then recomputes.
    ///
    /// `prices` maps sku → current unit price. Lines whose sku is absent keep
    /// their snapshot (catalog may have delisted the product; checkout
    /// validation handles that separately).
    pub async fn reprice(&self, cart_id: &str, prices: &[(String, i64)]) -> DbResult<Cart> {
        debug!(cart_id = %cart_id, prices = prices.len(), "Repricing cart");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_active_cart(&mut tx, cart_id, now).await?;

        let items = fetch_items(&mut tx, cart_id).await?;
        for item in items {
            let Some((_, unit_price_cents)) = prices.iter().find(|(sku, _)| *sku == item.sku)
            else {
                continue;
            };

            let mut updated = item;
            updated.unit_price_cents = *unit_price_cents;
            recompute_line(&mut updated);

            sqlx::query(
                r#"
                UPDATE cart_items SET
                    unit_price_cents = ?2,
                    line_subtotal_cents = ?3,
                    line_total_cents = ?4,
                    updated_at = ?5
                WHERE id = ?1
                "#,
            )
            .bind(&updated.id)
            .bind(updated.unit_price_cents)
            .bind(updated.line_subtotal_cents)
            .bind(updated.line_total_cents)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        recompute_totals(&mut tx, cart_id, now).await?;

        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = ?1")
            .bind(cart_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(cart)
    }

    /// Folds a guest cart into the user's cart on login.
    ///
    /// ## Semantics
    /// - The user cart is created if absent.
    /// - Overlapping skus sum quantities (the user cart's price snapshot
    ///   wins; a reprice runs at checkout anyway).
    /// - The guest cart row is deleted afterwards (line items cascade).
    pub async fn merge(&self, guest_token: &str, user_id: &str, currency: &str) -> DbResult<Cart> {
        debug!(guest_token = %guest_token, user_id = %user_id, "Merging guest cart");

        let user_cart = self
            .create_or_get(&CartOwner::User(user_id.to_string()), currency)
            .await?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        lock_active_cart(&mut tx, &user_cart.id, now).await?;

        let guest_cart = sqlx::query_as::<_, Cart>(
            "SELECT * FROM carts WHERE cart_token = ?1 AND status = 'active'",
        )
        .bind(guest_token)
        .fetch_optional(&mut *tx)
        .await?;

        // No guest cart is a no-op merge: the user cart stands alone.
        let Some(guest_cart) = guest_cart else {
            tx.commit().await?;
            return Ok(user_cart);
        };

        let guest_items = fetch_items(&mut tx, &guest_cart.id).await?;
        for guest_item in guest_items {
            match fetch_item(&mut tx, &user_cart.id, &guest_item.sku).await? {
                Some(existing) => {
                    let mut updated = existing;
                    updated.qty += guest_item.qty;
                    recompute_line(&mut updated);

                    sqlx::query(
                        r#"
                        UPDATE cart_items SET
                            qty = ?2,
                            line_subtotal_cents = ?3,
                            line_total_cents = ?4,
                            updated_at = ?5
                        WHERE id = ?1
                        "#,
                    )
                    .bind(&updated.id)
                    .bind(updated.qty)
                    .bind(updated.line_subtotal_cents)
                    .bind(updated.line_total_cents)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO cart_items (
                            id, cart_id, product_id, sku, qty, unit_price_cents,
                            line_subtotal_cents, line_discount_cents,
                            line_tax_cents, line_total_cents,
                            created_at, updated_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(&user_cart.id)
                    .bind(&guest_item.product_id)
                    .bind(&guest_item.sku)
                    .bind(guest_item.qty)
                    .bind(guest_item.unit_price_cents)
                    .bind(guest_item.line_subtotal_cents)
                    .bind(guest_item.line_discount_cents)
                    .bind(guest_item.line_tax_cents)
                    .bind(guest_item.line_total_cents)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        // Items cascade with the cart row.
        sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(&guest_cart.id)
            .execute(&mut *tx)
            .await?;

        recompute_totals(&mut tx, &user_cart.id, now).await?;

        let merged = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE id = ?1")
            .bind(&user_cart.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(merged)
    }

    /// Marks a cart converted (an order was placed from it).
    ///
    /// Line items are deleted with the transition; reservations and the
    /// order service hold their own sku/qty snapshots, and the cart keeps
    /// its final totals.
    pub async fn mark_converted(&self, cart_id: &str) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE carts SET status = 'converted', updated_at = ?2 WHERE id = ?1 AND status = 'active'",
        )
        .bind(cart_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Diagnose on the open transaction: the pool may have no
            // further connection to lend.
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM carts WHERE id = ?1")
                    .bind(cart_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match status {
                None => CoreError::CartNotFound(cart_id.to_string()).into(),
                Some(status) => CoreError::CartNotActive {
                    cart_id: cart_id.to_string(),
                    status,
                }
                .into(),
            });
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Inactivity sweep: flips active carts untouched since `cutoff` to
    /// abandoned. Returns the number of carts swept.
    pub async fn mark_abandoned(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE carts SET status = 'abandoned', updated_at = ?2
            WHERE status = 'active' AND updated_at <= ?1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Write-first guard for mutating cart operations.
///
/// The UPDATE both validates `status = 'active'` and takes the SQLite write
/// lock before any read in this transaction, so concurrent mutations of one
/// cart serialize cleanly.
async fn lock_active_cart(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cart_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let result =
        sqlx::query("UPDATE carts SET updated_at = ?2 WHERE id = ?1 AND status = 'active'")
            .bind(cart_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;

    if result.rows_affected() == 0 {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM carts WHERE id = ?1")
            .bind(cart_id)
            .fetch_optional(&mut **tx)
            .await?;

        return Err(match status {
            None => CoreError::CartNotFound(cart_id.to_string()).into(),
            Some(status) => CoreError::CartNotActive {
                cart_id: cart_id.to_string(),
                status,
            }
            .into(),
        });
    }

    Ok(())
}

/// On-hand availability check for cart mutations (reservations not counted).
async fn check_on_hand(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    product_id: &str,
    sku: &str,
    requested: i64,
) -> DbResult<()> {
    let on_hand: Option<i64> =
        sqlx::query_scalar("SELECT quantity FROM inventory WHERE product_id = ?1 AND is_active = 1")
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?;

    let on_hand = on_hand
        .ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()))
        .map_err(DbError::from)?;

    if requested > on_hand {
        return Err(CoreError::InsufficientStock {
            sku: sku.to_string(),
            available: on_hand,
            requested,
        }
        .into());
    }

    Ok(())
}

async fn fetch_item(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cart_id: &str,
    sku: &str,
) -> DbResult<Option<CartItem>> {
    let item = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE cart_id = ?1 AND sku = ?2",
    )
    .bind(cart_id)
    .bind(sku)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(item)
}

async fn fetch_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cart_id: &str,
) -> DbResult<Vec<CartItem>> {
    let items = sqlx::query_as::<_, CartItem>(
        "SELECT * FROM cart_items WHERE cart_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(cart_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(items)
}

/// The single totals recompute at the end of every mutating operation.
async fn recompute_totals(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cart_id: &str,
    now: DateTime<Utc>,
) -> DbResult<()> {
    let items = fetch_items(tx, cart_id).await?;
    let totals = recompute_cart(&items, 0);

    sqlx::query(
        r#"
        UPDATE carts SET
            subtotal_cents = ?2,
            discount_total_cents = ?3,
            tax_total_cents = ?4,
            shipping_total_cents = ?5,
            grand_total_cents = ?6,
            updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(cart_id)
    .bind(totals.subtotal_cents)
    .bind(totals.discount_total_cents)
    .bind(totals.tax_total_cents)
    .bind(totals.shipping_total_cents)
    .bind(totals.grand_total_cents)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use vend_core::CartStatus;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        // Stock fixtures shared by most cart tests.
        db.inventory().create("p-towel", "TOWEL-001", 10, 2, None).await.unwrap();
        db.inventory().create("p-soap", "SOAP-010", 3, 1, None).await.unwrap();
        db
    }

    fn towel(qty: i64) -> NewCartItem {
        NewCartItem {
            product_id: "p-towel".into(),
            sku: "TOWEL-001".into(),
            qty,
            unit_price_cents: 2599,
        }
    }

    fn soap(qty: i64) -> NewCartItem {
        NewCartItem {
            product_id: "p-soap".into(),
            sku: "SOAP-010".into(),
            qty,
            unit_price_cents: 450,
        }
    }

    #[tokio::test]
    async fn test_create_or_get_is_stable_per_identity() {
        let db = test_db().await;
        let repo = db.carts();
        let owner = CartOwner::User("u1".into());

        let first = repo.create_or_get(&owner, "USD").await.unwrap();
        let second = repo.create_or_get(&owner, "USD").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.status, CartStatus::Active);
    }

    #[tokio::test]
    async fn test_user_and_guest_carts_are_distinct() {
        let db = test_db().await;
        let repo = db.carts();

        let user_cart = repo
            .create_or_get(&CartOwner::User("u1".into()), "USD")
            .await
            .unwrap();
        let guest_cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        assert_ne!(user_cart.id, guest_cart.id);
    }

    #[tokio::test]
    async fn test_add_item_merges_by_sku_and_recomputes() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        // TOWEL-001 qty 2 at $25.99 → line subtotal $51.98
        let item = repo.add_item(&cart.id, &towel(2)).await.unwrap();
        assert_eq!(item.line_subtotal_cents, 5198);

        // Adding 1 more merges to qty 3 → $77.97, one line only
        let merged = repo.add_item(&cart.id, &towel(1)).await.unwrap();
        assert_eq!(merged.qty, 3);
        assert_eq!(merged.line_subtotal_cents, 7797);

        let items = repo.items(&cart.id).await.unwrap();
        assert_eq!(items.len(), 1);

        let cart = repo.get(&cart.id).await.unwrap().unwrap();
        assert_eq!(cart.subtotal_cents, 7797);
        assert_eq!(cart.grand_total_cents, 7797);
    }

    #[tokio::test]
    async fn test_add_item_insufficient_stock() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        let err = repo.add_item(&cart.id, &soap(5)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 3, requested: 5, .. })
        ));

        // The combined quantity is what gets validated on merge.
        repo.add_item(&cart.id, &soap(2)).await.unwrap();
        let err = repo.add_item(&cart.id, &soap(2)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 3, requested: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_item_zero_removes_and_increase_revalidates() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();
        repo.add_item(&cart.id, &soap(2)).await.unwrap();

        // Increase beyond stock fails
        let err = repo.update_item(&cart.id, "SOAP-010", 4).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { .. })
        ));

        // Decrease always works
        repo.update_item(&cart.id, "SOAP-010", 1).await.unwrap();
        let cart_row = repo.get(&cart.id).await.unwrap().unwrap();
        assert_eq!(cart_row.subtotal_cents, 450);

        // Zero removes the row
        repo.update_item(&cart.id, "SOAP-010", 0).await.unwrap();
        assert!(repo.items(&cart.id).await.unwrap().is_empty());

        let cart_row = repo.get(&cart.id).await.unwrap().unwrap();
        assert_eq!(cart_row.grand_total_cents, 0);
    }

    #[tokio::test]
    async fn test_remove_missing_item_errors() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        let err = repo.remove_item(&cart.id, "GHOST-1").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::ItemNotFound { .. })));
    }

    #[tokio::test]
    async fn test_reprice_rewrites_snapshots() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();
        repo.add_item(&cart.id, &towel(2)).await.unwrap();

        let repriced = repo
            .reprice(&cart.id, &[("TOWEL-001".to_string(), 2999)])
            .await
            .unwrap();

        assert_eq!(repriced.subtotal_cents, 5998);
        let items = repo.items(&cart.id).await.unwrap();
        assert_eq!(items[0].unit_price_cents, 2999);
    }

    #[tokio::test]
    async fn test_merge_guest_into_user() {
        let db = test_db().await;
        let repo = db.carts();

        // User already has one towel line; guest has soap + towels.
        let user_cart = repo
            .create_or_get(&CartOwner::User("u1".into()), "USD")
            .await
            .unwrap();
        repo.add_item(&user_cart.id, &towel(1)).await.unwrap();

        let guest_cart = repo
            .create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();
        repo.add_item(&guest_cart.id, &soap(1)).await.unwrap();
        repo.add_item(&guest_cart.id, &towel(2)).await.unwrap();

        let merged = repo.merge("t1", "u1", "USD").await.unwrap();
        assert_eq!(merged.id, user_cart.id);

        let items = repo.items(&merged.id).await.unwrap();
        assert_eq!(items.len(), 2); // two distinct lines
        let towels = items.iter().find(|i| i.sku == "TOWEL-001").unwrap();
        assert_eq!(towels.qty, 3); // 1 + 2 summed

        // 3 × 2599 + 1 × 450
        assert_eq!(merged.subtotal_cents, 3 * 2599 + 450);

        // Guest cart is gone, not abandoned - its token can start fresh.
        assert!(repo
            .get_active_for(&CartOwner::Guest("t1".into()))
            .await
            .unwrap()
            .is_none());
        assert!(repo.get(&guest_cart.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_without_guest_cart_is_noop() {
        let db = test_db().await;
        let repo = db.carts();

        let merged = repo.merge("no-such-token", "u1", "USD").await.unwrap();
        assert!(repo.items(&merged.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_converted_cart_rejects_mutation() {
        let db = test_db().await;
        let repo = db.carts();
        let cart = repo
            .create_or_get(&CartOwner::User("u1".into()), "USD")
            .await
            .unwrap();
        repo.add_item(&cart.id, &towel(1)).await.unwrap();

        repo.mark_converted(&cart.id).await.unwrap();

        // Conversion clears the lines; the totals snapshot survives.
        assert!(repo.items(&cart.id).await.unwrap().is_empty());
        let converted = repo.get(&cart.id).await.unwrap().unwrap();
        assert_eq!(converted.subtotal_cents, 2599);

        let err = repo.add_item(&cart.id, &towel(1)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::CartNotActive { .. })
        ));

        // Terminal: converting twice fails too.
        assert!(repo.mark_converted(&cart.id).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_abandoned_sweeps_by_cutoff() {
        let db = test_db().await;
        let repo = db.carts();
        repo.create_or_get(&CartOwner::Guest("t1".into()), "USD")
            .await
            .unwrap();

        // Cutoff in the past sweeps nothing
        let swept = repo
            .mark_abandoned(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(swept, 0);

        // Cutoff now sweeps the idle cart
        let swept = repo.mark_abandoned(Utc::now()).await.unwrap();
        assert_eq!(swept, 1);

        assert!(repo
            .get_active_for(&CartOwner::Guest("t1".into()))
            .await
            .unwrap()
            .is_none());
    }
}
