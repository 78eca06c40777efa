//! # Domain Types
//!
//! Core domain types for the Vend inventory/checkout subsystem.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │ InventoryRecord │   │      Cart       │   │  CheckoutSession    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  product_id     │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  quantity       │   │  user|token     │   │  cart_id (FK)       │   │
//! │  │  low_stock_…    │   │  totals         │   │  stock_reserved     │   │
//! │  └────────┬────────┘   └────────┬────────┘   └──────────┬──────────┘   │
//! │           │                     │                       │              │
//! │  ┌────────▼────────┐   ┌────────▼────────┐   ┌──────────▼──────────┐   │
//! │  │ StockLedgerEntry│   │    CartItem     │   │InventoryReservation │   │
//! │  │  append-only    │   │  (cart_id, sku) │   │ (checkout_id,       │   │
//! │  │  delta + reason │   │  UNIQUE         │   │  cart_item_id) UNIQ │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID where one exists: (sku, cart_token, etc.)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25% (e.g., Texas sales tax)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Reason code attached to every stock ledger entry.
///
/// Closed set: persistence rejects anything outside these variants, so the
/// audit trail can be aggregated without string matching.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// First entry when a product's inventory record is seeded.
    Initial,
    /// Operator correction from the back office.
    ManualAdjust,
    /// Confirmed checkout hold becoming a permanent decrement.
    OrderHold,
    /// Previously committed stock returned to the pool (order cancelled).
    OrderRelease,
    /// Customer return restocked.
    Return,
    /// Physical stock count correction.
    Recount,
}

/// Current on-hand stock for one product.
///
/// ## Invariants
/// - `quantity` never goes negative; the guarded ledger write is the only
///   mutation path.
/// - `quantity` always equals the sum of this product's ledger deltas.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// Product this record belongs to (one record per product).
    pub product_id: String,

    /// Stock Keeping Unit - business identifier, mirrors the catalog.
    pub sku: String,

    /// Current on-hand quantity. Active reservations are NOT subtracted here;
    /// availability is `quantity - active holds` computed at read time.
    pub quantity: i64,

    /// Threshold at or below which the product counts as low-stock.
    pub low_stock_threshold: i64,

    /// Soft-delete mirror of the catalog's product status.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Whether any stock is on hand.
    #[inline]
    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }

    /// Whether the record is in the low-stock band (0 < qty <= threshold).
    #[inline]
    pub fn low_stock(&self) -> bool {
        self.quantity > 0 && self.quantity <= self.low_stock_threshold
    }

    /// Read-model summary for callers.
    pub fn status(&self) -> StockStatus {
        StockStatus {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            in_stock: self.in_stock(),
            low_stock: self.low_stock(),
        }
    }
}

/// Stock status read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockStatus {
    pub product_id: String,
    pub quantity: i64,
    pub in_stock: bool,
    pub low_stock: bool,
}

/// One immutable stock movement.
///
/// Append-only: rows are never updated or deleted after creation. The rowid
/// ordering of entries for a product is the canonical application order.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLedgerEntry {
    pub id: String,
    pub product_id: String,
    /// Signed quantity change (+restock, -sale/hold confirmation).
    pub delta: i64,
    pub reason: LedgerReason,
    pub note: Option<String>,
    /// Actor that caused the movement (operator id, service name).
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Cart
// =============================================================================

/// The lifecycle of a cart.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Open for mutation.
    Active,
    /// An order was placed from this cart.
    Converted,
    /// Swept after the inactivity TTL.
    Abandoned,
}

impl Default for CartStatus {
    fn default() -> Self {
        CartStatus::Active
    }
}

/// Identity that owns a cart: a registered user or an anonymous guest token.
///
/// Exactly one of the two underlying columns is set on any cart row; the
/// database enforces the XOR with a CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    User(String),
    Guest(String),
}

impl CartOwner {
    /// The user_id column value for this owner.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            CartOwner::User(id) => Some(id),
            CartOwner::Guest(_) => None,
        }
    }

    /// The cart_token column value for this owner.
    pub fn cart_token(&self) -> Option<&str> {
        match self {
            CartOwner::User(_) => None,
            CartOwner::Guest(token) => Some(token),
        }
    }
}

/// A shopping cart.
///
/// ## Invariants
/// - Exactly one of `user_id` / `cart_token` is set.
/// - `grand_total = subtotal - discount_total + tax_total + shipping_total`,
///   all components >= 0.
/// - Totals are recomputed exactly once at the end of every mutating
///   operation, inside the same transaction as the mutation.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: String,
    /// Registered owner; mutually exclusive with `cart_token`.
    pub user_id: Option<String>,
    /// Anonymous owner token; mutually exclusive with `user_id`.
    pub cart_token: Option<String>,
    /// ISO-4217 currency code for every amount in this cart.
    pub currency: String,
    pub status: CartStatus,
    pub subtotal_cents: i64,
    pub discount_total_cents: i64,
    pub tax_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Whether this cart can still be mutated.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == CartStatus::Active
    }

    /// The owning identity.
    pub fn owner(&self) -> CartOwner {
        match (&self.user_id, &self.cart_token) {
            (Some(user), _) => CartOwner::User(user.clone()),
            (None, Some(token)) => CartOwner::Guest(token.clone()),
            // Unreachable for persisted rows: the schema CHECK enforces XOR.
            (None, None) => CartOwner::Guest(String::new()),
        }
    }

    /// Grand total as Money.
    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }
}

/// A line item in a cart.
/// Uses the snapshot pattern: the unit price is frozen at add-time.
///
/// ## Invariants
/// - `(cart_id, sku)` unique: adding an existing sku merges by summing qty.
/// - `qty >= 1`; setting 0 removes the row.
/// - `line_total = line_subtotal - line_discount + line_tax`.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub cart_id: String,
    pub product_id: String,
    /// SKU at time of adding (frozen).
    pub sku: String,
    /// Quantity in cart.
    pub qty: i64,
    /// Unit price in cents at time of adding (frozen until reprice).
    pub unit_price_cents: i64,
    /// unit_price × qty.
    pub line_subtotal_cents: i64,
    /// Discount applied to this line.
    pub line_discount_cents: i64,
    /// Tax for this line.
    pub line_tax_cents: i64,
    /// line_subtotal - line_discount + line_tax.
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

// =============================================================================
// Address
// =============================================================================

/// Which role an address row plays on a checkout.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Shipping,
    Billing,
}

/// A postal address.
///
/// Immutable once referenced by a checkout session: edits create a new row so
/// completed checkouts keep the address they shipped to.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    pub kind: AddressKind,
    /// Person or company receiving the shipment.
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    /// State / province / region, free-form.
    pub region: Option<String>,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2, uppercase.
    pub country: String,
    pub created_at: DateTime<Utc>,
}

/// Address fields as supplied by a caller, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAddress {
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

// =============================================================================
// Checkout Session
// =============================================================================

/// The lifecycle of a checkout session.
///
/// ```text
/// active ──► completed   (order placed, reservations confirmed)
///   │
///   ├─────► failed      (validation/stock/payment failure)
///   │
///   └─────► expired     (TTL elapsed; holds released by the sweep)
/// ```
/// All three right-hand states are terminal: guarded UPDATEs refuse to touch
/// a session that has left `active`.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Active,
    Completed,
    Failed,
    Expired,
}

impl CheckoutStatus {
    /// Terminal states admit no further transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckoutStatus::Active)
    }
}

/// The transactional envelope from address capture to stock commitment.
///
/// ## Invariants
/// - `stock_reserved` is true only while every reservation for this session
///   is `active` or `confirmed`.
/// - `expires_at` bounds the reservation hold; a session read past this
///   instant is expired regardless of whether the sweep has run.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub cart_id: String,
    /// Owner for access checks; None for guest checkouts.
    pub user_id: Option<String>,
    pub shipping_address_id: String,
    pub billing_address_id: String,
    pub shipping_method: String,
    pub currency: String,
    pub tax_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
    pub stock_reserved: bool,
    pub status: CheckoutStatus,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    /// Whether the session is past its TTL at `now` (or already swept).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckoutStatus::Expired
            || (self.status == CheckoutStatus::Active && self.expires_at <= now)
    }

    /// Whether the session still accepts mutations at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == CheckoutStatus::Active && self.expires_at > now
    }

    /// Grand total as Money.
    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }
}

// =============================================================================
// Inventory Reservation
// =============================================================================

/// The lifecycle of one reservation (a time-bound soft hold).
///
/// ```text
/// active ──► confirmed   (ledger decremented; hold became permanent)
///   │
///   └─────► released    (cancelled, failed, or expired; stock returns)
/// ```
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Released,
}

impl ReservationStatus {
    /// Only `active` rows participate in availability math or transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

/// A hold on available stock for one cart line during checkout.
///
/// ## Invariants
/// - `(checkout_id, cart_item_id)` unique: one hold per line per attempt.
/// - While `active` and unexpired, `quantity` counts against availability
///   even though the ledger has not moved yet.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReservation {
    pub id: String,
    pub checkout_id: String,
    pub cart_item_id: String,
    pub product_id: String,
    pub sku: String,
    pub quantity: i64,
    pub status: ReservationStatus,
    /// Mirrors the checkout session's expiry.
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    /// Why the hold was released ("expired", "cancelled", ...).
    pub release_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Whether this hold still counts against available stock at `now`.
    pub fn holds_stock(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && self.expires_at > now
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
