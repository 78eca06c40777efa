//! # Cart Totals
//!
//! Pure computation of line and cart totals.
//!
//! ## Recompute Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Totals Recompute Flow                                │
//! │                                                                         │
//! │  add_item / update_item / remove_item / reprice / merge                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  recompute_line() per touched row                                      │
//! │       │    line_subtotal = unit_price × qty                            │
//! │       │    line_total    = line_subtotal − line_discount + line_tax    │
//! │       ▼                                                                 │
//! │  recompute_cart() once, at the end, same transaction                   │
//! │            subtotal    = Σ line_subtotal                               │
//! │            grand_total = subtotal − discount + tax + shipping          │
//! │                                                                         │
//! │  ONE recompute per mutation - never scattered partial updates.         │
//! │  Running it twice on the same rows yields identical numbers.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::types::{Cart, CartItem};

/// Snapshot of all cart-level totals, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CartTotals {
    pub subtotal_cents: i64,
    pub discount_total_cents: i64,
    pub tax_total_cents: i64,
    pub shipping_total_cents: i64,
    pub grand_total_cents: i64,
}

/// Recomputes the derived fields of a single line item in place.
///
/// ## Example
/// ```rust
/// # use vend_core::cart::recompute_line;
/// # use vend_core::types::CartItem;
/// # use chrono::Utc;
/// let mut item = CartItem {
///     id: "i1".into(), cart_id: "c1".into(), product_id: "p1".into(),
///     sku: "TOWEL-001".into(), qty: 2, unit_price_cents: 2599,
///     line_subtotal_cents: 0, line_discount_cents: 0,
///     line_tax_cents: 0, line_total_cents: 0,
///     created_at: Utc::now(), updated_at: Utc::now(),
/// };
/// recompute_line(&mut item);
/// assert_eq!(item.line_subtotal_cents, 5198);
/// assert_eq!(item.line_total_cents, 5198);
/// ```
pub fn recompute_line(item: &mut CartItem) {
    item.line_subtotal_cents = item.unit_price_cents * item.qty;
    item.line_total_cents = item.line_subtotal_cents - item.line_discount_cents + item.line_tax_cents;
}

/// Computes cart-level totals from its line items.
///
/// `shipping_total_cents` is supplied by the caller (zero until a checkout
/// session picks a shipping method). Discount and tax roll up from the lines.
pub fn recompute_cart(items: &[CartItem], shipping_total_cents: i64) -> CartTotals {
    let subtotal_cents: i64 = items.iter().map(|i| i.line_subtotal_cents).sum();
    let discount_total_cents: i64 = items.iter().map(|i| i.line_discount_cents).sum();
    let tax_total_cents: i64 = items.iter().map(|i| i.line_tax_cents).sum();

    CartTotals {
        subtotal_cents,
        discount_total_cents,
        tax_total_cents,
        shipping_total_cents,
        grand_total_cents: subtotal_cents - discount_total_cents
            + tax_total_cents
            + shipping_total_cents,
    }
}

/// Writes a totals snapshot onto a cart struct.
pub fn apply_totals(cart: &mut Cart, totals: CartTotals) {
    cart.subtotal_cents = totals.subtotal_cents;
    cart.discount_total_cents = totals.discount_total_cents;
    cart.tax_total_cents = totals.tax_total_cents;
    cart.shipping_total_cents = totals.shipping_total_cents;
    cart.grand_total_cents = totals.grand_total_cents;
}

// =============================================================================
// Unit Tests
// =============================================================================
