//! # Error Types
//!
//! Domain-specific error types for vend-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  vend-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  vend-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  vend-checkout errors (separate crate)                                 │
//! │  └── ServiceError     - What callers see (stable codes)                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → caller             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, quantities)
//! 3. Errors are enum variants, never String
//! 4. `InsufficientStock` always names the offending SKU so callers can
//!    prompt a quantity adjustment instead of aborting the whole cart

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations or domain logic failures.
/// They should be caught and translated into structured codes at the service
/// boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product (or its inventory record) cannot be found.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but is soft-deleted / not published.
    #[error("Product is not available: {0}")]
    ProductUnavailable(String),

    /// Insufficient stock to add, reserve, or decrement.
    ///
    /// ## When This Occurs
    /// - Cart add/update exceeding on-hand quantity
    /// - `reserve_all` finding fewer available units than requested
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// A ledger delta would drive the on-hand quantity below zero.
    #[error("Stock for {product_id} cannot go negative: quantity {quantity}, delta {delta}")]
    NegativeStock {
        product_id: String,
        quantity: i64,
        delta: i64,
    },

    /// Cart not found (or not visible to the requesting identity).
    #[error("Cart not found: {0}")]
    CartNotFound(String),

    /// Cart is not in a state that allows the requested operation.
    #[error("Cart {cart_id} is {status}, cannot perform operation")]
    CartNotActive { cart_id: String, status: String },

    /// Line item not present in the cart.
    #[error("Cart {cart_id} has no line for sku {sku}")]
    ItemNotFound { cart_id: String, sku: String },

    /// Checkout requires at least one line item.
    #[error("Cart {0} is empty")]
    EmptyCart(String),

    /// Checkout session not found.
    #[error("Checkout not found: {0}")]
    CheckoutNotFound(String),

    /// Checkout session is past its TTL (or already swept to expired).
    ///
    /// Expiry is an expected terminal state, not an exceptional failure;
    /// callers should start a new checkout.
    #[error("Checkout {0} has expired")]
    CheckoutExpired(String),

    /// Checkout session already reached a terminal state.
    #[error("Checkout {checkout_id} is {status}, cannot perform operation")]
    CheckoutNotActive {
        checkout_id: String,
        status: String,
    },

    /// A reservation set is already live for this checkout.
    ///
    /// One hold per cart line per checkout attempt; a new attempt must wait
    /// for the existing holds to be confirmed or released.
    #[error("Checkout {checkout_id} already has live reservations")]
    AlreadyReserved { checkout_id: String },

    /// The requesting identity does not own the resource.
    ///
    /// Explicit by design requirement: foreign-checkout access must surface
    /// as a security violation, never as a silent not-found.
    #[error("Access denied to {resource} {id}")]
    AccessDenied { resource: String, id: String },

    /// Item/cart currency disagreement.
    #[error("Currency mismatch: cart is {expected}, product is {got}")]
    CurrencyMismatch { expected: String, got: String },

    /// Currency code outside the configured set.
    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// Selected shipping method does not serve the destination.
    #[error("Shipping method {method} is not available for {country}")]
    ShippingUnavailable { method: String, country: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., malformed postal code, bad country code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_stock_names_the_sku() {
        let err = CoreError::InsufficientStock {
            sku: "TOWEL-001".to_string(),
            available: 3,
            requested: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for TOWEL-001: available 3, requested 5"
        );
    }

    #[test]
    fn test_negative_stock_message() {
        let err = CoreError::NegativeStock {
            product_id: "p1".to_string(),
            quantity: 2,
            delta: -5,
        };
        assert_eq!(
            err.to_string(),
            "Stock for p1 cannot go negative: quantity 2, delta -5"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "postal_code".to_string(),
        };
        assert_eq!(err.to_string(), "postal_code is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "country".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
