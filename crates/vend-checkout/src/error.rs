//! # Service Error Type
//!
//! Unified error type for the service layer.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Vend                                   │
//! │                                                                         │
//! │  Caller                       Service Layer                             │
//! │  ──────                       ─────────────                             │
//! │                                                                         │
//! │  create_session(...)                                                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  CheckoutService                                                 │  │
//! │  │  Result<T, ServiceError>                                         │  │
//! │  │         │                                                        │  │
//! │  │  DbError::Domain(CoreError) ── unwrapped to the domain error ─┐ │  │
//! │  │  DbError (infrastructure)   ── kept as database failure ──────┤ │  │
//! │  │  Collaborator failures      ── catalog/tax/shipping variants ─┘ │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  err.code() = "insufficient_stock" │ message = human-readable           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers branch on `code()`, a stable snake_case string; the Display
//! message carries the context (sku, quantities, ids).

use thiserror::Error;

use vend_core::{CoreError, ValidationError};
use vend_db::DbError;

/// Service-layer error returned to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Business rule violation from the domain layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Infrastructure-level database failure.
    #[error(transparent)]
    Db(DbError),

    /// Checkout completion attempted before every hold was confirmed.
    #[error("Checkout {0} has unconfirmed reservations")]
    UnconfirmedReservations(String),

    /// Catalog collaborator failed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Tax collaborator failed.
    #[error("Tax calculation error: {0}")]
    Tax(String),

    /// Shipping collaborator failed.
    #[error("Shipping error: {0}")]
    Shipping(String),
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(CoreError::Validation(err))
    }
}

/// Domain errors travel through `DbError::Domain`; unwrap them so callers
/// always see the `Core` variant regardless of which layer raised it.
impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Domain(core) => ServiceError::Core(core),
            other => ServiceError::Db(other),
        }
    }
}

impl ServiceError {
    /// Stable machine-readable code for programmatic handling.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// match service.create_session(req).await {
    ///     Err(e) if e.code() == "insufficient_stock" => prompt_adjustment(e),
    ///     Err(e) => show_error(e),
    ///     Ok(summary) => proceed_to_payment(summary),
    /// }
    /// ```
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Core(core) => match core {
                CoreError::ProductNotFound(_)
                | CoreError::CartNotFound(_)
                | CoreError::CheckoutNotFound(_)
                | CoreError::ItemNotFound { .. } => "not_found",
                CoreError::ProductUnavailable(_) => "product_unavailable",
                CoreError::InsufficientStock { .. } => "insufficient_stock",
                CoreError::NegativeStock { .. } => "negative_stock",
                CoreError::EmptyCart(_) => "empty_cart",
                CoreError::CheckoutExpired(_) => "checkout_expired",
                CoreError::CartNotActive { .. }
                | CoreError::CheckoutNotActive { .. }
                | CoreError::AlreadyReserved { .. }
                | CoreError::CurrencyMismatch { .. } => "conflict",
                CoreError::AccessDenied { .. } => "access_denied",
                CoreError::UnsupportedCurrency(_) => "unsupported_currency",
                CoreError::ShippingUnavailable { .. } => "shipping_unavailable",
                CoreError::Validation(validation) => validation_code(validation),
            },
            ServiceError::Db(_) => "database_error",
            ServiceError::UnconfirmedReservations(_) => "conflict",
            ServiceError::Catalog(_) => "catalog_error",
            ServiceError::Tax(_) => "tax_error",
            ServiceError::Shipping(_) => "shipping_error",
        }
    }
}

/// Address problems get their own codes so checkout UIs can highlight the
/// right field; everything else is generic validation.
fn validation_code(err: &ValidationError) -> &'static str {
    let field = match err {
        ValidationError::Required { field }
        | ValidationError::TooLong { field, .. }
        | ValidationError::OutOfRange { field, .. }
        | ValidationError::MustBePositive { field }
        | ValidationError::InvalidFormat { field, .. }
        | ValidationError::NotAllowed { field, .. } => field.as_str(),
    };

    match field {
        "postal_code" => "invalid_postal_code",
        "country" | "recipient" | "line1" | "city" => "invalid_address",
        _ => "validation",
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Unit Tests
// =============================================================================
