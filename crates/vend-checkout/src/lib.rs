//! # vend-checkout: Cart & Checkout Services
//!
//! The orchestration layer of the Vend checkout/inventory core.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      vend-checkout Data Flow                            │
//! │                                                                         │
//! │  Caller (order service, API edge)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  vend-checkout (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   CartService ────────► CatalogService (trait)                 │   │
//! │  │   CheckoutService ────► TaxService / ShippingService (traits)  │   │
//! │  │   Sweeper ────────────► invoked by an external scheduler       │   │
//! │  │                                                                 │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │                      vend-db (repositories)                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`cart_service`] - catalog-validated cart operations
//! - [`checkout_service`] - session creation, reservation confirm/release
//! - [`catalog`] / [`tax`] / [`shipping`] - collaborator traits + one
//!   table-driven implementation each
//! - [`sweep`] - expired-reservation and abandoned-cart sweeps
//! - [`config`] - environment-driven configuration with defaults
//! - [`error`] - unified service error with stable codes

pub mod cart_service;
pub mod catalog;
pub mod checkout_service;
pub mod config;
pub mod error;
pub mod shipping;
pub mod sweep;
pub mod tax;

pub use cart_service::CartService;
pub use catalog::{CatalogProduct, CatalogService, InMemoryCatalog, ProductStatus};
pub use checkout_service::{CheckoutService, CheckoutSummary, CreateSessionRequest};
pub use config::{CheckoutConfig, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use shipping::{ShippingMethod, ShippingService, TableRateShipping};
pub use sweep::{SweepReport, Sweeper};
pub use tax::{FlatRateTax, TaxQuote, TaxService};
