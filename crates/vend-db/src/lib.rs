//! # vend-db: Database Layer for Vend
//!
//! This crate provides database access for the Vend checkout/inventory core.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Vend Data Flow                                 │
//! │                                                                         │
//! │  Service call (CheckoutService::create_session)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      vend-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ inventory.rs  │    │  (embedded)  │  │   │
//! │  │   │               │    │ cart.rs       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ reservation.rs│    │ 001_init.sql │  │   │
//! │  │   │ WAL + busy    │    │ checkout.rs   │    │              │  │   │
//! │  │   │ timeout       │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │                        SQLite Database                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! Correctness under concurrent checkouts comes from the database, not from
//! in-process locks:
//!
//! - Every check-then-write sequence runs inside one transaction whose FIRST
//!   statement is a write, so the SQLite write lock is held for the whole
//!   sequence (the `SELECT ... FOR UPDATE` equivalent on this engine).
//! - Availability checks are embedded in the write statement itself
//!   (`INSERT ... SELECT ... WHERE available >= qty`), making the
//!   compare-and-reserve a single atomic statement.
//! - WAL mode + busy_timeout turn writer contention into bounded waiting.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (inventory, cart, etc.)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vend_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/vend.db");
//! let db = Database::new(config).await?;
//!
//! let status = db.inventory().stock_status("product-id").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::DbError;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cart::CartRepository;
pub use repository::checkout::CheckoutRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::reservation::ReservationRepository;
