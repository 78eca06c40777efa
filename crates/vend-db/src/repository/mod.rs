//! # Repository Module
//!
//! Database repository implementations for Vend.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Service call                                                          │
//! │       │                                                                 │
//! │       │  db.reservations().reserve_all(checkout_id, lines, expiry)     │
//! │       ▼                                                                 │
//! │  ReservationRepository                                                 │
//! │  ├── reserve_all(&self, ...)        all-or-nothing transaction         │
//! │  ├── confirm_all(&self, ...)        holds → ledger decrements          │
//! │  ├── release_all(&self, ...)        idempotent release                 │
//! │  └── release_expired(&self, now)    the sweep                          │
//! │       │                                                                 │
//! │       │  SQL (guards embedded in write statements)                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • SQL is isolated in one place                                        │
//! │  • Transaction boundaries are explicit                                 │
//! │  • Status machines live next to their guarded UPDATEs                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`inventory::InventoryRepository`] - Stock ledger + on-hand record
//! - [`cart::CartRepository`] - Carts and line items
//! - [`reservation::ReservationRepository`] - Time-bound stock holds
//! - [`checkout::CheckoutRepository`] - Checkout session lifecycle

pub mod cart;
pub mod checkout;
pub mod inventory;
pub mod reservation;
