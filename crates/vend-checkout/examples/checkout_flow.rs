//! End-to-end checkout walkthrough against an in-memory database.
//!
//! ```text
//! cargo run -p vend-checkout --example checkout_flow
//! ```
//!
//! Seeds inventory + catalog, builds a guest cart, opens a checkout session
//! (reserving stock), confirms the holds, completes the session, and prints
//! the resulting state at each step.

use std::sync::Arc;

use vend_checkout::{
    CartService, CatalogProduct, CheckoutConfig, CheckoutService, CreateSessionRequest,
    FlatRateTax, InMemoryCatalog, ProductStatus, Sweeper, TableRateShipping,
};
use vend_core::types::TaxRate;
use vend_core::{CartOwner, NewAddress};
use vend_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let db = Database::new(DbConfig::in_memory()).await?;

    // --- Seed stock and catalog --------------------------------------------
    db.inventory()
        .create("p-towel", "TOWEL-001", 10, 3, Some("seed"))
        .await?;
    db.inventory()
        .create("p-soap", "SOAP-010", 25, 5, Some("seed"))
        .await?;

    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.upsert(CatalogProduct {
        id: "p-towel".into(),
        sku: "TOWEL-001".into(),
        price_cents: 2599,
        currency: "USD".into(),
        status: ProductStatus::Published,
        category_id: Some("bath".into()),
    });
    catalog.upsert(CatalogProduct {
        id: "p-soap".into(),
        sku: "SOAP-010".into(),
        price_cents: 450,
        currency: "USD".into(),
        status: ProductStatus::Published,
        category_id: Some("bath".into()),
    });

    let config = CheckoutConfig::load()?;
    let carts = CartService::new(db.clone(), catalog.clone(), config.clone());
    let checkout = CheckoutService::new(
        db.clone(),
        catalog,
        Arc::new(FlatRateTax::new(TaxRate::from_bps(825))),
        Arc::new(
            TableRateShipping::new()
                .with_rate("standard", "Standard (5-7 days)", 500, 50, None)
                .with_rate("express", "Express (1-2 days)", 1500, 100, Some(vec!["US".into()])),
        ),
        config.clone(),
    );

    // Keep stale holds from piling up while the process runs.
    let sweeper = Sweeper::new(db.clone(), config).spawn();

    // --- Build a guest cart ------------------------------------------------
    let owner = CartOwner::Guest("demo-token".into());
    let cart = carts.create_or_get(&owner, None).await?;
    carts.add_item(&cart.id, "TOWEL-001", 2).await?;
    carts.add_item(&cart.id, "SOAP-010", 3).await?;
    carts.add_item(&cart.id, "TOWEL-001", 1).await?; // merges to qty 3

    let (cart, items) = carts.cart_with_items(&owner).await?;
    println!("cart: {}", serde_json::to_string_pretty(&cart)?);
    println!("lines: {}", serde_json::to_string_pretty(&items)?);

    // --- Open the checkout session (reserves stock) ------------------------
    let summary = checkout
        .create_session(CreateSessionRequest {
            cart_id: cart.id.clone(),
            user_id: None,
            shipping_address: NewAddress {
                recipient: "Ada Lovelace".into(),
                line1: "12 Analytical Way".into(),
                line2: None,
                city: "Dallas".into(),
                region: Some("TX".into()),
                postal_code: "75001".into(),
                country: "US".into(),
            },
            billing_address: NewAddress {
                recipient: "Ada Lovelace".into(),
                line1: "12 Analytical Way".into(),
                line2: None,
                city: "Dallas".into(),
                region: Some("TX".into()),
                postal_code: "75001".into(),
                country: "US".into(),
            },
            shipping_method: "express".into(),
        })
        .await?;
    println!("session: {}", serde_json::to_string_pretty(&summary)?);

    let available = db
        .inventory()
        .available("p-towel", chrono::Utc::now())
        .await?;
    println!("TOWEL-001 available while held: {available}");

    // --- Payment succeeded: confirm holds, complete the session ------------
    checkout.confirm_reservations(&summary.checkout_id).await?;
    let session = checkout.complete_session(&summary.checkout_id).await?;
    println!("completed: {}", serde_json::to_string_pretty(&session)?);

    let status = db.inventory().stock_status("p-towel").await?;
    println!("TOWEL-001 after sale: {}", serde_json::to_string_pretty(&status)?);

    let history = db.inventory().history("p-towel", 1, 10).await?;
    println!(
        "ledger entries for TOWEL-001: {}",
        serde_json::to_string_pretty(&history.entries)?
    );

    sweeper.abort();
    Ok(())
}
