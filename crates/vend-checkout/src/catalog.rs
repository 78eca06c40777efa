//! Catalog collaborator interface.
//!
//! Products are owned by an external catalog service; this core only reads
//! id/sku/price/status through this trait. [`InMemoryCatalog`] is the bundled
//! implementation used by tests, demos, and single-process deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::ServiceError;

/// Publication state of a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Published,
    Draft,
    Archived,
}

/// The catalog's view of a product, as consumed by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub sku: String,
    /// Current price in minor units.
    pub price_cents: i64,
    pub currency: String,
    pub status: ProductStatus,
    pub category_id: Option<String>,
}

impl CatalogProduct {
    /// Only published products can be added to carts or checked out.
    #[inline]
    pub fn is_published(&self) -> bool {
        self.status == ProductStatus::Published
    }
}

/// Read-only product lookup against the external catalog.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Resolves a SKU to its catalog product, if it exists.
    async fn product_by_sku(&self, sku: &str) -> Result<Option<CatalogProduct>, ServiceError>;
}

/// In-process catalog backed by a map.
///
/// ## Usage
/// ```rust
/// use vend_checkout::catalog::{CatalogProduct, InMemoryCatalog, ProductStatus};
///
/// let catalog = InMemoryCatalog::new();
/// catalog.upsert(CatalogProduct {
///     id: "p-towel".into(),
///     sku: "TOWEL-001".into(),
///     price_cents: 2599,
///     currency: "USD".into(),
///     status: ProductStatus::Published,
///     category_id: None,
/// });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<String, CatalogProduct>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product, keyed by SKU.
    pub fn upsert(&self, product: CatalogProduct) {
        self.products
            .write()
            .expect("catalog lock poisoned")
            .insert(product.sku.clone(), product);
    }

    /// Updates a product's price, if present.
    pub fn set_price(&self, sku: &str, price_cents: i64) {
        if let Some(product) = self
            .products
            .write()
            .expect("catalog lock poisoned")
            .get_mut(sku)
        {
            product.price_cents = price_cents;
        }
    }

    /// Updates a product's status, if present.
    pub fn set_status(&self, sku: &str, status: ProductStatus) {
        if let Some(product) = self
            .products
            .write()
            .expect("catalog lock poisoned")
            .get_mut(sku)
        {
            product.status = status;
        }
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalog {
    async fn product_by_sku(&self, sku: &str) -> Result<Option<CatalogProduct>, ServiceError> {
        let products = self
            .products
            .read()
            .map_err(|_| ServiceError::Catalog("catalog lock poisoned".to_string()))?;

        Ok(products.get(sku).cloned())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
