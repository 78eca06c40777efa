//! Shipping collaborator interface.
//!
//! [`TableRateShipping`] implements the trait with a rate table: base cost
//! plus per-item cost, each method optionally restricted to a country
//! allow-list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use vend_core::{CartItem, CoreError, NewAddress};

use crate::error::ServiceError;

/// A shipping method offered to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingMethod {
    /// Stable identifier stored on the checkout session ("standard", ...).
    pub code: String,
    /// Human-readable label for checkout UIs.
    pub label: String,
}

/// Method availability and cost calculation for a destination.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Methods that can serve the destination, in display order.
    async fn available_methods(
        &self,
        destination: &NewAddress,
        items: &[CartItem],
    ) -> Result<Vec<ShippingMethod>, ServiceError>;

    /// Cost of one method for the destination, in minor units.
    ///
    /// ## Errors
    /// * `CoreError::ShippingUnavailable` - unknown method or unserved country
    async fn cost(
        &self,
        destination: &NewAddress,
        items: &[CartItem],
        method_code: &str,
        currency: &str,
    ) -> Result<i64, ServiceError>;
}

/// One row of the rate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingRate {
    pub method: ShippingMethod,
    pub base_cents: i64,
    pub per_item_cents: i64,
    /// None serves every country; Some restricts to the listed ISO-2 codes.
    pub countries: Option<Vec<String>>,
}

impl ShippingRate {
    fn serves(&self, country: &str) -> bool {
        match &self.countries {
            None => true,
            Some(countries) => countries.iter().any(|c| c == country),
        }
    }
}

/// Table-driven shipping rates.
///
/// ## Example
/// ```rust
/// use vend_checkout::shipping::TableRateShipping;
///
/// let shipping = TableRateShipping::new()
///     .with_rate("standard", "Standard (5-7 days)", 500, 50, None)
///     .with_rate("express", "Express (1-2 days)", 1500, 100, Some(vec!["US".into()]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableRateShipping {
    rates: Vec<ShippingRate>,
}

impl TableRateShipping {
    /// Creates an empty rate table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one rate row.
    pub fn with_rate(
        mut self,
        code: &str,
        label: &str,
        base_cents: i64,
        per_item_cents: i64,
        countries: Option<Vec<String>>,
    ) -> Self {
        self.rates.push(ShippingRate {
            method: ShippingMethod {
                code: code.to_string(),
                label: label.to_string(),
            },
            base_cents,
            per_item_cents,
            countries,
        });
        self
    }
}

#[async_trait]
impl ShippingService for TableRateShipping {
    async fn available_methods(
        &self,
        destination: &NewAddress,
        _items: &[CartItem],
    ) -> Result<Vec<ShippingMethod>, ServiceError> {
        Ok(self
            .rates
            .iter()
            .filter(|rate| rate.serves(&destination.country))
            .map(|rate| rate.method.clone())
            .collect())
    }

    async fn cost(
        &self,
        destination: &NewAddress,
        items: &[CartItem],
        method_code: &str,
        _currency: &str,
    ) -> Result<i64, ServiceError> {
        let rate = self
            .rates
            .iter()
            .find(|rate| rate.method.code == method_code && rate.serves(&destination.country))
            .ok_or_else(|| {
                ServiceError::Core(CoreError::ShippingUnavailable {
                    method: method_code.to_string(),
                    country: destination.country.clone(),
                })
            })?;

        let total_items: i64 = items.iter().map(|i| i.qty).sum();
        Ok(rate.base_cents + rate.per_item_cents * total_items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn destination(country: &str) -> NewAddress {
        NewAddress {
            recipient: "Ada Lovelace".into(),
            line1: "12 Analytical Way".into(),
            line2: None,
            city: "Dallas".into(),
            region: Some("TX".into()),
            postal_code: "75001".into(),
            country: country.into(),
        }
    }

    fn item(qty: i64) -> CartItem {
        let now = Utc::now();
        CartItem {
            id: "item-1".into(),
            cart_id: "cart-1".into(),
            product_id: "prod-1".into(),
            sku: "TOWEL-001".into(),
            qty,
            unit_price_cents: 2599,
            line_subtotal_cents: 2599 * qty,
            line_discount_cents: 0,
            line_tax_cents: 0,
            line_total_cents: 2599 * qty,
            created_at: now,
            updated_at: now,
        }
    }

    fn table() -> TableRateShipping {
        TableRateShipping::new()
            .with_rate("standard", "Standard (5-7 days)", 500, 50, None)
            .with_rate(
                "express",
                "Express (1-2 days)",
                1500,
                100,
                Some(vec!["US".into()]),
            )
    }

    #[tokio::test]
    async fn test_availability_respects_country_list() {
        let shipping = table();

        let us = shipping
            .available_methods(&destination("US"), &[item(1)])
            .await
            .unwrap();
        assert_eq!(us.len(), 2);

        let de = shipping
            .available_methods(&destination("DE"), &[item(1)])
            .await
            .unwrap();
        assert_eq!(de.len(), 1);
        assert_eq!(de[0].code, "standard");
    }

    #[tokio::test]
    async fn test_cost_is_base_plus_per_item() {
        let shipping = table();

        let cost = shipping
            .cost(&destination("US"), &[item(3)], "standard", "USD")
            .await
            .unwrap();
        assert_eq!(cost, 500 + 3 * 50);
    }

    #[tokio::test]
    async fn test_unserved_country_is_unavailable() {
        let shipping = table();

        let err = shipping
            .cost(&destination("DE"), &[item(1)], "express", "EUR")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::ShippingUnavailable { .. })
        ));
        assert_eq!(err.code(), "shipping_unavailable");
    }
}
