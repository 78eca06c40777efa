//! Tax collaborator interface.
//!
//! Real deployments point this trait at a tax provider; [`FlatRateTax`] is a
//! table-driven implementation (default rate + per-country overrides) good
//! enough for tests and single-region stores.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use vend_core::{CartItem, Money, NewAddress, TaxRate};

use crate::error::ServiceError;

/// Per-line tax amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLine {
    pub cart_item_id: String,
    pub sku: String,
    pub tax_cents: i64,
}

/// Result of a tax calculation: the total plus its per-line breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxQuote {
    pub tax_total_cents: i64,
    pub lines: Vec<TaxLine>,
}

/// Destination-based tax calculation.
#[async_trait]
pub trait TaxService: Send + Sync {
    /// Computes tax for the given destination and line items.
    async fn calculate(
        &self,
        destination: &NewAddress,
        items: &[CartItem],
        currency: &str,
    ) -> Result<TaxQuote, ServiceError>;
}

/// Flat basis-point tax with optional per-country overrides.
///
/// ## Example
/// ```rust
/// use vend_checkout::tax::FlatRateTax;
/// use vend_core::types::TaxRate;
///
/// // 8.25% default, 19% for Germany
/// let tax = FlatRateTax::new(TaxRate::from_bps(825))
///     .with_country("DE", TaxRate::from_bps(1900));
/// ```
#[derive(Debug, Clone)]
pub struct FlatRateTax {
    default_rate: TaxRate,
    country_rates: HashMap<String, TaxRate>,
}

impl FlatRateTax {
    /// Creates a calculator with one default rate.
    pub fn new(default_rate: TaxRate) -> Self {
        FlatRateTax {
            default_rate,
            country_rates: HashMap::new(),
        }
    }

    /// Overrides the rate for one destination country.
    pub fn with_country(mut self, country: &str, rate: TaxRate) -> Self {
        self.country_rates.insert(country.to_string(), rate);
        self
    }

    fn rate_for(&self, country: &str) -> TaxRate {
        self.country_rates
            .get(country)
            .copied()
            .unwrap_or(self.default_rate)
    }
}

#[async_trait]
impl TaxService for FlatRateTax {
    async fn calculate(
        &self,
        destination: &NewAddress,
        items: &[CartItem],
        _currency: &str,
    ) -> Result<TaxQuote, ServiceError> {
        let rate = self.rate_for(&destination.country);

        let mut lines = Vec::with_capacity(items.len());
        let mut tax_total_cents = 0;

        for item in items {
            // Discounts reduce the taxable base per line.
            let taxable = Money::from_cents(item.line_subtotal_cents - item.line_discount_cents);
            let tax = taxable.calculate_tax(rate);

            tax_total_cents += tax.cents();
            lines.push(TaxLine {
                cart_item_id: item.id.clone(),
                sku: item.sku.clone(),
                tax_cents: tax.cents(),
            });
        }

        Ok(TaxQuote {
            tax_total_cents,
            lines,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
