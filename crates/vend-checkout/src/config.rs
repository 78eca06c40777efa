//! Checkout service configuration module.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults, so a bare deployment works out of the box.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration as StdDuration;

/// Checkout/cart lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// How long a checkout session (and its stock holds) lives, in seconds.
    pub checkout_ttl_secs: i64,

    /// Idle time after which an active cart is swept to abandoned, in days.
    pub cart_abandon_ttl_days: i64,

    /// Interval between sweep passes, in seconds.
    pub sweep_interval_secs: u64,

    /// Accepted ISO-4217 currency codes.
    pub currencies: Vec<String>,
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                     | Default         |
    /// |------------------------------|-----------------|
    /// | `VEND_CHECKOUT_TTL_SECS`     | `900` (15 min)  |
    /// | `VEND_CART_ABANDON_TTL_DAYS` | `60`            |
    /// | `VEND_SWEEP_INTERVAL_SECS`   | `60`            |
    /// | `VEND_CURRENCIES`            | `USD,EUR,GBP`   |
    pub fn load() -> Result<Self, ConfigError> {
        let config = CheckoutConfig {
            checkout_ttl_secs: env::var("VEND_CHECKOUT_TTL_SECS")
                .unwrap_or_else(|_| "900".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VEND_CHECKOUT_TTL_SECS".to_string()))?,

            cart_abandon_ttl_days: env::var("VEND_CART_ABANDON_TTL_DAYS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VEND_CART_ABANDON_TTL_DAYS".to_string()))?,

            sweep_interval_secs: env::var("VEND_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("VEND_SWEEP_INTERVAL_SECS".to_string()))?,

            currencies: env::var("VEND_CURRENCIES")
                .unwrap_or_else(|_| vend_core::DEFAULT_CURRENCIES.join(","))
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        };

        if config.checkout_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "VEND_CHECKOUT_TTL_SECS".to_string(),
            ));
        }
        if config.currencies.is_empty() {
            return Err(ConfigError::InvalidValue("VEND_CURRENCIES".to_string()));
        }

        Ok(config)
    }

    /// Session TTL as a chrono Duration.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.checkout_ttl_secs)
    }

    /// Cart abandonment TTL as a chrono Duration.
    pub fn cart_abandon_ttl(&self) -> Duration {
        Duration::days(self.cart_abandon_ttl_days)
    }

    /// Sweep interval for tokio timers.
    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }

    /// The currency used when a caller doesn't specify one.
    pub fn default_currency(&self) -> &str {
        &self.currencies[0]
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        CheckoutConfig {
            checkout_ttl_secs: 900,
            cart_abandon_ttl_days: 60,
            sweep_interval_secs: 60,
            currencies: vend_core::DEFAULT_CURRENCIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CheckoutConfig::default();

        assert_eq!(config.checkout_ttl_secs, 900);
        assert_eq!(config.cart_abandon_ttl_days, 60);
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(config.default_currency(), "USD");
        assert_eq!(config.session_ttl(), Duration::minutes(15));
        assert_eq!(config.cart_abandon_ttl(), Duration::days(60));
    }
}
