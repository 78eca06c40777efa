//! # Validation Module
//!
//! Input validation utilities for Vend.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Service boundary (vend-checkout)                             │
//! │  ├── THIS MODULE: field formats, quantity bounds, addresses            │
//! │  └── Structured error codes back to the caller                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Business rules (repositories)                                │
//! │  ├── Stock availability guards                                         │
//! │  └── Status-transition guards                                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  ├── UNIQUE constraints                                                │
//! │  └── Foreign key constraints                                           │
//! │                                                                         │
//! │  Defense in depth: each layer catches a different class of error.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::NewAddress;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 50 characters
/// - Should contain only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use vend_core::validation::validate_sku;
///
/// assert!(validate_sku("TOWEL-001").is_ok());
/// assert!(validate_sku("").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates an ISO-4217 currency code against the configured set.
///
/// ## Rules
/// - Exactly 3 uppercase ASCII letters
/// - Must be a member of `supported`
pub fn validate_currency(code: &str, supported: &[String]) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "currency".to_string(),
            reason: "must be a 3-letter uppercase ISO-4217 code".to_string(),
        });
    }

    if !supported.iter().any(|s| s == code) {
        return Err(ValidationError::NotAllowed {
            field: "currency".to_string(),
            allowed: supported.to_vec(),
        });
    }

    Ok(())
}

/// Validates an ISO 3166-1 alpha-2 country code.
pub fn validate_country(code: &str) -> ValidationResult<()> {
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "country".to_string(),
        });
    }

    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "country".to_string(),
            reason: "must be a 2-letter uppercase ISO-3166 code".to_string(),
        });
    }

    Ok(())
}

/// Validates a postal code for the given country.
///
/// ## Formats
/// - `US`: 12345 or 12345-6789
/// - `CA`: A1A 1A1 (space optional)
/// - `GB`: outward + inward code, 5-8 characters
/// - `DE`/`FR`/`ES`/`IT`: 5 digits
/// - `NL`: 4 digits + 2 letters
/// - everywhere else: 3-12 non-blank characters
///
/// ## Example
/// ```rust
/// use vend_core::validation::validate_postal_code;
///
/// assert!(validate_postal_code("US", "75001").is_ok());
/// assert!(validate_postal_code("US", "75001-1234").is_ok());
/// assert!(validate_postal_code("US", "7500").is_err());
/// assert!(validate_postal_code("CA", "K1A 0B1").is_ok());
/// assert!(validate_postal_code("DE", "10115").is_ok());
/// ```
pub fn validate_postal_code(country: &str, code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "postal_code".to_string(),
        });
    }

    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "postal_code".to_string(),
        reason: reason.to_string(),
    };

    match country {
        "US" => {
            let (zip, plus4) = match code.split_once('-') {
                Some((zip, plus4)) => (zip, Some(plus4)),
                None => (code, None),
            };
            if zip.len() != 5 || !zip.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("US ZIP must be 5 digits"));
            }
            if let Some(plus4) = plus4 {
                if plus4.len() != 4 || !plus4.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("US ZIP+4 suffix must be 4 digits"));
                }
            }
        }
        "CA" => {
            let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
            let chars: Vec<char> = compact.chars().collect();
            let ok = chars.len() == 6
                && chars[0].is_ascii_alphabetic()
                && chars[1].is_ascii_digit()
                && chars[2].is_ascii_alphabetic()
                && chars[3].is_ascii_digit()
                && chars[4].is_ascii_alphabetic()
                && chars[5].is_ascii_digit();
            if !ok {
                return Err(invalid("Canadian postal code must match A1A 1A1"));
            }
        }
        "GB" => {
            let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
            if compact.len() < 5
                || compact.len() > 8
                || !compact.chars().all(|c| c.is_ascii_alphanumeric())
            {
                return Err(invalid("UK postcode must be 5-8 alphanumeric characters"));
            }
        }
        "DE" | "FR" | "ES" | "IT" => {
            if code.len() != 5 || !code.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid("postal code must be 5 digits"));
            }
        }
        "NL" => {
            let compact: String = code.chars().filter(|c| !c.is_whitespace()).collect();
            let chars: Vec<char> = compact.chars().collect();
            let ok = chars.len() == 6
                && chars[..4].iter().all(|c| c.is_ascii_digit())
                && chars[4..].iter().all(|c| c.is_ascii_alphabetic());
            if !ok {
                return Err(invalid("Dutch postal code must be 4 digits + 2 letters"));
            }
        }
        _ => {
            if code.len() < 3 || code.len() > 12 {
                return Err(invalid("postal code must be 3-12 characters"));
            }
        }
    }

    Ok(())
}

/// Validates a full address: required fields, country code, postal format.
///
/// ## Example
/// ```rust
/// use vend_core::types::NewAddress;
/// use vend_core::validation::validate_address;
///
/// let address = NewAddress {
///     recipient: "Ada Lovelace".into(),
///     line1: "12 Analytical Way".into(),
///     line2: None,
///     city: "Dallas".into(),
///     region: Some("TX".into()),
///     postal_code: "75001".into(),
///     country: "US".into(),
/// };
/// assert!(validate_address(&address).is_ok());
/// ```
pub fn validate_address(address: &NewAddress) -> ValidationResult<()> {
    let required = [
        ("recipient", &address.recipient),
        ("line1", &address.line1),
        ("city", &address.city),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
    }

    validate_country(&address.country)?;
    validate_postal_code(&address.country, &address.postal_code)?;

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in minor units.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> NewAddress {
        NewAddress {
            recipient: "Ada Lovelace".into(),
            line1: "12 Analytical Way".into(),
            line2: None,
            city: "Dallas".into(),
            region: Some("TX".into()),
            postal_code: "75001".into(),
            country: "US".into(),
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TOWEL-001").is_ok());
        assert!(validate_sku("ABC123").is_ok());
        assert!(validate_sku("product_1").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_currency() {
        let supported = vec!["USD".to_string(), "EUR".to_string()];

        assert!(validate_currency("USD", &supported).is_ok());
        assert!(validate_currency("usd", &supported).is_err());
        assert!(validate_currency("USDT", &supported).is_err());
        assert!(validate_currency("GBP", &supported).is_err()); // not in set
    }

    #[test]
    fn test_validate_country() {
        assert!(validate_country("US").is_ok());
        assert!(validate_country("GB").is_ok());
        assert!(validate_country("usa").is_err());
        assert!(validate_country("u").is_err());
        assert!(validate_country("").is_err());
    }

    #[test]
    fn test_validate_postal_code_us() {
        assert!(validate_postal_code("US", "75001").is_ok());
        assert!(validate_postal_code("US", "75001-1234").is_ok());
        assert!(validate_postal_code("US", "7500").is_err());
        assert!(validate_postal_code("US", "75001-12").is_err());
        assert!(validate_postal_code("US", "ABCDE").is_err());
    }

    #[test]
    fn test_validate_postal_code_ca_gb_nl() {
        assert!(validate_postal_code("CA", "K1A 0B1").is_ok());
        assert!(validate_postal_code("CA", "K1A0B1").is_ok());
        assert!(validate_postal_code("CA", "11111").is_err());

        assert!(validate_postal_code("GB", "SW1A 1AA").is_ok());
        assert!(validate_postal_code("GB", "X1").is_err());

        assert!(validate_postal_code("NL", "1234 AB").is_ok());
        assert!(validate_postal_code("NL", "12345").is_err());
    }

    #[test]
    fn test_validate_postal_code_fallback() {
        assert!(validate_postal_code("JP", "100-0001").is_ok());
        assert!(validate_postal_code("JP", "x").is_err());
        assert!(validate_postal_code("JP", "").is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address(&address()).is_ok());

        let mut missing_recipient = address();
        missing_recipient.recipient = " ".into();
        assert!(validate_address(&missing_recipient).is_err());

        let mut bad_country = address();
        bad_country.country = "USA".into();
        assert!(validate_address(&bad_country).is_err());

        let mut bad_postal = address();
        bad_postal.postal_code = "12".into();
        assert!(validate_address(&bad_postal).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(2599).is_ok());
        assert!(validate_price_cents(-100).is_err());
    }
}
