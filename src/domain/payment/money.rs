//! Monetary amounts in minor units.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// ISO 4217 currency code, normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not a three-letter ISO code", code),
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form expected by Stripe.
    pub fn to_lowercase(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Number of decimal places in the major unit.
    pub fn exponent(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "HUF" | "TWD" => 0,
            _ => 2,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of money in the smallest unit of its currency (cents for USD).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl Money {
    /// Creates a strictly positive amount.
    pub fn new(amount_minor: i64, currency: Currency) -> Result<Self, ValidationError> {
        if amount_minor <= 0 {
            return Err(ValidationError::not_positive("amount", amount_minor));
        }
        Ok(Self {
            amount_minor,
            currency,
        })
    }

    /// Renders the amount as a decimal string, e.g. `"100.00"` or `"500"` for JPY.
    pub fn to_decimal_string(&self) -> String {
        format_minor(self.amount_minor, self.currency.exponent())
    }

    /// Parses a provider decimal string such as `"49.5"` back into minor units.
    pub fn parse_decimal(value: &str, currency: Currency) -> Result<Self, ValidationError> {
        let minor = parse_minor(value, currency.exponent())?;
        Money::new(minor, currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), self.currency)
    }
}

fn format_minor(amount: i64, exponent: u32) -> String {
    if exponent == 0 {
        return amount.to_string();
    }
    let scale = 10_i64.pow(exponent);
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / scale as u64,
        abs % scale as u64,
        width = exponent as usize
    )
}

fn parse_minor(value: &str, exponent: u32) -> Result<i64, ValidationError> {
    let invalid = || {
        ValidationError::invalid_format("amount", format!("'{}' is not a decimal amount", value))
    };
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };
    if whole.is_empty()
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > exponent as usize
    {
        return Err(invalid());
    }
    let scale = 10_i64.pow(exponent);
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let padded = format!("{:0<width$}", fraction, width = exponent as usize);
    let fraction: i64 = if padded.is_empty() {
        0
    } else {
        padded.parse().map_err(|_| invalid())?
    };
    whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> Currency {
        Currency::new("usd").unwrap()
    }

    #[test]
    fn currency_is_normalised_to_upper_case() {
        assert_eq!(usd().as_str(), "USD");
        assert_eq!(usd().to_lowercase(), "usd");
    }

    #[test]
    fn currency_rejects_non_iso_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("U$D").is_err());
    }

    #[test]
    fn money_rejects_zero_and_negative() {
        assert!(Money::new(0, usd()).is_err());
        assert!(Money::new(-100, usd()).is_err());
    }

    #[test]
    fn decimal_string_uses_currency_exponent() {
        assert_eq!(Money::new(10_000, usd()).unwrap().to_decimal_string(), "100.00");
        assert_eq!(Money::new(5, usd()).unwrap().to_decimal_string(), "0.05");
        let yen = Currency::new("JPY").unwrap();
        assert_eq!(Money::new(500, yen).unwrap().to_decimal_string(), "500");
    }

    #[test]
    fn parse_decimal_handles_short_fractions() {
        assert_eq!(Money::parse_decimal("49.5", usd()).unwrap().amount_minor, 4_950);
        assert_eq!(Money::parse_decimal("100", usd()).unwrap().amount_minor, 10_000);
        assert_eq!(Money::parse_decimal("100.00", usd()).unwrap().amount_minor, 10_000);
    }

    #[test]
    fn parse_decimal_rejects_excess_precision_and_garbage() {
        assert!(Money::parse_decimal("1.005", usd()).is_err());
        assert!(Money::parse_decimal("ten", usd()).is_err());
        assert!(Money::parse_decimal(".50", usd()).is_err());
    }

    #[test]
    fn display_includes_currency() {
        assert_eq!(Money::new(2_599, usd()).unwrap().to_string(), "25.99 USD");
    }
}
