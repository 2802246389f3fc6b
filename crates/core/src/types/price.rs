//! Type-safe price representation using decimal arithmetic.
//!
//! Catalog backends deliver prices as display strings (`"$9.99"`,
//! `"&#36;1,299.00"`, `"$10.00 - $20.00"` for variable products). They are
//! parsed once, at the source boundary, into a fixed-point [`Price`]. All cart
//! arithmetic happens on [`Decimal`] and is rounded to currency precision only
//! when a total is presented.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of fractional digits used when presenting currency amounts.
pub const CURRENCY_DECIMALS: u32 = 2;

/// Errors produced when parsing a display price.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PriceParseError {
    /// The price string was empty after stripping markup.
    #[error("price is empty")]
    Empty,
    /// The numeric part could not be parsed as a decimal.
    #[error("invalid price: {0}")]
    Invalid(String),
}

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Unrounded `amount * quantity`.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Decimal {
        self.amount * Decimal::from(quantity)
    }

    /// Parse a price as rendered by the catalog backend.
    ///
    /// Accepts an optional currency symbol, HTML entities for the symbol and
    /// non-breaking spaces, and `,` thousands separators between groups of
    /// three digits. A range such as `"$10.00 - $20.00"` resolves to its lower
    /// bound.
    ///
    /// # Errors
    ///
    /// Returns [`PriceParseError`] if nothing numeric remains or the number is
    /// malformed. A comma that is not a thousands separator (`"9,99 €"`) is
    /// rejected rather than guessed at.
    pub fn parse_display(raw: &str) -> Result<Self, PriceParseError> {
        let decoded = decode_entities(raw);

        let lower_bound = decoded
            .split('-')
            .map(str::trim)
            .find(|part| !part.is_empty())
            .ok_or(PriceParseError::Empty)?;

        let currency_code = CurrencyCode::detect(lower_bound).unwrap_or_default();

        let number: String = lower_bound
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
            .collect();

        if !number.chars().any(|c| c.is_ascii_digit()) {
            return Err(PriceParseError::Invalid(raw.to_string()));
        }
        let digits =
            strip_grouping(&number).ok_or_else(|| PriceParseError::Invalid(raw.to_string()))?;

        let amount =
            Decimal::from_str(&digits).map_err(|_| PriceParseError::Invalid(raw.to_string()))?;

        Ok(Self::new(amount, currency_code))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.currency_code.symbol(),
            round_currency(self.amount)
        )
    }
}

/// Round an amount to currency precision (two decimals, half away from zero).
///
/// The result always carries exactly two fractional digits, so `10.5` becomes
/// `10.50`.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_DECIMALS, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_DECIMALS);
    rounded
}

/// Remove `,` thousands separators. `None` unless every group after the
/// first has exactly three digits and no comma follows the decimal point.
fn strip_grouping(number: &str) -> Option<String> {
    let (integer, fraction) = match number.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (number, None),
    };
    if fraction.is_some_and(|f| f.contains(',')) {
        return None;
    }

    let mut groups = integer.split(',');
    let mut digits = groups.next().unwrap_or_default().to_string();
    for group in groups {
        if digits.is_empty() || group.len() != 3 {
            return None;
        }
        digits.push_str(group);
    }
    if let Some(fraction) = fraction {
        digits.push('.');
        digits.push_str(fraction);
    }
    Some(digits)
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&#36;", "$")
        .replace("&#8364;", "€")
        .replace("&euro;", "€")
        .replace("&#163;", "£")
        .replace("&pound;", "£")
        .replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// ISO 4217 code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }

    fn detect(text: &str) -> Option<Self> {
        if text.contains("C$") || text.contains("CAD") {
            Some(Self::CAD)
        } else if text.contains("A$") || text.contains("AUD") {
            Some(Self::AUD)
        } else if text.contains('€') || text.contains("EUR") {
            Some(Self::EUR)
        } else if text.contains('£') || text.contains("GBP") {
            Some(Self::GBP)
        } else if text.contains('$') || text.contains("USD") {
            Some(Self::USD)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_dollar_price() {
        let price = Price::parse_display("$9.99").unwrap();
        assert_eq!(price.amount, dec("9.99"));
        assert_eq!(price.currency_code, CurrencyCode::USD);
    }

    #[test]
    fn test_parse_html_entity_and_thousands() {
        let price = Price::parse_display("&#36;1,299.00").unwrap();
        assert_eq!(price.amount, dec("1299.00"));
    }

    #[test]
    fn test_parse_range_takes_lower_bound() {
        let price = Price::parse_display("$10.00&nbsp;-&nbsp;$20.00").unwrap();
        assert_eq!(price.amount, dec("10.00"));
    }

    #[test]
    fn test_parse_detects_currency() {
        assert_eq!(
            Price::parse_display("£5").unwrap().currency_code,
            CurrencyCode::GBP
        );
        assert_eq!(
            Price::parse_display("&euro;7.50").unwrap().currency_code,
            CurrencyCode::EUR
        );
        assert_eq!(
            Price::parse_display("C$12.00").unwrap().currency_code,
            CurrencyCode::CAD
        );
    }

    #[test]
    fn test_parse_rejects_decimal_comma() {
        assert!(matches!(
            Price::parse_display("9,99 €"),
            Err(PriceParseError::Invalid(_))
        ));
        assert!(matches!(
            Price::parse_display("$1,29.00"),
            Err(PriceParseError::Invalid(_))
        ));
        assert!(Price::parse_display("$1.299,00").is_err());

        let grouped = Price::parse_display("€1,234,567").unwrap();
        assert_eq!(grouped.amount, Decimal::from(1_234_567));
        assert_eq!(grouped.currency_code, CurrencyCode::EUR);
    }

    #[test]
    fn test_parse_bare_number_defaults_to_usd() {
        let price = Price::parse_display("4.25").unwrap();
        assert_eq!(price.amount, dec("4.25"));
        assert_eq!(price.currency_code, CurrencyCode::USD);
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert_eq!(Price::parse_display("   "), Err(PriceParseError::Empty));
        assert!(matches!(
            Price::parse_display("call us"),
            Err(PriceParseError::Invalid(_))
        ));
        assert!(matches!(
            Price::parse_display("$1.2.3"),
            Err(PriceParseError::Invalid(_))
        ));
    }

    #[test]
    fn test_display_pads_to_two_decimals() {
        let price = Price::new(dec("10.5"), CurrencyCode::EUR);
        assert_eq!(price.to_string(), "€10.50");
    }

    #[test]
    fn test_round_currency_half_away_from_zero() {
        assert_eq!(round_currency(dec("2.005")), dec("2.01"));
        assert_eq!(round_currency(dec("0.999")).to_string(), "1.00");
        assert_eq!(round_currency(dec("29.97")).to_string(), "29.97");
    }

    #[test]
    fn test_times_is_unrounded() {
        let price = Price::new(dec("0.333"), CurrencyCode::USD);
        assert_eq!(price.times(3), dec("0.999"));
    }

    #[test]
    fn test_serde_amount_as_string() {
        let price = Price::new(dec("9.99"), CurrencyCode::USD);
        let json = serde_json::to_value(price).unwrap();
        assert_eq!(json["amount"], "9.99");
        assert_eq!(json["currencyCode"], "USD");

        let back: Price = serde_json::from_value(json).unwrap();
        assert_eq!(back, price);
    }
}
