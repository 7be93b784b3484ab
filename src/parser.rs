//! Money parsing with decimal-place canonicalization.
//!
//! Amounts are normalized as text before they ever become numbers, so no
//! binary floating point is involved at any stage:
//!
//! - missing decimal places are padded with zeros (`1.1` -> `1.10`)
//! - surplus trailing zeros are stripped (`1.700` -> `1.70`)
//! - surplus non-zero digits are rejected (`1.321` at 2 places)

use crate::currency::CurrencyRegistry;
use crate::error::{Error, ParseError, ParseErrorKind, Result};
use crate::money::Money;
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::sync::Arc;

const ZEROS: &str = "0000000000";

/// The maximum number of decimal places a parser can be configured with.
pub const MAX_DECIMAL_PLACES: u32 = ZEROS.len() as u32;

/// Parses `"<CUR> <amount>"` text into [`Money`].
///
/// Every parsed amount carries exactly the configured number of decimal
/// places.
#[derive(Debug, Clone)]
pub struct MoneyParser {
    registry: Arc<CurrencyRegistry>,
    decimal_places: u32,
}

impl MoneyParser {
    /// Creates a parser producing amounts with `decimal_places` digits after
    /// the decimal point.
    ///
    /// Fails if `decimal_places` exceeds [`MAX_DECIMAL_PLACES`].
    pub fn new(registry: Arc<CurrencyRegistry>, decimal_places: u32) -> Result<Self> {
        check_decimal_places(decimal_places)?;
        Ok(MoneyParser {
            registry,
            decimal_places,
        })
    }

    pub fn decimal_places(&self) -> u32 {
        self.decimal_places
    }

    pub fn set_decimal_places(&mut self, decimal_places: u32) -> Result<()> {
        check_decimal_places(decimal_places)?;
        self.decimal_places = decimal_places;
        Ok(())
    }

    pub fn registry(&self) -> &Arc<CurrencyRegistry> {
        &self.registry
    }

    /// Parses a whole line, splitting currency and amount on the first space.
    pub fn parse_line(&self, line: &str) -> std::result::Result<Money, ParseError> {
        let (currency, amount) = line
            .split_once(' ')
            .ok_or(ParseError::new(ParseErrorKind::InvalidLineFormat))?;

        self.parse(currency, amount)
    }

    /// Parses a currency code and an amount. Surrounding whitespace is ignored.
    pub fn parse(&self, currency: &str, amount: &str) -> std::result::Result<Money, ParseError> {
        let currency = currency.trim();
        let amount = amount.trim();

        let currency = self
            .registry
            .currency(currency)
            .map_err(|e| ParseErrorKind::InvalidCurrency(e.0))?;

        let canonical = canonicalize(amount, self.decimal_places)?;
        let value = parse_decimal(&canonical)
            .ok_or_else(|| ParseErrorKind::InvalidAmount(amount.to_string()))?;

        Ok(Money::new(currency, value))
    }
}

fn check_decimal_places(decimal_places: u32) -> Result<()> {
    if decimal_places > MAX_DECIMAL_PLACES {
        return Err(Error::InvalidArgument(format!(
            "decimal places {} exceed maximum {}",
            decimal_places, MAX_DECIMAL_PLACES
        )));
    }
    Ok(())
}

/// Rewrites `amount` to have exactly `decimal_places` digits after the point.
///
/// Returns the input unchanged (borrowed) when it already has the target
/// scale. Only the textual shape is checked here; whether the result is a
/// number is left to the caller. A bare `"."` is passed through as is.
///
/// # Errors
///
/// [`ParseErrorKind::TooManyDecimalPoints`] when non-zero digits remain
/// beyond the target scale.
pub fn canonicalize(amount: &str, decimal_places: u32) -> std::result::Result<Cow<'_, str>, ParseError> {
    if amount == "." {
        return Ok(Cow::Borrowed(amount));
    }

    let target = decimal_places as usize;
    let mut amount = Cow::Borrowed(amount);

    if let Some(rest) = amount.strip_prefix('.') {
        amount = Cow::Owned(format!("0.{}", rest));
    } else if let Some(rest) = amount.strip_prefix("-.").or_else(|| amount.strip_prefix("+.")) {
        amount = Cow::Owned(format!("{}0.{}", &amount[..1], rest));
    }

    let point = amount.rfind('.');
    let mut decimals = point.map_or(0, |n| amount.len() - n - 1);

    if decimals == target {
        return Ok(amount);
    }

    if decimals > target {
        // a point is present here, so stripping stops at it at the latest
        let stripped = amount.trim_end_matches('0');
        let cut = amount.len() - stripped.len();

        if cut > 0 {
            let stripped = match stripped.strip_suffix('.') {
                Some(integral) => {
                    decimals = 0;
                    integral.to_string()
                }
                None => {
                    decimals -= cut;
                    stripped.to_string()
                }
            };

            if decimals == target {
                return Ok(Cow::Owned(stripped));
            }
            // stripped past the target, pad back below
            if decimals < target {
                return Ok(Cow::Owned(pad(&stripped, decimals, target)));
            }
        }

        return Err(ParseErrorKind::TooManyDecimalPoints(amount.into_owned()).into());
    }

    Ok(Cow::Owned(pad(&amount, decimals, target)))
}

fn pad(amount: &str, decimals: usize, target: usize) -> String {
    let point = if amount.contains('.') { "" } else { "." };
    format!("{}{}{}", amount, point, &ZEROS[..target - decimals])
}

/// Parses canonical text: optional sign, digits, optional point and digits.
fn parse_decimal(text: &str) -> Option<Decimal> {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    let (integral, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let well_formed = !integral.is_empty()
        && integral.bytes().all(|b| b.is_ascii_digit())
        && fraction.bytes().all(|b| b.is_ascii_digit());

    if !well_formed {
        return None;
    }

    let value = Decimal::from_str_exact(digits).ok()?;
    Some(if text.starts_with('-') && !value.is_zero() { -value } else { value })
}
