//! Peruvian numeric, date and currency conventions.

use super::ParseError;
use crate::model::Currency;
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Layout of every date the BBVA portal prints.
pub const BANK_DATE_FORMAT: &str = "%d-%m-%Y";

pub const CURRENCY_SYMBOL_PEN: &str = "S/";
pub const CURRENCY_SYMBOL_USD: &str = "$";
pub const CURRENCY_CODE_PEN: &str = "PEN";
pub const CURRENCY_CODE_USD: &str = "USD";

/// Convert amount text such as `"12,345.67"` or `"-0.90"` to integer cents.
///
/// Thousands separators and whitespace are stripped, the rest is parsed as
/// an exact decimal, and `value * 100` is rounded half away from zero.
pub fn parse_spanish_amount(input: &str) -> Result<i64, ParseError> {
    let invalid = || ParseError::InvalidAmount {
        input: input.to_string(),
    };

    let clean: String = input
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return Err(invalid());
    }

    let value = Decimal::from_str(&clean).map_err(|_| invalid())?;
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|cents| cents.to_i64())
        .ok_or_else(invalid)
}

/// Parse a `DD-MM-YYYY` date. Any other layout is rejected.
pub fn parse_bank_date(input: &str) -> Result<NaiveDate, ParseError> {
    let clean = input.trim();
    let invalid = || ParseError::InvalidDate {
        input: input.to_string(),
    };

    let bytes = clean.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[2] == b'-'
        && bytes[5] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || i == 5 || b.is_ascii_digit());
    if !shaped {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(clean, BANK_DATE_FORMAT).map_err(|_| invalid())
}

/// Resolve a display symbol (`S/`, `$`).
pub fn currency_from_symbol(symbol: &str) -> Result<Currency, ParseError> {
    match symbol {
        CURRENCY_SYMBOL_PEN => Ok(Currency::Pen),
        CURRENCY_SYMBOL_USD => Ok(Currency::Usd),
        other => Err(ParseError::UnknownCurrencySymbol(other.to_string())),
    }
}

/// Resolve an ISO code. Case-sensitive.
pub fn currency_from_code(code: &str) -> Result<Currency, ParseError> {
    match code {
        CURRENCY_CODE_PEN => Ok(Currency::Pen),
        CURRENCY_CODE_USD => Ok(Currency::Usd),
        other => Err(ParseError::UnknownCurrencyCode(other.to_string())),
    }
}
