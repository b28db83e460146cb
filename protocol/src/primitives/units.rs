//! # Amounts and Decimal Units
//!
//! All arithmetic in the vault happens on [`Amount`] -- an unsigned integer
//! count of the smallest indivisible unit (wei for the native asset, the
//! token's base unit otherwise). Decimal strings exist only at the edges:
//! operator scripts, CLI output, test fixtures.

use thiserror::Error;

use crate::config::{ETHER_DECIMALS, MAX_DECIMALS};

/// A quantity of an asset in smallest units.
pub type Amount = u128;

/// Errors produced when converting between decimal strings and amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    /// The input string was empty.
    #[error("empty amount")]
    Empty,

    /// The input contained something other than digits and one `.`.
    #[error("invalid amount: {0:?}")]
    Invalid(String),

    /// More fractional digits than the asset supports.
    #[error("amount {input:?} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The rejected input.
        input: String,
        /// The asset's decimal places.
        decimals: u8,
    },

    /// The scaled value does not fit in an [`Amount`].
    #[error("amount {0:?} overflows u128")]
    Overflow(String),

    /// The decimal count cannot be represented in a `u128` scale factor.
    #[error("unsupported decimals: {0} (max {MAX_DECIMALS})")]
    UnsupportedDecimals(u8),
}

/// Returns `10^decimals`.
fn scale(decimals: u8) -> Result<Amount, UnitsError> {
    if decimals > MAX_DECIMALS {
        return Err(UnitsError::UnsupportedDecimals(decimals));
    }
    Ok(10u128.pow(u32::from(decimals)))
}

fn parse_digits(digits: &str, input: &str) -> Result<Amount, UnitsError> {
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(Amount::from(b - b'0')))
            .ok_or_else(|| UnitsError::Overflow(input.to_string()))
    })
}

/// Parses a decimal string into smallest units.
///
/// `parse_units("100", 6) == Ok(100_000_000)`, `parse_units("0.5", 18) ==
/// Ok(500_000_000_000_000_000)`. A leading `.` is accepted (`".5"`).
pub fn parse_units(text: &str, decimals: u8) -> Result<Amount, UnitsError> {
    let factor = scale(decimals)?;
    let input = text.trim();
    if input.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (int_part, frac_part) = match input.split_once('.') {
        Some((i, f)) => (i, f),
        None => (input, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(UnitsError::Invalid(input.to_string()));
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(UnitsError::Invalid(input.to_string()));
    }
    if frac_part.len() > usize::from(decimals) {
        return Err(UnitsError::TooPrecise {
            input: input.to_string(),
            decimals,
        });
    }

    let whole = parse_digits(int_part, input)?;
    let mut frac = parse_digits(frac_part, input)?;
    // Right-pad the fraction to `decimals` digits.
    let pad = u32::from(decimals) - frac_part.len() as u32;
    frac *= 10u128.pow(pad);

    whole
        .checked_mul(factor)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| UnitsError::Overflow(input.to_string()))
}

/// Formats smallest units as a decimal string.
///
/// Trailing fractional zeros are trimmed but at least one fractional digit
/// is always printed: `format_units(100_000_000, 6) == "100.0"`.
pub fn format_units(amount: Amount, decimals: u8) -> Result<String, UnitsError> {
    let factor = scale(decimals)?;
    let whole = amount / factor;
    let frac = amount % factor;
    if decimals == 0 || frac == 0 {
        return Ok(format!("{whole}.0"));
    }
    let frac_str = format!("{:0width$}", frac, width = usize::from(decimals));
    Ok(format!("{whole}.{}", frac_str.trim_end_matches('0')))
}

/// Parses a native-asset amount (18 decimals).
pub fn parse_ether(text: &str) -> Result<Amount, UnitsError> {
    parse_units(text, ETHER_DECIMALS)
}

/// Formats a native-asset amount (18 decimals).
pub fn format_ether(amount: Amount) -> String {
    // 18 <= MAX_DECIMALS, so scaling cannot fail.
    format_units(amount, ETHER_DECIMALS).unwrap_or_else(|_| amount.to_string())
}
