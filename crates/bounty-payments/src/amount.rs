//! Conversion between human decimal strings and fixed-point minor units.

use crate::error::PaymentError;
use crate::types::MinorAmount;

/// Largest precision whose scale factor fits in `u128`.
pub const MAX_DECIMALS: u8 = 38;

fn scale(decimals: u8) -> Result<u128, PaymentError> {
    if decimals > MAX_DECIMALS {
        return Err(PaymentError::MalformedAmount(format!(
            "precision of {} decimals is not supported",
            decimals
        )));
    }
    Ok(10u128.pow(decimals as u32))
}

/// Parse a non-negative decimal string into minor units.
///
/// Fractional digits beyond `decimals` are truncated toward zero, so
/// `encode("0.0000001", 6)` is `0`. Signs, exponents and anything that is
/// not `digits[.digits]` are rejected.
pub fn encode(value: &str, decimals: u8) -> Result<MinorAmount, PaymentError> {
    let malformed = |reason: &str| PaymentError::MalformedAmount(format!("{:?}: {}", value, reason));

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(malformed("empty amount"));
    }
    if trimmed.starts_with('-') {
        return Err(malformed("amount must not be negative"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(malformed("no digits"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("not a decimal number"));
    }

    let factor = scale(decimals)?;
    let overflow = || malformed("value does not fit in the token's integer width");

    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| overflow())?
    };

    let kept = &fraction[..fraction.len().min(decimals as usize)];
    let fraction_units = if kept.is_empty() {
        0
    } else {
        // Right-pad to exactly `decimals` digits: "5" at 6 decimals is 500000.
        let padded = format!("{:0<width$}", kept, width = decimals as usize);
        padded.parse::<u128>().map_err(|_| overflow())?
    };

    whole_units
        .checked_mul(factor)
        .and_then(|units| units.checked_add(fraction_units))
        .map(MinorAmount)
        .ok_or_else(overflow)
}

/// Render minor units as a decimal string with exactly `decimals` fractional digits.
pub fn decode(amount: MinorAmount, decimals: u8) -> String {
    let decimals = decimals.min(MAX_DECIMALS);
    let factor = 10u128.pow(decimals as u32);
    let whole = amount.0 / factor;

    if decimals == 0 {
        return whole.to_string();
    }

    let fraction = amount.0 % factor;
    format!("{}.{:0>width$}", whole, fraction, width = decimals as usize)
}

/// Canonical form of a decimal string at the given precision.
pub fn canonical(value: &str, decimals: u8) -> Result<String, PaymentError> {
    encode(value, decimals).map(|amount| decode(amount, decimals))
}
