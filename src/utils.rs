use ethers::types::U256;
use thiserror::Error;

/// Fractional digits shown for amounts in summaries
pub const DISPLAY_DECIMALS: usize = 5;

/// Decimals of every EVM native currency
pub const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("value is empty")]
    Empty,
    #[error("'{0}' is not a plain decimal number")]
    Malformed(String),
    #[error("'{value}' has more than {max} decimal places")]
    TooManyDecimals { value: String, max: u8 },
    #[error("'{0}' does not fit in 256 bits")]
    Overflow(String),
}

/// Full-precision rendering, used in logs
pub fn format_units(value: U256, decimals: u8) -> String {
    ethers::utils::format_units(value, decimals as u32).unwrap_or_else(|_| value.to_string())
}

pub fn format_ether(wei: U256) -> String {
    format_units(wei, NATIVE_DECIMALS)
}

/// Render `value` (base units) with exactly [`DISPLAY_DECIMALS`] fractional digits.
///
/// Digits beyond the display precision are truncated, never rounded up, so a
/// displayed balance or remainder is never larger than the real one.
pub fn format_amount(value: U256, decimals: u8) -> String {
    let decimals = decimals as usize;
    let base = U256::exp10(decimals);
    let whole = value / base;
    let frac = value % base;
    let shown = if decimals >= DISPLAY_DECIMALS {
        frac / U256::exp10(decimals - DISPLAY_DECIMALS)
    } else {
        frac * U256::exp10(DISPLAY_DECIMALS - decimals)
    };
    format!("{}.{:0>width$}", whole, shown.to_string(), width = DISPLAY_DECIMALS)
}

/// Parse a decimal string into base units of a token with `decimals` decimals.
///
/// Accepts `123`, `1.5`, `.5` and `5.`; rejects signs, exponents, separators and
/// fractions longer than the token's precision. Zero is a valid parse; callers
/// that need a positive amount check for it.
pub fn parse_amount(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(AmountError::TooManyDecimals {
            value: trimmed.to_string(),
            max: decimals,
        });
    }

    let digits = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| AmountError::Overflow(trimmed.to_string()))
}

/// Parse a non-negative integer NFT token id
pub fn parse_token_id(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountError::Malformed(trimmed.to_string()));
    }
    let digits = trimmed.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_dec_str(digits).map_err(|_| AmountError::Overflow(trimmed.to_string()))
}
