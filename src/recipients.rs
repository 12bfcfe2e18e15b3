//! Recipient list parsing.
//!
//! Input is free text with one `<address><separator><value>` instruction per
//! line. The separator is the first run of delimiter characters (`=`, `-`,
//! whitespace) after the address; that run may hold at most one `=` or `-`,
//! so `addr=1`, `addr - 1` and `addr 1` are equivalent while `addr=-1` and
//! `addr--1` are rejected as ambiguous. Blank lines are skipped; every other
//! line yields either an entry or an [`InputError`], in input order.

use crate::types::{AssetMode, EntryValue, RecipientEntry};
use crate::utils::{self, AmountError};
use anyhow::{anyhow, Result};
use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happens to a request that contains invalid lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinePolicy {
    /// Any invalid line blocks the whole submission
    #[default]
    RejectAll,
    /// Invalid lines are left out; the valid ones are submitted
    SkipInvalid,
}

impl LinePolicy {
    pub fn label(&self) -> &'static str {
        match self {
            LinePolicy::RejectAll => "Reject the list if any line is invalid",
            LinePolicy::SkipInvalid => "Skip invalid lines",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputErrorKind {
    #[error("expected `address=value`, `address-value` or `address value`")]
    MissingSeparator,
    #[error("ambiguous separator '{0}' (use exactly one of '=', '-' or whitespace)")]
    AmbiguousSeparator(String),
    #[error("missing address")]
    MissingAddress,
    #[error("missing value")]
    MissingValue,
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("address '{0}' fails its EIP-55 checksum")]
    BadChecksum(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(AmountError),
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("invalid token id: {0}")]
    InvalidTokenId(AmountError),
}

/// A line-scoped parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct InputError {
    pub line: usize,
    pub source_line: String,
    pub kind: InputErrorKind,
}

/// Parser output: valid entries and per-line errors, both in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecipients {
    pub entries: Vec<RecipientEntry>,
    pub errors: Vec<InputError>,
}

impl ParsedRecipients {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.errors.is_empty()
    }

    /// Entries eligible for submission under `policy`
    pub fn accepted(&self, policy: LinePolicy) -> Result<&[RecipientEntry], &[InputError]> {
        match policy {
            LinePolicy::RejectAll if !self.errors.is_empty() => Err(&self.errors),
            _ => Ok(&self.entries),
        }
    }
}

/// Separators accepted between address and value, as shown to the user
pub const SEPARATORS: [(char, &str); 4] = [('=', "`=`"), ('-', "`-`"), (' ', "space"), ('\t', "tab")];

/// "`=`, `-`, space or tab"
pub fn separator_hint() -> String {
    let names: Vec<&str> = SEPARATORS.iter().map(|(_, name)| *name).collect();
    match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
        _ => names.concat(),
    }
}

fn is_delimiter(c: char) -> bool {
    c == '=' || c == '-' || c.is_whitespace()
}

/// Split a trimmed line into `(address, value)` using the separator rule above
fn split_line(line: &str) -> Result<(&str, &str), InputErrorKind> {
    let start = line
        .char_indices()
        .find(|(_, c)| is_delimiter(*c))
        .map(|(i, _)| i)
        .ok_or(InputErrorKind::MissingSeparator)?;

    let end = line[start..]
        .char_indices()
        .find(|(_, c)| !is_delimiter(*c))
        .map(|(i, _)| start + i)
        .unwrap_or(line.len());

    let separator = &line[start..end];
    let marks = separator.chars().filter(|c| *c == '=' || *c == '-').count();
    if marks > 1 {
        return Err(InputErrorKind::AmbiguousSeparator(separator.trim().to_string()));
    }

    let address = &line[..start];
    let value = &line[end..];
    if address.is_empty() {
        return Err(InputErrorKind::MissingAddress);
    }
    if value.is_empty() {
        return Err(InputErrorKind::MissingValue);
    }
    Ok((address, value))
}

/// Parse a hex address, enforcing EIP-55 when the input is mixed case
pub fn parse_checksummed_address(input: &str) -> Result<Address, InputErrorKind> {
    let hex_part = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| InputErrorKind::InvalidAddress(input.to_string()))?;

    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(InputErrorKind::InvalidAddress(input.to_string()));
    }

    let bytes = hex::decode(hex_part).map_err(|_| InputErrorKind::InvalidAddress(input.to_string()))?;
    let address = Address::from_slice(&bytes);

    let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum(&address, None)[2..] != *hex_part {
        return Err(InputErrorKind::BadChecksum(input.to_string()));
    }

    Ok(address)
}

fn parse_value(raw: &str, mode: AssetMode, decimals: u8) -> Result<EntryValue, InputErrorKind> {
    match mode {
        AssetMode::Native | AssetMode::Fungible => {
            let amount = utils::parse_amount(raw, decimals).map_err(InputErrorKind::InvalidAmount)?;
            if amount.is_zero() {
                return Err(InputErrorKind::NonPositiveAmount);
            }
            Ok(EntryValue::Amount(amount))
        }
        AssetMode::Nft => utils::parse_token_id(raw)
            .map(EntryValue::TokenId)
            .map_err(InputErrorKind::InvalidTokenId),
    }
}

fn parse_line(line: &str, mode: AssetMode, decimals: u8) -> Result<(Address, EntryValue), InputErrorKind> {
    let (address, value) = split_line(line)?;
    let address = parse_checksummed_address(address)?;
    let value = parse_value(value, mode, decimals)?;
    Ok((address, value))
}

/// Parse recipient text for `mode`. `decimals` scales amounts and is ignored for NFTs.
pub fn parse_recipients(text: &str, mode: AssetMode, decimals: u8) -> ParsedRecipients {
    let mut parsed = ParsedRecipients::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line, mode, decimals) {
            Ok((address, value)) => parsed.entries.push(RecipientEntry {
                line: idx + 1,
                address,
                value,
                source_line: line.to_string(),
            }),
            Err(kind) => parsed.errors.push(InputError {
                line: idx + 1,
                source_line: line.to_string(),
                kind,
            }),
        }
    }

    parsed
}

/// Convert CSV rows (`address,value`, optional header) into recipient text
pub fn csv_to_recipient_text(csv_text: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(csv_text.as_bytes());

    let mut lines = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| anyhow!("CSV row {}: {}", idx + 1, e))?;
        let address = record.get(0).unwrap_or_default();
        let value = record.get(1).unwrap_or_default();
        if address.is_empty() && value.is_empty() {
            continue;
        }
        // A leading header row is anything whose first cell is not hex-prefixed
        if idx == 0 && !address.starts_with("0x") && !address.starts_with("0X") {
            continue;
        }
        lines.push(format!("{}={}", address, value));
    }
    Ok(lines.join("\n"))
}

/// Sum of the amounts in `entries`; token ids are not summed
pub fn sum_amounts(entries: &[RecipientEntry]) -> U256 {
    entries
        .iter()
        .filter_map(|e| match e.value {
            EntryValue::Amount(v) => Some(v),
            EntryValue::TokenId(_) => None,
        })
        .fold(U256::zero(), |acc, v| acc.saturating_add(v))
}
