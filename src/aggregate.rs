//! Count, total and remaining balance for a parsed recipient list.

use crate::recipients::sum_amounts;
use crate::types::{AssetMode, RecipientEntry};
use crate::utils;
use ethers::types::U256;

/// Balance left after the distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Available(U256),
    Shortfall(U256),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Aggregate {
    pub count: usize,
    /// Sum of amounts, `None` in NFT mode
    pub total: Option<U256>,
    /// `balance - total`, `None` in NFT mode or while the balance is unknown
    pub remaining: Option<Remaining>,
}

/// Pure: identical inputs always produce identical output.
pub fn compute(entries: &[RecipientEntry], mode: AssetMode, balance: Option<U256>) -> Aggregate {
    let count = entries.len();
    if mode == AssetMode::Nft {
        return Aggregate {
            count,
            total: None,
            remaining: None,
        };
    }

    let total = sum_amounts(entries);
    let remaining = balance.map(|balance| {
        if balance >= total {
            Remaining::Available(balance - total)
        } else {
            Remaining::Shortfall(total - balance)
        }
    });

    Aggregate {
        count,
        total: Some(total),
        remaining,
    }
}

impl Aggregate {
    /// False only when a known balance is below the total
    pub fn covers_total(&self) -> bool {
        !matches!(self.remaining, Some(Remaining::Shortfall(_)))
    }

    pub fn total_display(&self, decimals: u8) -> Option<String> {
        self.total.map(|t| utils::format_amount(t, decimals))
    }

    pub fn remaining_display(&self, decimals: u8) -> Option<String> {
        self.remaining.map(|r| match r {
            Remaining::Available(v) => utils::format_amount(v, decimals),
            Remaining::Shortfall(v) => format!("-{}", utils::format_amount(v, decimals)),
        })
    }
}
