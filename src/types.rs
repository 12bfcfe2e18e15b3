//! Common types shared across modules.

use ethers::types::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which asset class a distribution moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssetMode {
    #[default]
    Native,
    Fungible,
    Nft,
}

impl AssetMode {
    pub const ALL: [AssetMode; 3] = [AssetMode::Native, AssetMode::Fungible, AssetMode::Nft];

    pub fn label(&self) -> &'static str {
        match self {
            AssetMode::Native => "Native",
            AssetMode::Fungible => "ERC-20 Token",
            AssetMode::Nft => "NFT (ERC-721)",
        }
    }

    /// Fungible and NFT modes operate on a token contract that must be loaded first
    pub fn requires_contract(&self) -> bool {
        !matches!(self, AssetMode::Native)
    }
}

impl fmt::Display for AssetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The value column of a recipient line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValue {
    /// Base units (wei, or token units scaled by the token's decimals)
    Amount(U256),
    TokenId(U256),
}

impl EntryValue {
    pub fn raw(&self) -> U256 {
        match self {
            EntryValue::Amount(v) | EntryValue::TokenId(v) => *v,
        }
    }
}

/// One parsed `(address, value)` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientEntry {
    /// 1-based line number in the input text
    pub line: usize,
    pub address: Address,
    pub value: EntryValue,
    pub source_line: String,
}

/// What a transaction was sent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Approval,
    Disperse,
}

impl TxKind {
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Approval => "Approval",
            TxKind::Disperse => "Disperse",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed {
        block_number: Option<u64>,
        gas_used: Option<U256>,
    },
    Failed {
        reason: String,
    },
}

/// A broadcast transaction and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub kind: TxKind,
    pub status: TxStatus,
    pub explorer_url: Option<String>,
}

impl TransactionRecord {
    pub fn pending(hash: TxHash, kind: TxKind, explorer_url: Option<String>) -> Self {
        Self {
            hash,
            kind,
            status: TxStatus::Pending,
            explorer_url,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, TxStatus::Pending)
    }

    /// Move to Confirmed. Ignored once the record is terminal.
    pub fn confirm(&mut self, block_number: Option<u64>, gas_used: Option<U256>) {
        if !self.is_terminal() {
            self.status = TxStatus::Confirmed {
                block_number,
                gas_used,
            };
        }
    }

    /// Move to Failed. Ignored once the record is terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.status = TxStatus::Failed {
                reason: reason.into(),
            };
        }
    }

    pub fn hash_hex(&self) -> String {
        format!("{:?}", self.hash)
    }
}
