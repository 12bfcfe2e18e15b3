//! Chain read/write interface used by the engine.
//!
//! One `ChainClient` is bound to a connected account on one chain and is the
//! only way the engine reads contract state or broadcasts transactions. The
//! ethers-backed implementation lives in `ethers_client`; tests use an
//! in-memory fake.

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};
use thiserror::Error;

/// Raw failure from the chain layer, classified later by `errors::classify`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("signer error: {0}")]
    Signer(String),
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),
    #[error("unexpected return data: {0}")]
    Decode(String),
    #[error("no receipt after {0}s")]
    ConfirmationTimeout(u64),
}

impl ChainError {
    pub fn message(&self) -> &str {
        match self {
            ChainError::Rpc(m) | ChainError::Signer(m) | ChainError::GasEstimation(m) | ChainError::Decode(m) => m,
            ChainError::ConfirmationTimeout(_) => "confirmation timeout",
        }
    }
}

impl From<crate::contracts::AbiError> for ChainError {
    fn from(e: crate::contracts::AbiError) -> Self {
        ChainError::Decode(e.to_string())
    }
}

/// A state-changing call ready to be signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Operation name for logs
    pub label: &'static str,
}

/// Outcome of waiting for a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Success {
        block_number: Option<u64>,
        gas_used: Option<U256>,
    },
    Reverted {
        block_number: Option<u64>,
    },
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The connected account that signs every submission
    fn account(&self) -> Address;

    fn chain_id(&self) -> u64;

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    /// `balanceOf(owner)` on an ERC-20 or ERC-721 contract
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError>;

    async fn owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError>;

    async fn is_approved_for_all(&self, token: Address, owner: Address, operator: Address) -> Result<bool, ChainError>;

    /// Sign and broadcast; returns as soon as the node accepts the transaction
    async fn submit(&self, call: ContractCall) -> Result<TxHash, ChainError>;

    /// Wait for one confirmation of a broadcast transaction
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Confirmation, ChainError>;
}
