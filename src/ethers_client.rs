//! `ChainClient` over an ethers HTTP provider and a local signer
//! (private key or Ledger).
//!
//! Transactions are built, signed locally and broadcast raw: EIP-1559 where
//! the chain supports it, legacy otherwise. Receipts are polled.

use crate::chain::{ChainClient, ChainError, Confirmation, ContractCall};
use crate::config::{supports_eip1559, Config};
use crate::contracts;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Extra gas on top of the node's estimate
const GAS_LIMIT_BUFFER_PERCENT: u64 = 20;

/// Receipt polling interval
const RECEIPT_POLL_MS: u64 = 500;

/// Serializes access to a hardware signer. Concurrent HID requests fail
/// on some platforms.
static HARDWARE_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub fn hardware_lock() -> &'static Mutex<()> {
    HARDWARE_LOCK.get_or_init(|| Mutex::new(()))
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    ChainError::Rpc(e.to_string())
}

pub struct EthersChainClient<S> {
    provider: Arc<Provider<Http>>,
    signer: S,
    chain_id: u64,
    gas_speed_multiplier: f32,
    confirmation_timeout_secs: u64,
    hardware: bool,
}

impl<S: Signer> EthersChainClient<S> {
    pub fn new(provider: Arc<Provider<Http>>, signer: S, chain_id: u64, config: &Config) -> Self {
        Self {
            provider,
            signer,
            chain_id,
            gas_speed_multiplier: config.gas_speed_multiplier,
            confirmation_timeout_secs: config.confirmation_timeout_secs,
            hardware: false,
        }
    }

    /// Take `hardware_lock` around every signature
    pub fn with_hardware_lock(mut self) -> Self {
        self.hardware = true;
        self
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&tx, None).await.map_err(rpc_error)
    }

    /// Fill gas, fees and nonce for a contract call
    async fn build_transaction(&self, call: &ContractCall) -> Result<TypedTransaction, ChainError> {
        let from = self.signer.address();

        let probe: TypedTransaction = TransactionRequest::new()
            .from(from)
            .to(call.to)
            .value(call.value)
            .data(call.data.clone())
            .into();
        let estimate = self
            .provider
            .estimate_gas(&probe, None)
            .await
            .map_err(|e| ChainError::GasEstimation(e.to_string()))?;
        let gas_limit = estimate * U256::from(100 + GAS_LIMIT_BUFFER_PERCENT) / U256::from(100u64);

        let base_gas_price = self.provider.get_gas_price().await.map_err(rpc_error)?;
        let gas_price =
            base_gas_price * U256::from((self.gas_speed_multiplier * 100.0) as u64) / U256::from(100u64);

        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(rpc_error)?;

        info!(
            "{}: to={:?}, value={}, selector=0x{}, gas_limit={}, gas_price={} gwei, nonce={}",
            call.label,
            call.to,
            call.value,
            contracts::selector_hex(&call.data),
            gas_limit,
            ethers::utils::format_units(gas_price, "gwei").unwrap_or_default(),
            nonce
        );

        let tx = if supports_eip1559(self.chain_id) {
            Eip1559TransactionRequest::new()
                .from(from)
                .to(call.to)
                .value(call.value)
                .data(call.data.clone())
                .gas(gas_limit)
                .max_fee_per_gas(gas_price)
                .max_priority_fee_per_gas(gas_price / 10) // 10% priority fee
                .nonce(nonce)
                .chain_id(self.chain_id)
                .into()
        } else {
            TransactionRequest::new()
                .from(from)
                .to(call.to)
                .value(call.value)
                .data(call.data.clone())
                .gas(gas_limit)
                .gas_price(gas_price)
                .nonce(nonce)
                .chain_id(self.chain_id)
                .into()
        };
        Ok(tx)
    }
}

#[async_trait]
impl<S> ChainClient for EthersChainClient<S>
where
    S: Signer + 'static,
{
    fn account(&self) -> Address {
        self.signer.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.provider.get_balance(owner, None).await.map_err(rpc_error)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let data = self.call(token, contracts::encode_balance_of(owner)?).await?;
        Ok(contracts::decode_uint("balanceOf", &data)?)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        let data = self.call(token, contracts::encode_decimals()?).await?;
        Ok(contracts::decode_decimals(&data)?)
    }

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError> {
        let data = self.call(token, contracts::encode_symbol()?).await?;
        Ok(contracts::decode_symbol(&data)?)
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError> {
        let data = self.call(token, contracts::encode_allowance(owner, spender)?).await?;
        Ok(contracts::decode_uint("allowance", &data)?)
    }

    async fn owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        let data = self.call(token, contracts::encode_owner_of(token_id)?).await?;
        Ok(contracts::decode_address("ownerOf", &data)?)
    }

    async fn is_approved_for_all(&self, token: Address, owner: Address, operator: Address) -> Result<bool, ChainError> {
        let data = self
            .call(token, contracts::encode_is_approved_for_all(owner, operator)?)
            .await?;
        Ok(contracts::decode_bool("isApprovedForAll", &data)?)
    }

    async fn submit(&self, call: ContractCall) -> Result<TxHash, ChainError> {
        let tx = self.build_transaction(&call).await?;

        let signature = {
            let _guard = if self.hardware {
                Some(hardware_lock().lock().await)
            } else {
                None
            };
            self.signer
                .sign_transaction(&tx)
                .await
                .map_err(|e| ChainError::Signer(e.to_string()))?
        };
        debug!("{} signed", call.label);

        // Broadcast exactly once; no retry after this point
        let pending = self
            .provider
            .send_raw_transaction(tx.rlp_signed(&signature))
            .await
            .map_err(rpc_error)?;

        let tx_hash = pending.tx_hash();
        info!("{} sent: {:?}", call.label, tx_hash);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Confirmation, ChainError> {
        let max_attempts = self.confirmation_timeout_secs * 1000 / RECEIPT_POLL_MS;

        for _ in 0..max_attempts {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    let block_number = receipt.block_number.map(|n| n.as_u64());
                    return Ok(if receipt.status == Some(U64::from(1u64)) {
                        info!("Transaction {:?} confirmed in block {:?}", hash, block_number);
                        Confirmation::Success {
                            block_number,
                            gas_used: receipt.gas_used,
                        }
                    } else {
                        warn!("Transaction {:?} reverted in block {:?}", hash, block_number);
                        Confirmation::Reverted { block_number }
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Receipt poll for {:?} failed: {}", hash, e),
            }
            sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
        }

        Err(ChainError::ConfirmationTimeout(self.confirmation_timeout_secs))
    }
}
