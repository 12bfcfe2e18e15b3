//! Balance reads for the active asset, tagged so superseded results are dropped.

use crate::chain::{ChainClient, ChainError};
use crate::errors::{self, DistributionError, Stage};
use crate::generation::{Generation, Tagged};
use crate::types::AssetMode;
use crate::utils;
use crate::wallet::WalletGateway;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Read `owner`'s balance of the active asset.
///
/// Native: the account balance. Fungible and NFT: `balanceOf` on the token
/// contract (for an NFT that is the number of tokens held).
pub async fn get_balance(
    client: &dyn ChainClient,
    mode: AssetMode,
    asset: Option<Address>,
    owner: Address,
) -> Result<U256, DistributionError> {
    let result = match (mode, asset) {
        (AssetMode::Native, _) => client.native_balance(owner).await,
        (_, Some(token)) => client.token_balance(token, owner).await,
        (_, None) => return Err(DistributionError::AssetNotLoaded),
    };
    result.map_err(|e: ChainError| errors::classify(&e, Stage::Read))
}

/// Last known balance as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceView {
    pub value: Option<U256>,
    /// The last refresh failed; `value` is from an earlier read
    pub stale: bool,
    pub last_error: Option<String>,
}

impl BalanceView {
    pub fn apply(&mut self, result: Result<U256, DistributionError>) {
        match result {
            Ok(value) => {
                self.value = Some(value);
                self.stale = false;
                self.last_error = None;
            }
            Err(e) => {
                warn!("Balance refresh failed: {}", e);
                self.stale = true;
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Drop everything; used when the mode, token or session changes
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn display(&self, decimals: u8) -> String {
        match self.value {
            Some(v) if self.stale => format!("{} (stale)", utils::format_amount(v, decimals)),
            Some(v) => utils::format_amount(v, decimals),
            None if self.stale => "unavailable".to_string(),
            None => "-".to_string(),
        }
    }
}

/// A balance read captured with the state it was issued for.
#[derive(Debug, Clone)]
pub struct BalanceQuery {
    pub generation: Generation,
    pub mode: AssetMode,
    pub asset: Option<Address>,
    pub owner: Address,
}

impl BalanceQuery {
    pub async fn run(self, gateway: Arc<dyn WalletGateway>) -> Tagged<Result<U256, DistributionError>> {
        debug!("Balance query {:?} for {:?} ({})", self.generation, self.owner, self.mode);
        let result = match gateway.signer().await {
            Ok(client) => get_balance(client.as_ref(), self.mode, self.asset, self.owner).await,
            Err(e) => Err(e.into()),
        };
        Tagged::new(self.generation, result)
    }
}
