//! Asset mode state machine: which asset class is active, and the token
//! contract (with its metadata) the Fungible and NFT modes operate on.

use crate::chain::{ChainClient, ChainError};
use crate::errors::{self, DistributionError, Stage};
use crate::types::AssetMode;
use crate::utils::NATIVE_DECIMALS;
use ethers::types::Address;
use tracing::{debug, info};

/// ERC-20 decimals above this are treated as a broken token
pub const MAX_TOKEN_DECIMALS: u8 = 36;

/// Symbol, decimals and display glyph for the active asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub symbol: String,
    pub decimals: u8,
    pub icon: &'static str,
}

impl AssetMetadata {
    pub fn native(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals: NATIVE_DECIMALS,
            icon: "◆",
        }
    }

    pub fn fungible(symbol: String, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            icon: "●",
        }
    }

    pub fn nft(symbol: String) -> Self {
        Self {
            symbol,
            decimals: 0,
            icon: "▣",
        }
    }
}

/// Resolution state of the token contract for Fungible/NFT modes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenState {
    #[default]
    Unset,
    Loading(Address),
    Loaded {
        address: Address,
        metadata: AssetMetadata,
    },
    Failed {
        address: Address,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AssetModeController {
    mode: AssetMode,
    native: AssetMetadata,
    token: TokenState,
}

impl AssetModeController {
    pub fn new(native_symbol: &str) -> Self {
        Self {
            mode: AssetMode::Native,
            native: AssetMetadata::native(native_symbol),
            token: TokenState::Unset,
        }
    }

    pub fn mode(&self) -> AssetMode {
        self.mode
    }

    pub fn token_state(&self) -> &TokenState {
        &self.token
    }

    /// Switch modes. Returns false when `mode` is already active.
    ///
    /// A switch drops the token contract and its metadata; the caller drops
    /// parsed entries and errors.
    pub fn select(&mut self, mode: AssetMode) -> bool {
        if self.mode == mode {
            return false;
        }
        info!("Asset mode {} -> {}", self.mode, mode);
        self.mode = mode;
        self.token = TokenState::Unset;
        true
    }

    /// Network change: native symbol follows the chain
    pub fn set_native_symbol(&mut self, symbol: &str) {
        self.native = AssetMetadata::native(symbol);
    }

    /// Forget the loaded token (e.g. after an account or chain change)
    pub fn reset_token(&mut self) {
        self.token = TokenState::Unset;
    }

    /// Start resolving a token contract. Native mode has no contract.
    pub fn begin_load(&mut self, address: Address) -> bool {
        if !self.mode.requires_contract() {
            return false;
        }
        debug!("Loading {} contract {:?}", self.mode, address);
        self.token = TokenState::Loading(address);
        true
    }

    /// Apply the outcome of a load. Ignored unless `address` is still the one loading.
    pub fn finish_load(&mut self, address: Address, result: Result<AssetMetadata, String>) -> bool {
        if self.token != TokenState::Loading(address) {
            debug!("Dropping metadata for {:?}: no longer loading", address);
            return false;
        }
        self.token = match result {
            Ok(metadata) => {
                info!("Loaded {:?}: {} ({} decimals)", address, metadata.symbol, metadata.decimals);
                TokenState::Loaded { address, metadata }
            }
            Err(reason) => TokenState::Failed { address, reason },
        };
        true
    }

    /// Metadata of the active asset, `None` while a contract is unresolved
    pub fn metadata(&self) -> Option<&AssetMetadata> {
        match (self.mode, &self.token) {
            (AssetMode::Native, _) => Some(&self.native),
            (_, TokenState::Loaded { metadata, .. }) => Some(metadata),
            _ => None,
        }
    }

    /// Loaded token contract, `None` in Native mode or while unresolved
    pub fn asset_address(&self) -> Option<Address> {
        match (self.mode, &self.token) {
            (AssetMode::Native, _) => None,
            (_, TokenState::Loaded { address, .. }) => Some(*address),
            _ => None,
        }
    }

    /// Balance and approval logic may run
    pub fn is_ready(&self) -> bool {
        self.metadata().is_some()
    }

    /// Decimals used to parse and format amounts
    pub fn decimals(&self) -> u8 {
        self.metadata().map(|m| m.decimals).unwrap_or(NATIVE_DECIMALS)
    }
}

/// Read symbol and decimals of a token contract.
///
/// ERC-721 contracts without `symbol()` fall back to "NFT".
pub async fn load_metadata(
    client: &dyn ChainClient,
    mode: AssetMode,
    address: Address,
) -> Result<AssetMetadata, DistributionError> {
    let classify = |e: ChainError| errors::classify(&e, Stage::Read);
    match mode {
        AssetMode::Native => Err(DistributionError::InvalidContract(
            "native transfers have no token contract".to_string(),
        )),
        AssetMode::Fungible => {
            let symbol = client.token_symbol(address).await.map_err(classify)?;
            let decimals = client.token_decimals(address).await.map_err(classify)?;
            if decimals > MAX_TOKEN_DECIMALS {
                return Err(DistributionError::InvalidContract(format!(
                    "{} reports {} decimals",
                    symbol, decimals
                )));
            }
            Ok(AssetMetadata::fungible(symbol, decimals))
        }
        AssetMode::Nft => {
            let symbol = match client.token_symbol(address).await {
                Ok(symbol) => symbol,
                Err(e) => {
                    debug!("No symbol() on {:?}: {}", address, e);
                    "NFT".to_string()
                }
            };
            Ok(AssetMetadata::nft(symbol))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::repeat_byte(0x11)
    }

    #[test]
    fn test_native_is_ready_without_address() {
        let ctrl = AssetModeController::new("ETH");
        assert!(ctrl.is_ready());
        assert_eq!(ctrl.metadata().unwrap().symbol, "ETH");
        assert_eq!(ctrl.decimals(), 18);
        assert_eq!(ctrl.asset_address(), None);
    }

    #[test]
    fn test_fungible_requires_load() {
        let mut ctrl = AssetModeController::new("ETH");
        assert!(ctrl.select(AssetMode::Fungible));
        assert!(!ctrl.is_ready());

        assert!(ctrl.begin_load(token()));
        assert!(!ctrl.is_ready());

        assert!(ctrl.finish_load(token(), Ok(AssetMetadata::fungible("USDC".into(), 6))));
        assert!(ctrl.is_ready());
        assert_eq!(ctrl.decimals(), 6);
        assert_eq!(ctrl.asset_address(), Some(token()));
    }

    #[test]
    fn test_switch_clears_loaded_token() {
        let mut ctrl = AssetModeController::new("ETH");
        ctrl.select(AssetMode::Fungible);
        ctrl.begin_load(token());
        ctrl.finish_load(token(), Ok(AssetMetadata::fungible("USDC".into(), 6)));

        ctrl.select(AssetMode::Nft);
        assert_eq!(ctrl.token_state(), &TokenState::Unset);
        assert!(ctrl.metadata().is_none());

        // back to fungible: the old token is not restored
        ctrl.select(AssetMode::Fungible);
        assert!(ctrl.asset_address().is_none());
    }

    #[test]
    fn test_reselecting_same_mode_is_noop() {
        let mut ctrl = AssetModeController::new("ETH");
        ctrl.select(AssetMode::Nft);
        ctrl.begin_load(token());
        assert!(!ctrl.select(AssetMode::Nft));
        assert_eq!(ctrl.token_state(), &TokenState::Loading(token()));
    }

    #[test]
    fn test_late_load_for_other_address_is_dropped() {
        let mut ctrl = AssetModeController::new("ETH");
        ctrl.select(AssetMode::Fungible);
        ctrl.begin_load(token());
        ctrl.begin_load(Address::repeat_byte(0x22));

        assert!(!ctrl.finish_load(token(), Ok(AssetMetadata::fungible("OLD".into(), 18))));
        assert_eq!(ctrl.token_state(), &TokenState::Loading(Address::repeat_byte(0x22)));
    }

    #[test]
    fn test_failed_load_has_no_metadata() {
        let mut ctrl = AssetModeController::new("ETH");
        ctrl.select(AssetMode::Nft);
        ctrl.begin_load(token());
        ctrl.finish_load(token(), Err("not a contract".into()));
        assert!(!ctrl.is_ready());
        assert!(matches!(ctrl.token_state(), TokenState::Failed { .. }));
    }

    #[test]
    fn test_native_mode_ignores_load() {
        let mut ctrl = AssetModeController::new("ETH");
        assert!(!ctrl.begin_load(token()));
        assert_eq!(ctrl.token_state(), &TokenState::Unset);
    }

    #[tokio::test]
    async fn test_load_metadata_reads_symbol_and_decimals() {
        let chain = crate::testing::FakeChain::new();
        let usdc = chain.add_token("USDC", 6);
        let metadata = load_metadata(&chain, AssetMode::Fungible, usdc).await.unwrap();
        assert_eq!(metadata, AssetMetadata::fungible("USDC".into(), 6));
    }

    #[tokio::test]
    async fn test_load_metadata_rejects_absurd_decimals() {
        let chain = crate::testing::FakeChain::new();
        let broken = chain.add_token("BRK", 77);
        let err = load_metadata(&chain, AssetMode::Fungible, broken).await.unwrap_err();
        assert!(matches!(err, DistributionError::InvalidContract(_)));
    }

    #[tokio::test]
    async fn test_load_metadata_missing_contract() {
        let chain = crate::testing::FakeChain::new();
        let err = load_metadata(&chain, AssetMode::Fungible, Address::repeat_byte(0x99))
            .await
            .unwrap_err();
        assert_ne!(err.category(), errors::ErrorCategory::Wallet);
    }
}
