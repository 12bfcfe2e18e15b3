//! Networks the tool knows about and the runtime `Config` built from them.

use anyhow::{anyhow, Context, Result};
use ethers::types::Address;
use std::env;
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkKind {
    Mainnet,
    Testnet,
    Layer2,
    Sidechain,
}

/// A built-in network: RPC, explorer and fee model.
#[derive(Clone, Debug)]
pub struct Network {
    pub name: &'static str,
    pub chain_id: u64,
    pub symbol: &'static str,
    pub rpc: &'static str,
    pub explorer: Option<&'static str>,
    /// Type 2 (EIP-1559) transactions accepted
    pub eip1559: bool,
    pub kind: NetworkKind,
}

pub const NETWORKS: &[Network] = &[
    Network {
        name: "Ethereum",
        chain_id: 1,
        symbol: "ETH",
        rpc: "https://ethereum-rpc.publicnode.com",
        explorer: Some("https://etherscan.io"),
        eip1559: true,
        kind: NetworkKind::Mainnet,
    },
    Network {
        name: "Sepolia",
        chain_id: 11155111,
        symbol: "ETH",
        rpc: "https://ethereum-sepolia-rpc.publicnode.com",
        explorer: Some("https://sepolia.etherscan.io"),
        eip1559: true,
        kind: NetworkKind::Testnet,
    },
    Network {
        name: "Optimism",
        chain_id: 10,
        symbol: "ETH",
        rpc: "https://mainnet.optimism.io",
        explorer: Some("https://optimistic.etherscan.io"),
        eip1559: true,
        kind: NetworkKind::Layer2,
    },
    Network {
        name: "Base",
        chain_id: 8453,
        symbol: "ETH",
        rpc: "https://mainnet.base.org",
        explorer: Some("https://basescan.org"),
        eip1559: true,
        kind: NetworkKind::Layer2,
    },
    Network {
        name: "Arbitrum One",
        chain_id: 42161,
        symbol: "ETH",
        rpc: "https://arb1.arbitrum.io/rpc",
        explorer: Some("https://arbiscan.io"),
        eip1559: true,
        kind: NetworkKind::Layer2,
    },
    Network {
        name: "Polygon",
        chain_id: 137,
        symbol: "POL",
        rpc: "https://polygon-rpc.com",
        explorer: Some("https://polygonscan.com"),
        eip1559: true,
        kind: NetworkKind::Sidechain,
    },
    Network {
        name: "Gnosis Chain",
        chain_id: 100,
        symbol: "xDAI",
        rpc: "https://rpc.gnosischain.com",
        explorer: Some("https://gnosisscan.io"),
        eip1559: true,
        kind: NetworkKind::Sidechain,
    },
    Network {
        name: "BNB Chain",
        chain_id: 56,
        symbol: "BNB",
        rpc: "https://bsc-dataseed.binance.org",
        explorer: Some("https://bscscan.com"),
        eip1559: false,
        kind: NetworkKind::Sidechain,
    },
    Network {
        name: "Avalanche C-Chain",
        chain_id: 43114,
        symbol: "AVAX",
        rpc: "https://avalanche-c-chain-rpc.publicnode.com",
        explorer: Some("https://snowtrace.io"),
        eip1559: true,
        kind: NetworkKind::Sidechain,
    },
];

/// Legacy-gas chains outside the table (Ethereum Classic, Fantom Opera)
const LEGACY_GAS_CHAINS: &[u64] = &[61, 250];

/// CREATE2 deployment of the disperse contract, identical on every chain
pub const DEFAULT_DISPERSE_ADDRESS: &str = "0xD152f549545093347A162Dce210e7293f1452150";

pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 180;

pub const DEFAULT_CHAIN_ID: u64 = 11155111;

pub fn network(chain_id: u64) -> Option<&'static Network> {
    NETWORKS.iter().find(|n| n.chain_id == chain_id)
}

pub fn is_builtin_chain_id(chain_id: u64) -> bool {
    network(chain_id).is_some()
}

pub fn supports_eip1559(chain_id: u64) -> bool {
    match network(chain_id) {
        Some(n) => n.eip1559,
        None => !LEGACY_GAS_CHAINS.contains(&chain_id),
    }
}

/// `{explorer}/tx/{hash}`, if the chain has a known explorer
pub fn tx_explorer_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    network(chain_id)?.explorer.map(|base| format!("{}/tx/{}", base, tx_hash))
}

pub fn address_explorer_url(chain_id: u64, address: &str) -> Option<String> {
    network(chain_id)?.explorer.map(|base| format!("{}/address/{}", base, address))
}

/// Public deployment with `disperseEther` and `disperseToken` only
pub fn default_disperse_address() -> Address {
    DEFAULT_DISPERSE_ADDRESS.parse().unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub disperse_address: Address,
    /// Applied to the node's gas price: 0.8 slow, 1.0 standard, 1.5 fast
    pub gas_speed_multiplier: f32,
    pub confirmation_timeout_secs: u64,
    /// Name and symbol of a user-defined network
    pub custom_label: Option<(String, String)>,
}

impl Config {
    pub fn for_chain(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            disperse_address: default_disperse_address(),
            gas_speed_multiplier: 1.0,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            custom_label: None,
        }
    }

    pub fn from_network(network: &Network) -> Self {
        Self::for_chain(network.chain_id, network.rpc)
    }

    pub fn from_custom_network(network: &crate::user_settings::CustomNetwork) -> Self {
        let mut config = Self::for_chain(network.chain_id, network.rpc_url.clone());
        config.custom_label = Some((network.label.clone(), network.native_token.clone()));
        config
    }

    /// Apply `MULTISEND_*` and `GAS_SPEED_MULTIPLIER` from the environment
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(raw) = env::var("MULTISEND_CHAIN_ID") {
            let chain_id: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("MULTISEND_CHAIN_ID is not a number: {}", raw))?;
            if chain_id != self.chain_id {
                if let Some(n) = network(chain_id) {
                    self.rpc_url = n.rpc.to_string();
                }
                self.chain_id = chain_id;
                self.custom_label = None;
            }
        }
        if let Ok(raw) = env::var("MULTISEND_RPC_URL") {
            let url = Url::parse(raw.trim()).map_err(|e| anyhow!("MULTISEND_RPC_URL is invalid: {}", e))?;
            self.rpc_url = url.to_string();
        }
        if let Ok(raw) = env::var("MULTISEND_DISPERSE_ADDRESS") {
            self.disperse_address = raw
                .trim()
                .parse()
                .map_err(|_| anyhow!("MULTISEND_DISPERSE_ADDRESS is not an address: {}", raw))?;
        }
        if let Some(speed) = env::var("GAS_SPEED_MULTIPLIER").ok().and_then(|v| v.trim().parse::<f32>().ok()) {
            self.gas_speed_multiplier = speed;
        }
        Ok(self)
    }

    pub fn native_token(&self) -> &str {
        match (&self.custom_label, network(self.chain_id)) {
            (Some((_, symbol)), _) => symbol.as_str(),
            (None, Some(n)) => n.symbol,
            (None, None) => "ETH",
        }
    }

    pub fn network_label(&self) -> &str {
        match (&self.custom_label, network(self.chain_id)) {
            (Some((name, _)), _) => name.as_str(),
            (None, Some(n)) => n.name,
            (None, None) => "Unknown",
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        match network(DEFAULT_CHAIN_ID) {
            Some(n) => Self::from_network(n),
            None => Self::for_chain(DEFAULT_CHAIN_ID, "https://rpc.sepolia.org"),
        }
    }
}
