//! Preferences persisted as JSON under the platform config directory.

use crate::config::{is_builtin_chain_id, network, Config, DEFAULT_CHAIN_ID};
use crate::recipients::LinePolicy;
use crate::wallet::WalletBackend;
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const APP_DIR: &str = "multisend";
const SETTINGS_FILE: &str = "multisend_settings.json";

/// A chain the user registered by hand. Its id never collides with a
/// built-in network or another custom one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomNetwork {
    pub label: String,
    pub chain_id: u64,
    /// Symbol shown next to native amounts
    pub native_token: String,
    pub rpc_url: String,
}

impl CustomNetwork {
    pub fn new(label: String, chain_id: u64, native_token: String, rpc_url: String) -> Self {
        Self { label, chain_id, native_token, rpc_url }
    }

    /// Validate the raw fields of the add-network form
    pub fn parse(label: &str, chain_id: &str, native_token: &str, rpc_url: &str) -> Result<Self> {
        let (label, native_token) = (label.trim(), native_token.trim());
        if label.is_empty() || native_token.is_empty() {
            bail!("name and symbol are required");
        }
        let chain_id: u64 = chain_id
            .trim()
            .parse()
            .map_err(|_| anyhow!("chain id must be a positive number"))?;
        if chain_id == 0 {
            bail!("chain id must be a positive number");
        }
        let rpc = Url::parse(rpc_url.trim()).with_context(|| format!("invalid RPC URL {}", rpc_url.trim()))?;
        if !matches!(rpc.scheme(), "http" | "https" | "ws" | "wss") {
            bail!("RPC URL must use http(s) or ws(s)");
        }
        Ok(Self::new(label.to_string(), chain_id, native_token.to_string(), rpc_url.trim().to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Chain every distribution targets
    pub selected_chain_id: u64,
    /// RPC endpoint overrides keyed by chain id
    pub custom_rpcs: HashMap<u64, String>,
    pub custom_networks: Vec<CustomNetwork>,
    pub wallet_backend: WalletBackend,
    pub line_policy: LinePolicy,
    /// Switch the wallet's RPC to the selected chain without asking
    pub auto_switch_network: bool,
    /// 0.8 slow, 1.0 standard, 1.5 fast
    pub default_gas_speed: f32,
    pub log_operations: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            selected_chain_id: DEFAULT_CHAIN_ID,
            custom_rpcs: HashMap::new(),
            custom_networks: Vec::new(),
            wallet_backend: WalletBackend::default(),
            line_policy: LinePolicy::default(),
            auto_switch_network: false,
            default_gas_speed: 1.0,
            log_operations: true,
        }
    }
}

/// Per-user directory holding settings and the operation log
pub(crate) fn settings_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

fn settings_path() -> PathBuf {
    match settings_dir() {
        Some(dir) => dir.join(SETTINGS_FILE),
        None => PathBuf::from(SETTINGS_FILE),
    }
}

fn read_settings(path: &Path) -> Result<UserSettings> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

impl UserSettings {
    /// Settings from disk; defaults when the file is missing or unreadable
    pub fn load() -> Self {
        let path = settings_path();
        if !path.exists() {
            tracing::info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        read_settings(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring settings file: {:#}", e);
            Self::default()
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = settings_dir() {
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let path = settings_path();
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn settings_path_display() -> String {
        settings_path().display().to_string()
    }

    pub fn get_custom_rpc(&self, chain_id: u64) -> Option<&str> {
        self.custom_rpcs.get(&chain_id).map(String::as_str).filter(|rpc| !rpc.is_empty())
    }

    /// A blank value drops the override
    pub fn set_custom_rpc(&mut self, chain_id: u64, rpc: String) {
        match rpc.trim() {
            "" => {
                self.custom_rpcs.remove(&chain_id);
            }
            trimmed => {
                self.custom_rpcs.insert(chain_id, trimmed.to_string());
            }
        }
    }

    /// False when the chain id is built in or already registered
    pub fn add_custom_network(&mut self, custom: CustomNetwork) -> bool {
        if is_builtin_chain_id(custom.chain_id) || self.get_custom_network(custom.chain_id).is_some() {
            return false;
        }
        self.custom_networks.push(custom);
        true
    }

    pub fn remove_custom_network(&mut self, chain_id: u64) -> bool {
        match self.custom_networks.iter().position(|n| n.chain_id == chain_id) {
            Some(index) => {
                self.custom_networks.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn get_custom_network(&self, chain_id: u64) -> Option<&CustomNetwork> {
        self.custom_networks.iter().find(|n| n.chain_id == chain_id)
    }

    /// Runtime config for the selected chain with the RPC override and gas
    /// speed folded in. Unknown chain ids fall back to the default network.
    pub fn build_config(&self) -> Config {
        let chain_id = self.selected_chain_id;
        let mut config = match (self.get_custom_network(chain_id), network(chain_id)) {
            (Some(custom), _) => Config::from_custom_network(custom),
            (None, Some(builtin)) => Config::from_network(builtin),
            (None, None) => Config::default(),
        };
        if let Some(rpc) = self.get_custom_rpc(config.chain_id) {
            config.rpc_url = rpc.to_string();
        }
        config.gas_speed_multiplier = self.default_gas_speed;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = UserSettings::default();
        assert_eq!(settings.selected_chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(settings.default_gas_speed, 1.0);
        assert_eq!(settings.line_policy, LinePolicy::RejectAll);
        assert_eq!(settings.wallet_backend, WalletBackend::Ledger { account_index: 0 });
        assert!(!settings.auto_switch_network);
        assert!(settings.log_operations);
        assert!(settings.custom_networks.is_empty());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let settings: UserSettings = serde_json::from_str(r#"{"selected_chain_id": 8453}"#).unwrap();
        assert_eq!(settings.selected_chain_id, 8453);
        assert_eq!(settings.line_policy, LinePolicy::RejectAll);
        assert!(settings.log_operations);
    }

    #[test]
    fn test_settings_survive_json() {
        let mut settings = UserSettings::default();
        settings.wallet_backend = WalletBackend::PrivateKey;
        settings.line_policy = LinePolicy::SkipInvalid;
        let json = serde_json::to_string(&settings).unwrap();
        let back: UserSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.wallet_backend, WalletBackend::PrivateKey);
        assert_eq!(back.line_policy, LinePolicy::SkipInvalid);
    }

    #[test]
    fn test_add_custom_network_duplicate_chain_id_fails() {
        let mut settings = UserSettings::default();
        let network1 = CustomNetwork::new("Test1".to_string(), 99999, "TST".to_string(), "https://test1.com".to_string());
        let network2 = CustomNetwork::new("Test2".to_string(), 99999, "TST2".to_string(), "https://test2.com".to_string());

        assert!(settings.add_custom_network(network1));
        assert!(!settings.add_custom_network(network2));

        assert_eq!(settings.custom_networks.len(), 1);
        assert_eq!(settings.custom_networks[0].label, "Test1");
    }

    #[test]
    fn test_add_custom_network_rejects_builtin_chain() {
        let mut settings = UserSettings::default();
        let network = CustomNetwork::new("Not Base".to_string(), 8453, "ETH".to_string(), "https://x.example".to_string());
        assert!(!settings.add_custom_network(network));
        assert!(settings.custom_networks.is_empty());
    }

    #[test]
    fn test_parse_custom_network_form() {
        let parsed = CustomNetwork::parse(" Devnet ", "31337", "DEV", " http://127.0.0.1:8545 ").unwrap();
        assert_eq!(
            parsed,
            CustomNetwork::new("Devnet".into(), 31337, "DEV".into(), "http://127.0.0.1:8545".into())
        );

        assert!(CustomNetwork::parse("", "31337", "DEV", "http://127.0.0.1:8545").is_err());
        assert!(CustomNetwork::parse("Devnet", "abc", "DEV", "http://127.0.0.1:8545").is_err());
        assert!(CustomNetwork::parse("Devnet", "0", "DEV", "http://127.0.0.1:8545").is_err());
        assert!(CustomNetwork::parse("Devnet", "31337", "DEV", "not a url").is_err());
        assert!(CustomNetwork::parse("Devnet", "31337", "DEV", "ftp://node.example").is_err());
    }

    #[test]
    fn test_remove_custom_network() {
        let mut settings = UserSettings::default();
        let network = CustomNetwork::new("Test".to_string(), 99999, "TST".to_string(), "https://test.com".to_string());
        settings.add_custom_network(network);

        assert!(settings.remove_custom_network(99999));
        assert!(!settings.remove_custom_network(99999));
        assert!(settings.custom_networks.is_empty());
    }

    #[test]
    fn test_set_custom_rpc_trims_and_removes() {
        let mut settings = UserSettings::default();

        settings.set_custom_rpc(1, "  https://my-eth-node.com  ".to_string());
        assert_eq!(settings.get_custom_rpc(1).unwrap(), "https://my-eth-node.com");

        settings.set_custom_rpc(1, "   ".to_string());
        assert!(settings.get_custom_rpc(1).is_none());
    }

    #[test]
    fn test_build_config_applies_rpc_override_and_gas_speed() {
        let mut settings = UserSettings::default();
        settings.selected_chain_id = 8453;
        settings.default_gas_speed = 1.5;
        settings.set_custom_rpc(8453, "https://base.example".to_string());

        let config = settings.build_config();

        assert_eq!(config.chain_id, 8453);
        assert_eq!(config.rpc_url, "https://base.example");
        assert_eq!(config.gas_speed_multiplier, 1.5);
        assert_eq!(config.network_label(), "Base");
    }

    #[test]
    fn test_build_config_for_custom_network() {
        let mut settings = UserSettings::default();
        settings.add_custom_network(CustomNetwork::new(
            "Devnet".to_string(),
            31337,
            "DEV".to_string(),
            "http://127.0.0.1:8545".to_string(),
        ));
        settings.selected_chain_id = 31337;

        let config = settings.build_config();

        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.native_token(), "DEV");
        assert_eq!(config.network_label(), "Devnet");
    }
}
