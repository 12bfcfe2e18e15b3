//! Wallet session: connection, network checks and the signer the engine uses.
//!
//! The engine only sees `WalletGateway`. Session changes (account, chain,
//! disconnect) are published on a broadcast channel; each subscriber gets its
//! own `SessionSubscription`, which unsubscribes when dropped.

use crate::chain::ChainClient;
use crate::config::{network, Config};
use crate::errors::WalletError;
use crate::ethers_client::{hardware_lock, EthersChainClient};
use crate::user_settings::CustomNetwork;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{HDPath, Ledger};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

const SESSION_EVENT_CAPACITY: usize = 16;

/// Connected account and the chain it is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub address: Address,
    pub chain_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(SessionInfo),
    AccountChanged(Address),
    ChainChanged(u64),
    Disconnected,
    /// Events were dropped; re-read the current session
    Resync,
}

/// Receiving end of session events.
pub struct SessionSubscription {
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    pub fn new(receiver: broadcast::Receiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Next queued event without waiting
    pub fn try_next(&mut self) -> Option<SessionEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!("Session subscriber lagged by {} events", skipped);
                Some(SessionEvent::Resync)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }
}

#[async_trait]
pub trait WalletGateway: Send + Sync {
    async fn connect(&self) -> Result<SessionInfo, WalletError>;

    async fn disconnect(&self);

    fn current_session(&self) -> Option<SessionInfo>;

    /// Succeeds only when the session is on `expected_chain_id`, switching
    /// first if the gateway is allowed to
    async fn ensure_network(&self, expected_chain_id: u64) -> Result<(), WalletError>;

    /// Explicit switch, e.g. after the user accepted a prompt
    async fn switch_network(&self, chain_id: u64) -> Result<SessionInfo, WalletError>;

    /// Client bound to the connected account
    async fn signer(&self) -> Result<Arc<dyn ChainClient>, WalletError>;

    fn subscribe(&self) -> SessionSubscription;
}

/// How transactions get signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletBackend {
    /// Hex key from `MULTISEND_PRIVATE_KEY`
    PrivateKey,
    /// Ledger Live derivation path at this account index
    Ledger { account_index: u32 },
}

impl Default for WalletBackend {
    fn default() -> Self {
        WalletBackend::Ledger { account_index: 0 }
    }
}

impl WalletBackend {
    pub fn label(&self) -> String {
        match self {
            WalletBackend::PrivateKey => "Private key".to_string(),
            WalletBackend::Ledger { account_index } => format!("Ledger (account {})", account_index),
        }
    }
}

/// Ledger Live derivation: `m/44'/60'/{index}'/0/0`
pub fn ledger_live_path(account_index: u32) -> String {
    format!("m/44'/60'/{}'/0/0", account_index)
}

struct ActiveSession {
    info: SessionInfo,
    client: Arc<dyn ChainClient>,
}

/// Gateway over an RPC endpoint and a local signer.
pub struct EthersWalletGateway {
    config: Config,
    backend: WalletBackend,
    private_key: Option<String>,
    auto_switch: bool,
    custom_networks: Vec<CustomNetwork>,
    session: RwLock<Option<ActiveSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl EthersWalletGateway {
    pub fn new(config: Config, backend: WalletBackend, auto_switch: bool, custom_networks: Vec<CustomNetwork>) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            config,
            backend,
            private_key: std::env::var("MULTISEND_PRIVATE_KEY").ok().filter(|k| !k.trim().is_empty()),
            auto_switch,
            custom_networks,
            session: RwLock::new(None),
            events,
        }
    }

    fn rpc_for_chain(&self, chain_id: u64) -> Option<String> {
        if chain_id == self.config.chain_id {
            return Some(self.config.rpc_url.clone());
        }
        self.custom_networks
            .iter()
            .find(|n| n.chain_id == chain_id)
            .map(|n| n.rpc_url.clone())
            .or_else(|| network(chain_id).map(|n| n.rpc.to_string()))
    }

    async fn open_session(&self, rpc_url: &str) -> Result<ActiveSession, WalletError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| WalletError::Unavailable(format!("invalid RPC URL {}: {}", rpc_url, e)))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?
            .as_u64();
        let provider = Arc::new(provider);

        let client: Arc<dyn ChainClient> = match &self.backend {
            WalletBackend::PrivateKey => {
                let key = self
                    .private_key
                    .as_deref()
                    .ok_or_else(|| WalletError::Unavailable("MULTISEND_PRIVATE_KEY is not set".to_string()))?;
                let wallet = key
                    .trim()
                    .parse::<LocalWallet>()
                    .map_err(|e| WalletError::Unavailable(format!("invalid private key: {}", e)))?
                    .with_chain_id(chain_id);
                Arc::new(EthersChainClient::new(provider, wallet, chain_id, &self.config))
            }
            WalletBackend::Ledger { account_index } => {
                let hd_path = ledger_live_path(*account_index);
                let ledger = {
                    let _guard = hardware_lock().lock().await;
                    Ledger::new(HDPath::Other(hd_path.clone()), chain_id)
                        .await
                        .map_err(|e| WalletError::Unavailable(format!("Ledger at {}: {}", hd_path, e)))?
                };
                Arc::new(EthersChainClient::new(provider, ledger, chain_id, &self.config).with_hardware_lock())
            }
        };

        let info = SessionInfo {
            address: client.account(),
            chain_id,
        };
        Ok(ActiveSession { info, client })
    }

    /// Replace the session and publish what changed
    fn install(&self, next: ActiveSession) -> SessionInfo {
        let info = next.info;
        let previous = {
            let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
            guard.replace(next).map(|s| s.info)
        };
        let event = match previous {
            None => SessionEvent::Connected(info),
            Some(prev) if prev.address != info.address => SessionEvent::AccountChanged(info.address),
            Some(prev) if prev.chain_id != info.chain_id => SessionEvent::ChainChanged(info.chain_id),
            Some(_) => return info,
        };
        // No receivers is fine
        let _ = self.events.send(event);
        info
    }
}

#[async_trait]
impl WalletGateway for EthersWalletGateway {
    async fn connect(&self) -> Result<SessionInfo, WalletError> {
        info!("Connecting {} via {}", self.backend.label(), self.config.rpc_url);
        let session = self.open_session(&self.config.rpc_url).await?;
        let info = self.install(session);
        info!("Connected {:?} on chain {}", info.address, info.chain_id);
        Ok(info)
    }

    async fn disconnect(&self) {
        let had_session = self
            .session
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some();
        if had_session {
            info!("Wallet disconnected");
            let _ = self.events.send(SessionEvent::Disconnected);
        }
    }

    fn current_session(&self) -> Option<SessionInfo> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.info)
    }

    async fn ensure_network(&self, expected_chain_id: u64) -> Result<(), WalletError> {
        let current = self.current_session().ok_or(WalletError::NotConnected)?;
        if current.chain_id == expected_chain_id {
            return Ok(());
        }
        if !self.auto_switch {
            return Err(WalletError::WrongNetwork {
                expected: expected_chain_id,
                actual: current.chain_id,
            });
        }
        self.switch_network(expected_chain_id).await.map(|_| ())
    }

    async fn switch_network(&self, chain_id: u64) -> Result<SessionInfo, WalletError> {
        let rpc_url = self
            .rpc_for_chain(chain_id)
            .ok_or(WalletError::UnsupportedNetwork(chain_id))?;
        info!("Switching to chain {} via {}", chain_id, rpc_url);

        let session = self.open_session(&rpc_url).await?;
        if session.info.chain_id != chain_id {
            return Err(WalletError::WrongNetwork {
                expected: chain_id,
                actual: session.info.chain_id,
            });
        }
        Ok(self.install(session))
    }

    async fn signer(&self) -> Result<Arc<dyn ChainClient>, WalletError> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.client.clone())
            .ok_or(WalletError::NotConnected)
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_reports_lag_as_resync() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = SessionSubscription::new(rx);
        for chain_id in 0..5u64 {
            tx.send(SessionEvent::ChainChanged(chain_id)).unwrap();
        }
        assert_eq!(sub.try_next(), Some(SessionEvent::Resync));
        assert_eq!(sub.try_next(), Some(SessionEvent::ChainChanged(3)));
        assert_eq!(sub.try_next(), Some(SessionEvent::ChainChanged(4)));
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test]
    async fn test_dropped_subscription_unsubscribes() {
        let gateway = EthersWalletGateway::new(Config::default(), WalletBackend::PrivateKey, false, Vec::new());
        let sub = gateway.subscribe();
        assert_eq!(gateway.events.receiver_count(), 1);
        drop(sub);
        assert_eq!(gateway.events.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_not_connected_without_session() {
        let gateway = EthersWalletGateway::new(Config::default(), WalletBackend::PrivateKey, true, Vec::new());
        assert!(gateway.current_session().is_none());
        assert_eq!(gateway.ensure_network(1).await, Err(WalletError::NotConnected));
        assert!(matches!(gateway.signer().await, Err(WalletError::NotConnected)));
    }

    #[test]
    fn test_ledger_live_path() {
        assert_eq!(ledger_live_path(0), "m/44'/60'/0'/0/0");
        assert_eq!(ledger_live_path(3), "m/44'/60'/3'/0/0");
    }

    #[test]
    fn test_rpc_for_known_and_unknown_chains() {
        let custom = CustomNetwork::new("Local".into(), 31337, "ETH".into(), "http://127.0.0.1:8545".into());
        let gateway = EthersWalletGateway::new(Config::default(), WalletBackend::PrivateKey, true, vec![custom]);
        assert_eq!(gateway.rpc_for_chain(31337).as_deref(), Some("http://127.0.0.1:8545"));
        assert!(gateway.rpc_for_chain(1).is_some());
        assert_eq!(gateway.rpc_for_chain(999_999), None);
    }
}
